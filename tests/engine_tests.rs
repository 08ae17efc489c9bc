// tests/engine_tests.rs
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rust_gslb::config::{Profiles, ZoneConfig};
use rust_gslb::error::SelectionError;
use rust_gslb::metrics::MetricsRegistry;
use rust_gslb::registry::Gslb;
use rust_gslb::selection::AddressFamily;

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn client() -> IpAddr {
    ip("192.0.2.10")
}

async fn write_zone(name: &str, yaml: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("gslb-engine-{}-{}", name, std::process::id()));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let path = dir.join("db.example.org.yml");
    tokio::fs::write(&path, yaml).await.unwrap();
    path
}

async fn start(path: &PathBuf) -> Arc<Gslb> {
    let zone = ZoneConfig::load("example.org.", path, &Profiles::new()).await.unwrap();
    let gslb = Arc::new(
        Gslb::builder()
            .with_zone(zone)
            .with_stagger(Duration::ZERO, 100)
            .build(),
    );
    gslb.start().await;
    gslb
}

/// Poll until the record answers from healthy backends.
async fn wait_healthy(gslb: &Gslb, fqdn: &str, family: AddressFamily) {
    for _ in 0..100 {
        if let Ok(answer) = gslb.answer(fqdn, family, client()).await {
            if answer.healthy {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("{fqdn} never became healthy");
}

#[tokio::test]
async fn test_http_probe_drives_answer() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/health")
        .match_header("host", "web.example.org")
        .with_status(200)
        .expect_at_least(1)
        .create_async()
        .await;
    let addr: SocketAddr = server.host_with_port().parse().unwrap();

    let yaml = format!(
        r#"
records:
  web.example.org.:
    record_ttl: 20
    scrape_interval: 1s
    backends:
      - address: 127.0.0.1
        healthchecks:
          - type: http
            params:
              port: {}
              enable_tls: false
              uri: /health
              host: web.example.org
"#,
        addr.port()
    );
    let path = write_zone("http", &yaml).await;
    let gslb = start(&path).await;

    wait_healthy(&gslb, "web.example.org.", AddressFamily::V4).await;
    let answer = gslb.answer("web.example.org.", AddressFamily::V4, client()).await.unwrap();
    assert_eq!(answer.addresses, vec![ip("127.0.0.1")]);
    assert_eq!(answer.ttl, 20);

    let summaries = gslb.backend_summaries("web.example.org.").await.unwrap();
    assert!(summaries[0].last_probe_time.is_some());
    assert!(!summaries[0].response_time.is_zero());

    gslb.shutdown().await;
    mock.assert_async().await;
}

#[tokio::test]
async fn test_failover_returns_lowest_priority_group() {
    let yaml = r#"
records:
  app.example.org.:
    backends:
      - address: 10.0.0.1
        priority: 1
      - address: 10.0.0.2
        priority: 1
      - address: 10.0.0.3
        priority: 2
"#;
    let path = write_zone("failover", yaml).await;
    let gslb = start(&path).await;
    wait_healthy(&gslb, "app.example.org.", AddressFamily::V4).await;

    let picked = gslb
        .pick_response("app.example.org.", AddressFamily::V4, client())
        .await
        .unwrap();
    assert_eq!(picked, vec![ip("10.0.0.1"), ip("10.0.0.2")]);

    assert!(matches!(
        gslb.pick_response("app.example.org.", AddressFamily::V6, client()).await,
        Err(SelectionError::NoHealthyBackend { .. })
    ));
    gslb.shutdown().await;
}

#[tokio::test]
async fn test_round_robin_cycles_in_order() {
    let yaml = r#"
records:
  rr.example.org.:
    mode: round-robin
    backends:
      - address: 10.0.0.1
      - address: 10.0.0.2
      - address: 10.0.0.3
"#;
    let path = write_zone("roundrobin", yaml).await;
    let gslb = start(&path).await;
    wait_healthy(&gslb, "rr.example.org.", AddressFamily::V4).await;

    let mut picks = Vec::new();
    for _ in 0..6 {
        let picked = gslb
            .pick_response("rr.example.org.", AddressFamily::V4, client())
            .await
            .unwrap();
        assert_eq!(picked.len(), 1);
        picks.push(picked[0]);
    }
    let (first, second) = picks.split_at(3);
    assert_eq!(first, second);
    let mut sorted = first.to_vec();
    sorted.sort();
    assert_eq!(sorted, vec![ip("10.0.0.1"), ip("10.0.0.2"), ip("10.0.0.3")]);
    gslb.shutdown().await;
}

#[tokio::test]
async fn test_dead_backends_fall_back_to_all_addresses() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let yaml = format!(
        r#"
records:
  db.example.org.:
    scrape_timeout: 1s
    backends:
      - address: 127.0.0.1
        healthchecks:
          - type: tcp
            params:
              port: {port}
      - address: 127.0.0.2
        enable: false
"#
    );
    let path = write_zone("fallback", &yaml).await;
    let registry = MetricsRegistry::new().unwrap();
    let zone = ZoneConfig::load("example.org.", &path, &Profiles::new()).await.unwrap();
    let gslb = Gslb::builder()
        .with_zone(zone)
        .with_stagger(Duration::ZERO, 1)
        .with_metrics(registry.collector())
        .build();
    gslb.start().await;

    let record = gslb.find_record("db.example.org.").await.unwrap();
    let backend = record.backend(ip("127.0.0.1")).await.unwrap();
    for _ in 0..100 {
        if backend.health().await.last_probe_time.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let answer = gslb.answer("db.example.org.", AddressFamily::V4, client()).await.unwrap();
    assert!(!answer.healthy);
    // the disabled backend is never returned, even as a fallback
    assert_eq!(answer.addresses, vec![ip("127.0.0.1")]);

    let text = String::from_utf8(registry.gather().unwrap()).unwrap();
    assert!(text.contains("reason=\"connection\""));
    assert!(text.contains("gslb_backends_total 2"));
    gslb.shutdown().await;
}

#[tokio::test]
async fn test_unknown_record() {
    let path = write_zone(
        "unknown",
        "records:\n  a.example.org.:\n    backends:\n      - address: 10.0.0.1\n",
    )
    .await;
    let gslb = start(&path).await;

    assert!(gslb.is_authoritative("b.example.org.").await);
    assert!(matches!(
        gslb.answer("b.example.org.", AddressFamily::V4, client()).await,
        Err(SelectionError::RecordNotFound(_))
    ));
    gslb.shutdown().await;
}
