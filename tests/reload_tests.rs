// tests/reload_tests.rs
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_gslb::config::{Profiles, ZoneConfig};
use rust_gslb::geo::LocationMap;
use rust_gslb::metrics::MetricsRegistry;
use rust_gslb::registry::Gslb;
use rust_gslb::selection::AddressFamily;

const ZONE: &str = r#"
records:
  app.example.org.:
    scrape_interval: 100ms
    backends:
      - address: 10.0.0.1
        priority: 1
      - address: 10.0.0.2
        priority: 1
      - address: 10.0.0.3
        priority: 2
  static.example.org.:
    backends:
      - address: 10.0.1.1
"#;

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn client() -> IpAddr {
    ip("192.0.2.10")
}

async fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("gslb-reload-{}-{}", name, std::process::id()));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    dir
}

async fn build(path: &Path, registry: &MetricsRegistry) -> Gslb {
    let zone = ZoneConfig::load("example.org.", path, &Profiles::new()).await.unwrap();
    let gslb = Gslb::builder()
        .with_zone(zone)
        .with_stagger(Duration::ZERO, 100)
        .with_metrics(registry.collector())
        .build();
    gslb.start().await;
    gslb
}

async fn wait_probed(gslb: &Gslb, fqdn: &str) {
    let record = gslb.find_record(fqdn).await.unwrap();
    for _ in 0..100 {
        let mut probed = true;
        for backend in record.backends().await {
            probed &= backend.health().await.last_probe_time.is_some();
        }
        if probed {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{fqdn} was never probed");
}

#[tokio::test]
async fn test_identical_reload_keeps_health_history() {
    let dir = temp_dir("identical").await;
    let path = dir.join("db.example.org.yml");
    tokio::fs::write(&path, ZONE).await.unwrap();
    let registry = MetricsRegistry::new().unwrap();
    let gslb = build(&path, &registry).await;
    wait_probed(&gslb, "static.example.org.").await;

    // static.example.org. is probed every 10s, so its state is stable here
    let record = gslb.find_record("static.example.org.").await.unwrap();
    let before = record.backends().await[0].health().await;

    let summary = gslb.reload_zone_file("example.org.", &path).await.unwrap();
    assert!(summary.is_noop());

    let after = gslb.find_record("static.example.org.").await.unwrap();
    assert!(std::sync::Arc::ptr_eq(&record, &after));
    assert_eq!(after.backends().await[0].health().await, before);

    let text = String::from_utf8(registry.gather().unwrap()).unwrap();
    assert!(text.contains("gslb_config_reloads_total{result=\"success\"} 1"));
    gslb.shutdown().await;
}

#[tokio::test]
async fn test_removed_backend_is_no_longer_probed_or_returned() {
    let dir = temp_dir("removal").await;
    let path = dir.join("db.example.org.yml");
    tokio::fs::write(&path, ZONE).await.unwrap();
    let registry = MetricsRegistry::new().unwrap();
    let gslb = build(&path, &registry).await;
    wait_probed(&gslb, "app.example.org.").await;

    let record = gslb.find_record("app.example.org.").await.unwrap();
    let removed = record.backend(ip("10.0.0.2")).await.unwrap();

    tokio::fs::write(&path, ZONE.replace("      - address: 10.0.0.2\n        priority: 1\n", ""))
        .await
        .unwrap();
    let summary = gslb.reload_zone_file("example.org.", &path).await.unwrap();
    assert_eq!(summary.updated, vec!["app.example.org.".to_string()]);

    let picked = gslb
        .pick_response("app.example.org.", AddressFamily::V4, client())
        .await
        .unwrap();
    assert_eq!(picked, vec![ip("10.0.0.1")]);
    assert_eq!(
        gslb.pick_all_addresses("app.example.org.", AddressFamily::V4).await.unwrap(),
        vec![ip("10.0.0.1"), ip("10.0.0.3")]
    );

    // the detached backend object stops receiving probe results
    tokio::time::sleep(Duration::from_millis(150)).await;
    let frozen = removed.health().await.last_probe_time;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(removed.health().await.last_probe_time, frozen);

    // survivors keep being probed
    let kept = record.backend(ip("10.0.0.1")).await.unwrap();
    let last = kept.health().await.last_probe_time;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(kept.health().await.last_probe_time > last);
    gslb.shutdown().await;
}

#[tokio::test]
async fn test_disabling_backend_through_reload() {
    let dir = temp_dir("disable").await;
    let path = dir.join("db.example.org.yml");
    tokio::fs::write(&path, ZONE).await.unwrap();
    let registry = MetricsRegistry::new().unwrap();
    let gslb = build(&path, &registry).await;
    wait_probed(&gslb, "app.example.org.").await;

    let disabled = ZONE.replace(
        "      - address: 10.0.0.1\n        priority: 1\n",
        "      - address: 10.0.0.1\n        priority: 1\n        enable: false\n",
    );
    tokio::fs::write(&path, disabled).await.unwrap();
    gslb.reload_zone_file("example.org.", &path).await.unwrap();

    let record = gslb.find_record("app.example.org.").await.unwrap();
    let backend = record.backend(ip("10.0.0.1")).await.unwrap();
    let health = backend.health().await;
    assert!(health.alive);
    assert!(!health.is_healthy());

    let picked = gslb
        .pick_response("app.example.org.", AddressFamily::V4, client())
        .await
        .unwrap();
    assert_eq!(picked, vec![ip("10.0.0.2")]);
    gslb.shutdown().await;
}

#[tokio::test]
async fn test_bad_reloads_leave_running_state() {
    let dir = temp_dir("bad").await;
    let path = dir.join("db.example.org.yml");
    tokio::fs::write(&path, ZONE).await.unwrap();
    let registry = MetricsRegistry::new().unwrap();
    let gslb = build(&path, &registry).await;
    wait_probed(&gslb, "static.example.org.").await;

    // a single invalid record keeps its previous definition and state
    let broken_record = ZONE.replace("      - address: 10.0.1.1\n", "      - address: not-an-ip\n");
    tokio::fs::write(&path, broken_record).await.unwrap();
    let summary = gslb.reload_zone_file("example.org.", &path).await.unwrap();
    assert_eq!(summary.kept, vec!["static.example.org.".to_string()]);
    let answer = gslb.answer("static.example.org.", AddressFamily::V4, client()).await.unwrap();
    assert!(answer.healthy);
    assert_eq!(answer.addresses, vec![ip("10.0.1.1")]);

    // a record outside the zone rejects the whole file
    tokio::fs::write(&path, format!("{ZONE}  other.example.net.:\n    backends:\n      - address: 10.9.9.9\n"))
        .await
        .unwrap();
    assert!(gslb.reload_zone_file("example.org.", &path).await.is_err());
    assert!(gslb.find_record("app.example.org.").await.is_some());

    let text = String::from_utf8(registry.gather().unwrap()).unwrap();
    assert!(text.contains("gslb_config_reloads_total{result=\"fail\"} 1"));
    gslb.shutdown().await;
}

#[tokio::test]
async fn test_location_map_reload_steers_geoip() {
    let dir = temp_dir("locations").await;
    let zone_path = dir.join("db.example.org.yml");
    let map_path = dir.join("locations.yml");
    tokio::fs::write(
        &zone_path,
        r#"
records:
  geo.example.org.:
    mode: geoip
    backends:
      - address: 10.0.0.1
        priority: 1
        location: eu
      - address: 10.0.0.2
        priority: 2
        location: us
"#,
    )
    .await
    .unwrap();
    tokio::fs::write(&map_path, "subnets:\n  - subnet: 192.0.2.0/24\n    location: us\n")
        .await
        .unwrap();

    let registry = MetricsRegistry::new().unwrap();
    let gslb = build(&zone_path, &registry).await;
    wait_probed(&gslb, "geo.example.org.").await;

    // no table yet: falls back to failover
    let picked = gslb.pick_response("geo.example.org.", AddressFamily::V4, client()).await.unwrap();
    assert_eq!(picked, vec![ip("10.0.0.1")]);

    gslb.reload_location_map(&map_path).await.unwrap();
    assert_eq!(*gslb.locations(), LocationMap::load(&map_path).await.unwrap());
    let picked = gslb.pick_response("geo.example.org.", AddressFamily::V4, client()).await.unwrap();
    assert_eq!(picked, vec![ip("10.0.0.2")]);
    gslb.shutdown().await;
}
