// src/main.rs
use anyhow::{Context, Result};
use hyper::{Body, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use rust_gslb::{
    config::{self, ConfigWatcher, Profiles, WatchTarget},
    geo::{GeoDatabases, LocationMap},
    metrics::MetricsRegistry,
    registry::Gslb,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rust_gslb=info".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "gslb.yml".to_string());

    info!("Loading configuration from: {}", config_path);
    let engine = config::load_config(&config_path).await?;

    let metrics_registry = MetricsRegistry::new()?;
    let metrics = metrics_registry.collector();

    let profiles = match &engine.healthcheck_profiles {
        Some(path) => config::load_profiles(path)
            .await
            .with_context(|| format!("Failed to load healthcheck profiles from {}", path.display()))?,
        None => Profiles::new(),
    };

    let locations = match &engine.geoip_custom {
        Some(path) => LocationMap::load(path)
            .await
            .with_context(|| format!("Failed to load location map from {}", path.display()))?,
        None => LocationMap::default(),
    };

    let geo = GeoDatabases::open(&engine.geoip_maxmind)
        .await
        .context("Failed to open MaxMind databases")?;

    let mut builder = Gslb::builder()
        .with_engine_config(&engine)
        .with_profiles(profiles.clone())
        .with_locations(locations)
        .with_geo(geo)
        .with_metrics(metrics.clone());

    // a zone whose file fails here is added by the watcher once it loads
    for zone_config in config::load_zones(&engine.zones, &profiles).await {
        builder = builder.with_zone(zone_config);
    }

    let gslb = Arc::new(builder.build());
    gslb.start().await;

    if engine.metrics.enabled {
        let metrics_addr: SocketAddr = ([0, 0, 0, 0], engine.metrics.port).into();
        start_metrics_server(
            metrics_addr,
            metrics_registry,
            engine.metrics.path.clone(),
            gslb.shutdown_token(),
        )?;
    }

    // Live reload
    let mut targets: Vec<WatchTarget> = engine
        .zones
        .iter()
        .map(|(zone, path)| WatchTarget::Zone {
            zone: zone.clone(),
            path: path.clone(),
        })
        .collect();
    if let Some(path) = &engine.geoip_custom {
        targets.push(WatchTarget::LocationMap(path.clone()));
    }
    let (_watcher, mut changes) = ConfigWatcher::new(targets)
        .run()
        .context("Failed to start config watcher")?;

    let reloader = gslb.clone();
    tokio::spawn(async move {
        while let Some(target) = changes.recv().await {
            // failures are logged and counted by the registry
            match target {
                WatchTarget::Zone { zone, path } => {
                    let _ = reloader.reload_zone_file(&zone, &path).await;
                }
                WatchTarget::LocationMap(path) => {
                    let _ = reloader.reload_location_map(&path).await;
                }
            }
        }
    });

    shutdown_signal().await;
    gslb.shutdown().await;

    Ok(())
}

fn start_metrics_server(
    addr: SocketAddr,
    registry: MetricsRegistry,
    path: String,
    shutdown: CancellationToken,
) -> Result<()> {
    let registry = Arc::new(registry);
    let metrics_path = Arc::new(path);
    let service_path = metrics_path.clone();

    let make_service = hyper::service::make_service_fn(move |_| {
        let registry = registry.clone();
        let path = service_path.clone();

        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                let path = path.clone();

                async move {
                    Ok::<_, Infallible>(metrics_response(&req, &registry, &path))
                }
            }))
        }
    });

    let server = Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind metrics server on {}", addr))?
        .serve(make_service)
        .with_graceful_shutdown(async move { shutdown.cancelled().await });

    info!(
        "Metrics server listening on http://{}{}",
        addr,
        metrics_path.as_str()
    );

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}

fn metrics_response(req: &Request<Body>, registry: &MetricsRegistry, path: &str) -> Response<Body> {
    if req.uri().path() != path {
        return with_status(StatusCode::NOT_FOUND, Body::from("Not Found"));
    }

    match registry.gather() {
        Ok(metrics) => {
            let mut response = Response::new(Body::from(metrics));
            response.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            with_status(StatusCode::INTERNAL_SERVER_ERROR, Body::empty())
        }
    }
}

fn with_status(status: StatusCode, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
