// src/health/runner.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::error::ProbeError;
use crate::metrics::MetricsCollector;
use crate::registry::Backend;

/// Outcome of one probe cycle for one backend.
#[derive(Debug, Clone)]
pub struct ProbeCycleResult {
    pub alive: bool,
    /// Wall-clock time of the whole fan-out.
    pub response_time: Duration,
    /// `(type_tag, error)` for every probe that failed.
    pub failures: Vec<(String, ProbeError)>,
    /// False when a newer cycle had already stored its result.
    pub applied: bool,
}

/// Runs every probe of a backend concurrently and stores the verdict.
#[derive(Debug, Clone, Default)]
pub struct ProbeRunner {
    metrics: Option<Arc<MetricsCollector>>,
}

impl ProbeRunner {
    pub fn new(metrics: Option<Arc<MetricsCollector>>) -> Self {
        Self { metrics }
    }

    /// One cycle: each probe gets `scrape_timeout`, a timed-out probe counts
    /// as failed and is left to finish on its own. Alive iff every probe
    /// passed; a backend without probes is alive.
    pub async fn run(
        &self,
        backend: &Backend,
        retries: u32,
        scrape_timeout: Duration,
    ) -> ProbeCycleResult {
        let cycle = backend.begin_cycle();
        let probes = backend.probes().await;
        let address = backend.address();
        let record = backend.record().to_string();
        let started = Instant::now();

        let tasks = probes.into_iter().map(|probe| {
            let record = record.clone();
            let tag = probe.type_tag();
            async move {
                let probe_started = Instant::now();
                let handle = tokio::spawn(async move {
                    probe.perform(address, &record, retries).await
                });
                let result = match timeout(scrape_timeout, handle).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => {
                        error!(backend = %address, probe = %tag, "probe task failed: {}", e);
                        Err(ProbeError::Other(e.to_string()))
                    }
                    Err(_) => Err(ProbeError::Timeout),
                };
                (tag, result, probe_started.elapsed())
            }
        });
        let results = join_all(tasks).await;
        let response_time = started.elapsed();

        let mut failures = Vec::new();
        for (tag, result, elapsed) in results {
            if let Some(metrics) = &self.metrics {
                metrics.observe_healthcheck(&record, &tag, &address.to_string(), result.is_ok(), elapsed);
            }
            if let Err(error) = result {
                debug!(record = %record, backend = %address, probe = %tag, %error, "health check failed");
                if let Some(metrics) = &self.metrics {
                    metrics.record_healthcheck_failure(&tag, &address.to_string(), error.class());
                }
                failures.push((tag, error));
            }
        }
        let alive = failures.is_empty();

        let applied = match backend
            .record_cycle(cycle, alive, response_time, Utc::now())
            .await
        {
            Some(previous) => {
                if previous != alive {
                    if alive {
                        info!(record = %record, backend = %address, "backend is now healthy");
                    } else {
                        warn!(
                            record = %record,
                            backend = %address,
                            failed = failures.len(),
                            "backend is now unhealthy"
                        );
                    }
                }
                if let Some(metrics) = &self.metrics {
                    metrics.update_backend_health(&record, &address.to_string(), alive);
                }
                true
            }
            None => {
                debug!(record = %record, backend = %address, cycle, "stale probe cycle discarded");
                false
            }
        };

        ProbeCycleResult {
            alive,
            response_time,
            failures,
            applied,
        }
    }
}
