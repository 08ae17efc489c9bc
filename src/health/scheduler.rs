// src/health/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::config::IdlePolicy;
use crate::registry::Record;

use super::runner::ProbeRunner;

/// Last time each record was queried.
#[derive(Debug, Clone, Default)]
pub struct QueryTracker {
    last: Arc<DashMap<String, Instant>>,
}

impl QueryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&self, fqdn: &str) {
        self.last.insert(fqdn.to_string(), Instant::now());
    }

    pub fn last_query(&self, fqdn: &str) -> Option<Instant> {
        self.last.get(fqdn).map(|entry| *entry.value())
    }

    pub fn forget(&self, fqdn: &str) {
        self.last.remove(fqdn);
    }
}

/// Probing interval for the next tick. A record unqueried for longer than
/// the idle timeout is probed `multiplier` times less often; a record never
/// queried counts from its scheduler start.
pub fn effective_interval(
    base: Duration,
    policy: IdlePolicy,
    last_query: Option<Instant>,
    started: Instant,
    now: Instant,
) -> Duration {
    let reference = last_query.unwrap_or(started);
    let idle = now.saturating_duration_since(reference);
    if idle > policy.resolution_idle_timeout {
        base.saturating_mul(policy.multiplier)
    } else {
        base
    }
}

/// Start delay of each of `count` records: batches of `batch_size` are
/// released at even offsets across `max_stagger`, the first one at zero.
pub fn stagger_delays(count: usize, batch_size: usize, max_stagger: Duration) -> Vec<Duration> {
    if count == 0 {
        return Vec::new();
    }
    let batch_size = batch_size.max(1);
    let batches = count.div_ceil(batch_size) as u128;
    let window = max_stagger.as_nanos();

    (0..count)
        .map(|i| {
            let batch = (i / batch_size) as u128;
            let nanos = window * batch / batches;
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        })
        .collect()
}

/// Drives one probing loop per record.
#[derive(Debug, Clone)]
pub struct Scheduler {
    runner: ProbeRunner,
    tracker: QueryTracker,
    policy: IdlePolicy,
}

impl Scheduler {
    pub fn new(runner: ProbeRunner, tracker: QueryTracker, policy: IdlePolicy) -> Self {
        Self {
            runner,
            tracker,
            policy,
        }
    }

    pub fn tracker(&self) -> &QueryTracker {
        &self.tracker
    }

    /// Probe every backend of the record concurrently.
    pub async fn probe_record(&self, record: &Record) {
        let settings = record.settings().await;
        let backends = record.backends().await;
        let cycles = backends.iter().map(|backend| {
            self.runner
                .run(backend, settings.scrape_retries, settings.scrape_timeout)
        });
        let results = join_all(cycles).await;

        let alive = results.iter().filter(|r| r.alive).count();
        debug!(
            record = %record.fqdn(),
            alive,
            total = results.len(),
            "probe cycle complete"
        );
    }

    /// Spawn the record's loop: wait `start_delay`, probe once, then
    /// alternate sleep and probe until the record's token is cancelled.
    pub fn spawn(&self, record: Arc<Record>, start_delay: Duration) -> JoinHandle<()> {
        let scheduler = self.clone();
        let token = record.cancellation_token();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = sleep(start_delay) => {}
            }

            let started = Instant::now();
            info!(record = %record.fqdn(), delay = ?start_delay, "health checks started");

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = scheduler.probe_record(&record) => {}
                }

                let base = record.settings().await.scrape_interval;
                let interval = effective_interval(
                    base,
                    scheduler.policy,
                    scheduler.tracker.last_query(record.fqdn()),
                    started,
                    Instant::now(),
                );
                if interval != base {
                    debug!(record = %record.fqdn(), ?interval, "record idle, probing less often");
                }

                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = sleep(interval) => {}
                }
            }

            info!(record = %record.fqdn(), "health checks stopped");
        })
    }
}
