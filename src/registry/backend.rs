// src/registry/backend.rs
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::RwLock;
use tracing::info;

use crate::config::BackendDefinition;
use crate::health::{probes_equivalent, HealthProbe};
use crate::selection::Candidate;

/// One endpoint of a record. Created once per address and merged in place
/// on reload so its health history survives.
#[derive(Debug)]
pub struct Backend {
    record: String,
    address: IpAddr,
    state: RwLock<BackendState>,
    /// Last cycle number handed out.
    cycles: AtomicU64,
}

#[derive(Debug)]
struct BackendState {
    definition: BackendDefinition,
    alive: bool,
    last_probe_time: Option<DateTime<Utc>>,
    response_time: Duration,
    /// Cycle whose result is currently stored.
    applied_cycle: u64,
}

/// Health fields as of one read.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSnapshot {
    pub alive: bool,
    pub enabled: bool,
    pub last_probe_time: Option<DateTime<Utc>>,
    pub response_time: Duration,
}

impl HealthSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.enabled && self.alive
    }
}

/// Operator-facing status line for one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSummary {
    pub address: IpAddr,
    pub priority: i32,
    pub healthy: bool,
    pub enabled: bool,
    pub last_probe_time: Option<DateTime<Utc>>,
    pub response_time: Duration,
}

impl fmt::Display for BackendSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.healthy { "healthy" } else { "unhealthy" };
        let last = self
            .last_probe_time
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();
        let response = if self.response_time.is_zero() {
            "N/A".to_string()
        } else {
            format!("{}ms", self.response_time.as_millis())
        };
        write!(
            f,
            "Backend: {} | Priority: {} | Status: {} | Enabled: {} | LastHealthcheck: {} | ResponseTime: {}",
            self.address, self.priority, status, self.enabled, last, response
        )
    }
}

impl Backend {
    /// New backends start dead until their first probe cycle completes.
    pub fn new(record: &str, definition: BackendDefinition) -> Self {
        Self {
            record: record.to_string(),
            address: definition.address,
            state: RwLock::new(BackendState {
                definition,
                alive: false,
                last_probe_time: None,
                response_time: Duration::ZERO,
                applied_cycle: 0,
            }),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    /// Name of the owning record.
    pub fn record(&self) -> &str {
        &self.record
    }

    pub async fn snapshot(&self) -> Candidate {
        let state = self.state.read().await;
        let def = &state.definition;
        Candidate {
            address: self.address,
            priority: def.priority,
            weight: def.weight.max(1),
            enabled: def.enabled,
            alive: state.alive,
            response_time: state.response_time,
            country: def.country.clone(),
            city: def.city.clone(),
            asn: def.asn.clone(),
            location: def.location.clone(),
            coordinates: def.coordinates,
        }
    }

    pub async fn health(&self) -> HealthSnapshot {
        let state = self.state.read().await;
        HealthSnapshot {
            alive: state.alive,
            enabled: state.definition.enabled,
            last_probe_time: state.last_probe_time,
            response_time: state.response_time,
        }
    }

    pub async fn is_healthy(&self) -> bool {
        self.health().await.is_healthy()
    }

    pub async fn is_enabled(&self) -> bool {
        self.state.read().await.definition.enabled
    }

    pub async fn definition(&self) -> BackendDefinition {
        self.state.read().await.definition.clone()
    }

    pub async fn probes(&self) -> Vec<Arc<dyn HealthProbe>> {
        self.state.read().await.definition.probes.clone()
    }

    pub async fn summary(&self) -> BackendSummary {
        let state = self.state.read().await;
        BackendSummary {
            address: self.address,
            priority: state.definition.priority,
            healthy: state.definition.enabled && state.alive,
            enabled: state.definition.enabled,
            last_probe_time: state.last_probe_time,
            response_time: state.response_time,
        }
    }

    /// Reserve the next probe cycle number.
    pub fn begin_cycle(&self) -> u64 {
        self.cycles.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Store the outcome of `cycle` unless a newer cycle already did.
    /// Returns the previous aliveness when the write was applied.
    pub async fn record_cycle(
        &self,
        cycle: u64,
        alive: bool,
        response_time: Duration,
        probed_at: DateTime<Utc>,
    ) -> Option<bool> {
        let mut state = self.state.write().await;
        if cycle <= state.applied_cycle {
            return None;
        }
        let previous = state.alive;
        state.alive = alive;
        state.response_time = response_time;
        state.last_probe_time = Some(probed_at);
        state.applied_cycle = cycle;
        Some(previous)
    }

    /// Copy changed settings from a reloaded definition, leaving health
    /// state untouched. Returns whether anything changed.
    pub async fn update_from(&self, new: &BackendDefinition) -> bool {
        let mut state = self.state.write().await;
        let current = &mut state.definition;
        let (record, address) = (&self.record, self.address);
        let mut changed = false;

        macro_rules! sync_field {
            ($field:ident) => {
                if current.$field != new.$field {
                    info!(
                        record = %record,
                        backend = %address,
                        "backend updated, {} changed from {:?} to {:?}",
                        stringify!($field),
                        current.$field,
                        new.$field
                    );
                    current.$field = new.$field.clone();
                    changed = true;
                }
            };
        }

        sync_field!(priority);
        sync_field!(weight);
        sync_field!(enabled);
        sync_field!(description);
        sync_field!(tags);
        sync_field!(timeout);
        sync_field!(country);
        sync_field!(city);
        sync_field!(asn);
        sync_field!(location);
        sync_field!(coordinates);

        if !probes_equivalent(&current.probes, &new.probes) {
            info!(record = %record, backend = %address, "backend health checks have changed");
            current.probes = new.probes.clone();
            changed = true;
        }

        changed
    }
}
