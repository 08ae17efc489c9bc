// src/registry/reconcile.rs
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::{normalize_fqdn, ZoneConfig};
use crate::error::ConfigError;
use crate::geo::LocationMap;

use super::gslb::Gslb;
use super::record::Record;

/// What a zone reload did to the live registry.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReloadSummary {
    pub zone: String,
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    /// Records that failed validation and kept their previous state.
    pub kept: Vec<String>,
}

impl ReloadSummary {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

impl Gslb {
    /// Merge a freshly parsed zone into live state. Records and backends that
    /// persist are updated in place; the zone's record map is swapped under
    /// the structural lock only once the merge is done.
    pub async fn reload_zone(&self, config: ZoneConfig) -> ReloadSummary {
        let _guard = self.reload_lock.lock().await;
        let zone = config.zone.clone();
        let mut summary = ReloadSummary {
            zone: zone.clone(),
            ..Default::default()
        };

        let existing = self.zones.read().await.get(&zone).cloned();
        if existing.is_none() {
            info!(zone = %zone, "new zone added");
        }
        let existing = existing.unwrap_or_default();

        let mut next: HashMap<String, Arc<Record>> = HashMap::with_capacity(config.records.len());
        let mut added = Vec::new();
        for def in &config.records {
            match existing.get(&def.fqdn) {
                Some(record) => {
                    let changes = record.update_from(def).await;
                    if let Some(metrics) = &self.metrics {
                        for address in &changes.removed {
                            metrics.remove_backend(record.fqdn(), &address.to_string());
                        }
                    }
                    if !changes.is_empty() {
                        info!(zone = %zone, record = %def.fqdn, "record updated");
                        summary.updated.push(def.fqdn.clone());
                    }
                    next.insert(def.fqdn.clone(), record.clone());
                }
                None => {
                    info!(zone = %zone, record = %def.fqdn, backends = def.backends.len(), "record added");
                    let record = Arc::new(Record::new(&zone, def, &self.shutdown));
                    summary.added.push(def.fqdn.clone());
                    added.push(record.clone());
                    next.insert(def.fqdn.clone(), record);
                }
            }
        }

        let mut removed = Vec::new();
        for (fqdn, record) in &existing {
            if next.contains_key(fqdn) {
                continue;
            }
            if config.is_rejected(fqdn) {
                warn!(zone = %zone, record = %fqdn, "record invalid in new configuration, keeping previous state");
                summary.kept.push(fqdn.clone());
                next.insert(fqdn.clone(), record.clone());
                continue;
            }
            summary.removed.push(fqdn.clone());
            removed.push(record.clone());
        }

        self.zones.write().await.insert(zone.clone(), next);

        for record in removed {
            info!(zone = %zone, record = %record.fqdn(), "record removed");
            record.cancel();
            self.tasks.remove(record.fqdn());
            self.scheduler.tracker().forget(record.fqdn());
            if let Some(metrics) = &self.metrics {
                for backend in record.backends().await {
                    metrics.remove_backend(record.fqdn(), &backend.address().to_string());
                }
            }
        }

        if self.is_running() {
            for record in added {
                self.spawn_scheduler(record, Duration::ZERO);
            }
        }

        summary.added.sort();
        summary.updated.sort();
        summary.removed.sort();
        summary.kept.sort();
        self.update_inventory().await;
        summary
    }

    /// Load a zone file and merge it. A file that fails to load leaves the
    /// running zone untouched.
    pub async fn reload_zone_file(
        &self,
        zone: &str,
        path: impl AsRef<Path>,
    ) -> Result<ReloadSummary, ConfigError> {
        let path = path.as_ref();
        match ZoneConfig::load(zone, path, &self.profiles).await {
            Ok(config) => {
                let summary = self.reload_zone(config).await;
                info!(
                    zone = %summary.zone,
                    added = summary.added.len(),
                    updated = summary.updated.len(),
                    removed = summary.removed.len(),
                    kept = summary.kept.len(),
                    "zone reloaded"
                );
                self.record_reload(true);
                Ok(summary)
            }
            Err(e) => {
                error!(zone = %normalize_fqdn(zone), path = ?path, "zone reload failed: {}", e);
                self.record_reload(false);
                Err(e)
            }
        }
    }

    /// Replace the subnet to location table wholesale.
    pub async fn reload_location_map(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        match LocationMap::load(path).await {
            Ok(map) => {
                info!(path = ?path, subnets = map.len(), "location map reloaded");
                self.locations.store(Arc::new(map));
                self.record_reload(true);
                Ok(())
            }
            Err(e) => {
                error!(path = ?path, "location map reload failed: {}", e);
                self.record_reload(false);
                Err(e)
            }
        }
    }

    fn record_reload(&self, success: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_reload(success);
        }
    }
}
