// src/registry/record.rs
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::RecordDefinition;
use crate::error::SelectionError;
use crate::geo::{GeoDatabases, LocationMap};
use crate::selection::{create_selector, AddressFamily, Candidate, SelectionMode, SelectionRequest, Selector};

use super::backend::Backend;

/// Per-record settings copied in place on reload.
#[derive(Debug, Clone)]
pub struct RecordSettings {
    pub mode: SelectionMode,
    pub owner: Option<String>,
    pub description: Option<String>,
    pub ttl: u32,
    pub scrape_interval: Duration,
    pub scrape_retries: u32,
    pub scrape_timeout: Duration,
    /// Kept across reloads while the mode is unchanged, so the round-robin
    /// cursor survives.
    pub selector: Arc<dyn Selector>,
}

impl RecordSettings {
    fn from_definition(def: &RecordDefinition) -> Self {
        Self {
            mode: def.mode,
            owner: def.owner.clone(),
            description: def.description.clone(),
            ttl: def.ttl,
            scrape_interval: def.scrape_interval,
            scrape_retries: def.scrape_retries,
            scrape_timeout: def.scrape_timeout,
            selector: create_selector(def.mode),
        }
    }
}

/// Outcome of merging a new definition into a live record.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordChanges {
    pub settings_changed: bool,
    pub added: Vec<IpAddr>,
    pub updated: Vec<IpAddr>,
    pub removed: Vec<IpAddr>,
}

impl RecordChanges {
    pub fn is_empty(&self) -> bool {
        !self.settings_changed
            && self.added.is_empty()
            && self.updated.is_empty()
            && self.removed.is_empty()
    }
}

/// One DNS name and the backends it answers with.
#[derive(Debug)]
pub struct Record {
    fqdn: String,
    zone: String,
    settings: RwLock<RecordSettings>,
    backends: RwLock<Vec<Arc<Backend>>>,
    token: CancellationToken,
}

impl Record {
    /// `parent` is the registry's shutdown token; the record's scheduler
    /// stops when either it or the record itself is cancelled.
    pub fn new(zone: &str, def: &RecordDefinition, parent: &CancellationToken) -> Self {
        let backends = def
            .backends
            .iter()
            .map(|b| Arc::new(Backend::new(&def.fqdn, b.clone())))
            .collect();

        Self {
            fqdn: def.fqdn.clone(),
            zone: zone.to_string(),
            settings: RwLock::new(RecordSettings::from_definition(def)),
            backends: RwLock::new(backends),
            token: parent.child_token(),
        }
    }

    pub fn fqdn(&self) -> &str {
        &self.fqdn
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn settings(&self) -> RecordSettings {
        self.settings.read().await.clone()
    }

    pub async fn mode(&self) -> SelectionMode {
        self.settings.read().await.mode
    }

    pub async fn ttl(&self) -> u32 {
        self.settings.read().await.ttl
    }

    pub async fn backends(&self) -> Vec<Arc<Backend>> {
        self.backends.read().await.clone()
    }

    pub async fn backend(&self, address: IpAddr) -> Option<Arc<Backend>> {
        self.backends
            .read()
            .await
            .iter()
            .find(|b| b.address() == address)
            .cloned()
    }

    /// Snapshot every backend, in configuration order.
    pub async fn candidates(&self) -> Vec<Candidate> {
        let backends = self.backends().await;
        let mut candidates = Vec::with_capacity(backends.len());
        for backend in &backends {
            candidates.push(backend.snapshot().await);
        }
        candidates
    }

    pub async fn healthcheck_count(&self) -> usize {
        let mut total = 0;
        for backend in self.backends().await {
            total += backend.probes().await.len();
        }
        total
    }

    /// Run the record's policy against the current health state.
    pub async fn select(
        &self,
        family: AddressFamily,
        client_ip: IpAddr,
        geo: &GeoDatabases,
        locations: &LocationMap,
    ) -> Result<Vec<IpAddr>, SelectionError> {
        let selector = self.settings.read().await.selector.clone();
        let candidates = self.candidates().await;
        let request = SelectionRequest {
            fqdn: &self.fqdn,
            family,
            client_ip,
            candidates: &candidates,
            geo,
            locations,
        };
        selector.select(&request)
    }

    /// Every enabled backend of the family regardless of health.
    pub async fn all_addresses(&self, family: AddressFamily) -> Result<Vec<IpAddr>, SelectionError> {
        let addresses: Vec<IpAddr> = self
            .candidates()
            .await
            .into_iter()
            .filter(|c| c.enabled && family.matches(c.address))
            .map(|c| c.address)
            .collect();

        if addresses.is_empty() {
            return Err(SelectionError::NoBackends {
                fqdn: self.fqdn.clone(),
                family,
            });
        }
        Ok(addresses)
    }

    /// Merge a reloaded definition. Existing backends are updated in place
    /// and keep their health state; the backend list is swapped in one write.
    pub async fn update_from(&self, def: &RecordDefinition) -> RecordChanges {
        let mut changes = RecordChanges {
            settings_changed: self.update_settings(def).await,
            ..Default::default()
        };

        let current = self.backends().await;
        let mut merged = Vec::with_capacity(def.backends.len());
        for backend_def in &def.backends {
            match current.iter().find(|b| b.address() == backend_def.address) {
                Some(existing) => {
                    if existing.update_from(backend_def).await {
                        changes.updated.push(existing.address());
                    }
                    merged.push(existing.clone());
                }
                None => {
                    info!(record = %self.fqdn, backend = %backend_def.address, "backend added");
                    changes.added.push(backend_def.address);
                    merged.push(Arc::new(Backend::new(&self.fqdn, backend_def.clone())));
                }
            }
        }

        for backend in &current {
            if !merged.iter().any(|b| b.address() == backend.address()) {
                info!(record = %self.fqdn, backend = %backend.address(), "backend removed");
                changes.removed.push(backend.address());
            }
        }

        *self.backends.write().await = merged;
        changes
    }

    async fn update_settings(&self, def: &RecordDefinition) -> bool {
        let mut settings = self.settings.write().await;
        let fqdn = &self.fqdn;
        let mut changed = false;

        macro_rules! sync_setting {
            ($field:ident) => {
                if settings.$field != def.$field {
                    info!(
                        record = %fqdn,
                        "record updated, {} changed from {:?} to {:?}",
                        stringify!($field),
                        settings.$field,
                        def.$field
                    );
                    settings.$field = def.$field.clone();
                    changed = true;
                }
            };
        }

        if settings.mode != def.mode {
            settings.selector = create_selector(def.mode);
        }
        sync_setting!(mode);
        sync_setting!(owner);
        sync_setting!(description);
        sync_setting!(ttl);
        sync_setting!(scrape_interval);
        sync_setting!(scrape_retries);
        sync_setting!(scrape_timeout);

        changed
    }
}
