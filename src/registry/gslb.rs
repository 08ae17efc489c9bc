// src/registry/gslb.rs
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{in_zone, normalize_fqdn, EngineConfig, IdlePolicy, Profiles, ZoneConfig};
use crate::error::SelectionError;
use crate::geo::{GeoDatabases, LocationMap};
use crate::health::{stagger_delays, ProbeRunner, QueryTracker, Scheduler};
use crate::metrics::MetricsCollector;
use crate::selection::AddressFamily;

use super::backend::BackendSummary;
use super::record::Record;

pub(super) type ZoneMap = HashMap<String, HashMap<String, Arc<Record>>>;

/// Addresses returned for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub addresses: Vec<IpAddr>,
    pub ttl: u32,
    /// False when no backend was healthy and every configured address was
    /// returned instead.
    pub healthy: bool,
}

/// Live registry of zones, records and backends plus the query API.
pub struct Gslb {
    pub(super) zones: RwLock<ZoneMap>,
    pub(super) locations: ArcSwap<LocationMap>,
    pub(super) geo: GeoDatabases,
    pub(super) profiles: Profiles,
    pub(super) scheduler: Scheduler,
    pub(super) max_stagger: Duration,
    pub(super) batch_size: usize,
    pub(super) metrics: Option<Arc<MetricsCollector>>,
    pub(super) shutdown: CancellationToken,
    pub(super) running: AtomicBool,
    pub(super) tasks: DashMap<String, JoinHandle<()>>,
    /// Serializes reloads; queries never take it.
    pub(super) reload_lock: Mutex<()>,
}

/// Builder so the binary and tests can assemble a registry piece by piece.
pub struct GslbBuilder {
    zones: Vec<ZoneConfig>,
    locations: LocationMap,
    geo: GeoDatabases,
    profiles: Profiles,
    policy: IdlePolicy,
    max_stagger: Duration,
    batch_size: usize,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Default for GslbBuilder {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        Self {
            zones: Vec::new(),
            locations: LocationMap::default(),
            geo: GeoDatabases::default(),
            profiles: Profiles::new(),
            policy: defaults.idle_policy(),
            max_stagger: defaults.max_stagger_start,
            batch_size: defaults.batch_size_start,
            metrics: None,
        }
    }
}

impl GslbBuilder {
    /// Take the idle and stagger settings from the engine config.
    pub fn with_engine_config(mut self, config: &EngineConfig) -> Self {
        self.policy = config.idle_policy();
        self.max_stagger = config.max_stagger_start;
        self.batch_size = config.batch_size_start;
        self
    }

    pub fn with_stagger(mut self, max_stagger: Duration, batch_size: usize) -> Self {
        self.max_stagger = max_stagger;
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_zone(mut self, zone: ZoneConfig) -> Self {
        self.zones.push(zone);
        self
    }

    pub fn with_locations(mut self, locations: LocationMap) -> Self {
        self.locations = locations;
        self
    }

    pub fn with_geo(mut self, geo: GeoDatabases) -> Self {
        self.geo = geo;
        self
    }

    /// Global profiles, used again when a zone file is reloaded.
    pub fn with_profiles(mut self, profiles: Profiles) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Gslb {
        let shutdown = CancellationToken::new();
        let tracker = QueryTracker::new();
        let scheduler = Scheduler::new(ProbeRunner::new(self.metrics.clone()), tracker, self.policy);

        let mut zones = ZoneMap::new();
        for config in &self.zones {
            let records = zones.entry(config.zone.clone()).or_default();
            for def in &config.records {
                records.insert(def.fqdn.clone(), Arc::new(Record::new(&config.zone, def, &shutdown)));
            }
        }

        Gslb {
            zones: RwLock::new(zones),
            locations: ArcSwap::from_pointee(self.locations),
            geo: self.geo,
            profiles: self.profiles,
            scheduler,
            max_stagger: self.max_stagger,
            batch_size: self.batch_size,
            metrics: self.metrics,
            shutdown,
            running: AtomicBool::new(false),
            tasks: DashMap::new(),
            reload_lock: Mutex::new(()),
        }
    }
}

impl Gslb {
    pub fn builder() -> GslbBuilder {
        GslbBuilder::default()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn locations(&self) -> Arc<LocationMap> {
        self.locations.load_full()
    }

    pub async fn zone_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.zones.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Records of a zone sorted by name.
    pub async fn records(&self, zone: &str) -> Vec<Arc<Record>> {
        let zones = self.zones.read().await;
        let mut records: Vec<Arc<Record>> = zones
            .get(&normalize_fqdn(zone))
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| a.fqdn().cmp(b.fqdn()));
        records
    }

    pub async fn find_record(&self, fqdn: &str) -> Option<Arc<Record>> {
        let fqdn = normalize_fqdn(fqdn);
        let zones = self.zones.read().await;
        zones.values().find_map(|records| records.get(&fqdn).cloned())
    }

    /// Whether `domain` falls under one of the configured zones.
    pub async fn is_authoritative(&self, domain: &str) -> bool {
        let domain = normalize_fqdn(domain);
        self.zones
            .read()
            .await
            .keys()
            .any(|zone| in_zone(&domain, zone))
    }

    pub async fn record_ttl(&self, fqdn: &str) -> Option<u32> {
        Some(self.find_record(fqdn).await?.ttl().await)
    }

    /// Note that `fqdn` was just queried. Keeps its probing at full rate.
    pub fn record_query(&self, fqdn: &str) {
        self.scheduler.tracker().touch(&normalize_fqdn(fqdn));
    }

    /// Addresses chosen by the record's policy among healthy backends.
    pub async fn pick_response(
        &self,
        fqdn: &str,
        family: AddressFamily,
        client_ip: IpAddr,
    ) -> Result<Vec<IpAddr>, SelectionError> {
        let record = self
            .find_record(fqdn)
            .await
            .ok_or_else(|| SelectionError::RecordNotFound(fqdn.to_string()))?;
        let locations = self.locations.load_full();
        let addresses = record
            .select(family, client_ip, &self.geo, &locations)
            .await?;

        if let (Some(metrics), [address]) = (&self.metrics, addresses.as_slice()) {
            metrics.record_backend_selected(record.fqdn(), &address.to_string());
        }
        Ok(addresses)
    }

    /// Every enabled address of the family, healthy or not.
    pub async fn pick_all_addresses(
        &self,
        fqdn: &str,
        family: AddressFamily,
    ) -> Result<Vec<IpAddr>, SelectionError> {
        let record = self
            .find_record(fqdn)
            .await
            .ok_or_else(|| SelectionError::RecordNotFound(fqdn.to_string()))?;
        record.all_addresses(family).await
    }

    /// Full query path: note the query, pick, and fall back to every
    /// configured address when nothing is healthy.
    pub async fn answer(
        &self,
        fqdn: &str,
        family: AddressFamily,
        client_ip: IpAddr,
    ) -> Result<Answer, SelectionError> {
        let record = self
            .find_record(fqdn)
            .await
            .ok_or_else(|| SelectionError::RecordNotFound(fqdn.to_string()))?;
        self.record_query(record.fqdn());

        let started = Instant::now();
        let ttl = record.ttl().await;
        let picked = self.pick_response(record.fqdn(), family, client_ip).await;

        let result = match picked {
            Ok(addresses) => {
                self.observe_resolution(record.fqdn(), "success", started);
                return Ok(Answer {
                    addresses,
                    ttl,
                    healthy: true,
                });
            }
            Err(error) => {
                debug!(record = %record.fqdn(), %family, %error, "no backend available, returning all addresses");
                record.all_addresses(family).await
            }
        };

        self.observe_resolution(record.fqdn(), "fail", started);
        result.map(|addresses| Answer {
            addresses,
            ttl,
            healthy: false,
        })
    }

    fn observe_resolution(&self, fqdn: &str, outcome: &str, started: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.observe_resolution(fqdn, outcome, started.elapsed());
        }
    }

    /// One status line per backend of the record.
    pub async fn backend_summaries(&self, fqdn: &str) -> Result<Vec<BackendSummary>, SelectionError> {
        let record = self
            .find_record(fqdn)
            .await
            .ok_or_else(|| SelectionError::RecordNotFound(fqdn.to_string()))?;
        let mut summaries = Vec::new();
        for backend in record.backends().await {
            summaries.push(backend.summary().await);
        }
        Ok(summaries)
    }

    /// Start every record's scheduler, staggered in batches. Idempotent.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut records = Vec::new();
        for zone in self.zone_names().await {
            records.extend(self.records(&zone).await);
        }
        let delays = stagger_delays(records.len(), self.batch_size, self.max_stagger);

        info!(
            records = records.len(),
            batch_size = self.batch_size,
            max_stagger = ?self.max_stagger,
            "starting health checks"
        );
        for (record, delay) in records.into_iter().zip(delays) {
            self.spawn_scheduler(record, delay);
        }
        self.update_inventory().await;
    }

    pub(super) fn spawn_scheduler(&self, record: Arc<Record>, delay: Duration) {
        let fqdn = record.fqdn().to_string();
        let handle = self.scheduler.spawn(record, delay);
        if let Some(previous) = self.tasks.insert(fqdn, handle) {
            previous.abort();
        }
    }

    /// Cancel every scheduler and wait for the loops to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.running.store(false, Ordering::SeqCst);

        let keys: Vec<String> = self.tasks.iter().map(|e| e.key().clone()).collect();
        let handles: Vec<JoinHandle<()>> = keys
            .iter()
            .filter_map(|k| self.tasks.remove(k).map(|(_, h)| h))
            .collect();
        let count = handles.len();
        join_all(handles).await;
        info!(schedulers = count, "health checks stopped");
    }

    /// Refresh the inventory gauges.
    pub async fn update_inventory(&self) {
        let Some(metrics) = &self.metrics else {
            return;
        };

        let zones: Vec<Vec<Arc<Record>>> = {
            let zones = self.zones.read().await;
            zones.values().map(|r| r.values().cloned().collect()).collect()
        };
        let (mut records, mut backends, mut healthchecks) = (0, 0, 0);
        for zone in &zones {
            records += zone.len();
            for record in zone {
                backends += record.backends().await.len();
                healthchecks += record.healthcheck_count().await;
            }
        }
        metrics.update_inventory(zones.len(), records, backends, healthchecks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendDefinition, RecordDefinition};
    use crate::selection::SelectionMode;
    use chrono::Utc;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn zone() -> ZoneConfig {
        let backends = ["10.0.0.1", "10.0.0.2", "2001:db8::1"]
            .iter()
            .map(|a| BackendDefinition::new(ip(a)))
            .collect();
        let mut web = RecordDefinition::new("web.example.org.", backends);
        web.mode = SelectionMode::RoundRobin;
        web.ttl = 45;
        ZoneConfig::new("example.org.", vec![web])
    }

    async fn mark(gslb: &Gslb, address: &str, alive: bool) {
        let record = gslb.find_record("web.example.org.").await.unwrap();
        let backend = record.backend(ip(address)).await.unwrap();
        backend
            .record_cycle(backend.begin_cycle(), alive, Duration::from_millis(5), Utc::now())
            .await;
    }

    struct ClientCountry(&'static str);
    impl crate::geo::CountryLookup for ClientCountry {
        fn country(&self, _ip: IpAddr) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_geo_databases_steer_geoip_records() {
        let mut us = BackendDefinition::new(ip("10.0.0.1"));
        us.priority = 1;
        us.country = Some("US".into());
        let mut fr = BackendDefinition::new(ip("10.0.0.2"));
        fr.priority = 2;
        fr.country = Some("FR".into());
        let mut geo_record = RecordDefinition::new("geo.example.org.", vec![us, fr]);
        geo_record.mode = SelectionMode::GeoIp;

        let geo = GeoDatabases {
            country: Some(Arc::new(ClientCountry("FR"))),
            ..Default::default()
        };
        let gslb = Gslb::builder()
            .with_zone(ZoneConfig::new("example.org.", vec![geo_record]))
            .with_geo(geo)
            .build();

        let record = gslb.find_record("geo.example.org.").await.unwrap();
        for backend in record.backends().await {
            backend
                .record_cycle(backend.begin_cycle(), true, Duration::from_millis(5), Utc::now())
                .await;
        }

        let picked = gslb
            .pick_response("geo.example.org.", AddressFamily::V4, ip("192.0.2.10"))
            .await
            .unwrap();
        assert_eq!(picked, vec![ip("10.0.0.2")]);
    }

    #[tokio::test]
    async fn test_lookup_helpers() {
        let gslb = Gslb::builder().with_zone(zone()).build();

        assert!(gslb.is_authoritative("WEB.example.org").await);
        assert!(gslb.is_authoritative("other.example.org.").await);
        assert!(!gslb.is_authoritative("example.net.").await);
        assert!(!gslb.is_authoritative("notexample.org.").await);
        assert_eq!(gslb.record_ttl("web.example.org").await, Some(45));
        assert_eq!(gslb.record_ttl("nope.example.org.").await, None);
        assert_eq!(gslb.zone_names().await, vec!["example.org.".to_string()]);
    }

    #[tokio::test]
    async fn test_pick_response_round_robin() {
        let gslb = Gslb::builder().with_zone(zone()).build();
        mark(&gslb, "10.0.0.1", true).await;
        mark(&gslb, "10.0.0.2", true).await;

        let client = ip("192.0.2.10");
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.extend(gslb.pick_response("web.example.org.", AddressFamily::V4, client).await.unwrap());
        }
        assert_eq!(seen, vec![ip("10.0.0.1"), ip("10.0.0.2"), ip("10.0.0.1"), ip("10.0.0.2")]);

        assert!(matches!(
            gslb.pick_response("missing.example.org.", AddressFamily::V4, client).await,
            Err(SelectionError::RecordNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_answer_falls_back_to_all_addresses() {
        let registry = crate::metrics::MetricsRegistry::new().unwrap();
        let gslb = Gslb::builder()
            .with_zone(zone())
            .with_metrics(registry.collector())
            .build();
        let client = ip("192.0.2.10");

        let answer = gslb.answer("web.example.org.", AddressFamily::V4, client).await.unwrap();
        assert!(!answer.healthy);
        assert_eq!(answer.ttl, 45);
        assert_eq!(answer.addresses, vec![ip("10.0.0.1"), ip("10.0.0.2")]);

        mark(&gslb, "2001:db8::1", true).await;
        let answer = gslb.answer("web.example.org.", AddressFamily::V6, client).await.unwrap();
        assert!(answer.healthy);
        assert_eq!(answer.addresses, vec![ip("2001:db8::1")]);

        let text = String::from_utf8(registry.gather().unwrap()).unwrap();
        assert!(text.contains("outcome=\"fail\""));
        assert!(text.contains("outcome=\"success\""));
        assert!(text.contains("gslb_backend_selected_total{"));
    }

    #[tokio::test]
    async fn test_backend_summaries() {
        let gslb = Gslb::builder().with_zone(zone()).build();
        mark(&gslb, "10.0.0.2", true).await;

        let summaries = gslb.backend_summaries("web.example.org.").await.unwrap();
        assert_eq!(summaries.len(), 3);
        assert!(!summaries[0].healthy);
        assert!(summaries[1].healthy);
        assert!(summaries[1].to_string().starts_with("Backend: 10.0.0.2 | Priority: 0 | Status: healthy"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_shutdown() {
        let gslb = Gslb::builder()
            .with_zone(zone())
            .with_stagger(Duration::from_secs(10), 1)
            .build();

        gslb.start().await;
        gslb.start().await;
        assert!(gslb.is_running());
        assert_eq!(gslb.tasks.len(), 1);

        // no probes configured, so the first cycle marks everything alive
        tokio::time::sleep(Duration::from_millis(10)).await;
        let answer = gslb.answer("web.example.org.", AddressFamily::V4, ip("192.0.2.1")).await.unwrap();
        assert!(answer.healthy);

        gslb.shutdown().await;
        assert!(!gslb.is_running());
        assert!(gslb.tasks.is_empty());
        let record = gslb.find_record("web.example.org.").await.unwrap();
        assert!(record.is_cancelled());
    }
}
