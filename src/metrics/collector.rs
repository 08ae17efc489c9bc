// src/metrics/collector.rs
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    /// Text exposition of every registered family.
    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("failed to encode metrics")?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Health checks
    pub healthcheck_failures_total: IntCounterVec,
    pub healthcheck_duration_seconds: HistogramVec,
    pub backend_healthy: IntGaugeVec,

    // Resolution
    pub backend_selected_total: IntCounterVec,
    pub record_resolution_duration_seconds: HistogramVec,
    pub record_resolutions_total: IntCounterVec,

    // Configuration
    pub config_reloads_total: IntCounterVec,
    pub zones_total: IntGauge,
    pub records_total: IntGauge,
    pub backends_total: IntGauge,
    pub healthchecks_total: IntGauge,
    pub build_info: IntGaugeVec,
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector").finish_non_exhaustive()
    }
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let healthcheck_failures_total = IntCounterVec::new(
            Opts::new(
                "gslb_healthcheck_failures_total",
                "Failed health checks by type, backend and failure class",
            ),
            &["type", "address", "reason"],
        )?;
        registry.register(Box::new(healthcheck_failures_total.clone()))?;

        let healthcheck_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gslb_healthcheck_duration_seconds",
                "Health check duration in seconds",
            ),
            &["record", "type", "address", "result"],
        )?;
        registry.register(Box::new(healthcheck_duration_seconds.clone()))?;

        let backend_healthy = IntGaugeVec::new(
            Opts::new(
                "gslb_backend_healthy",
                "Backend aliveness after the last probe cycle (1=alive, 0=dead)",
            ),
            &["record", "address"],
        )?;
        registry.register(Box::new(backend_healthy.clone()))?;

        let backend_selected_total = IntCounterVec::new(
            Opts::new(
                "gslb_backend_selected_total",
                "Times a backend address was returned in an answer",
            ),
            &["record", "address"],
        )?;
        registry.register(Box::new(backend_selected_total.clone()))?;

        let record_resolution_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gslb_record_resolution_duration_seconds",
                "Time spent choosing an answer for a record",
            ),
            &["record", "outcome"],
        )?;
        registry.register(Box::new(record_resolution_duration_seconds.clone()))?;

        let record_resolutions_total = IntCounterVec::new(
            Opts::new("gslb_record_resolutions_total", "Record resolutions by outcome"),
            &["record", "outcome"],
        )?;
        registry.register(Box::new(record_resolutions_total.clone()))?;

        let config_reloads_total = IntCounterVec::new(
            Opts::new("gslb_config_reloads_total", "Configuration reloads by result"),
            &["result"],
        )?;
        registry.register(Box::new(config_reloads_total.clone()))?;

        let zones_total = IntGauge::new("gslb_zones_total", "Configured zones")?;
        registry.register(Box::new(zones_total.clone()))?;

        let records_total = IntGauge::new("gslb_records_total", "Configured records")?;
        registry.register(Box::new(records_total.clone()))?;

        let backends_total = IntGauge::new("gslb_backends_total", "Configured backends")?;
        registry.register(Box::new(backends_total.clone()))?;

        let healthchecks_total =
            IntGauge::new("gslb_healthchecks_total", "Configured health checks")?;
        registry.register(Box::new(healthchecks_total.clone()))?;

        let build_info = IntGaugeVec::new(
            Opts::new("gslb_build_info", "Build information"),
            &["version"],
        )?;
        registry.register(Box::new(build_info.clone()))?;
        build_info
            .with_label_values(&[env!("CARGO_PKG_VERSION")])
            .set(1);

        Ok(Self {
            healthcheck_failures_total,
            healthcheck_duration_seconds,
            backend_healthy,
            backend_selected_total,
            record_resolution_duration_seconds,
            record_resolutions_total,
            config_reloads_total,
            zones_total,
            records_total,
            backends_total,
            healthchecks_total,
            build_info,
        })
    }

    pub fn record_healthcheck_failure(&self, check_type: &str, address: &str, reason: &str) {
        self.healthcheck_failures_total
            .with_label_values(&[check_type, address, reason])
            .inc();
    }

    pub fn observe_healthcheck(
        &self,
        record: &str,
        check_type: &str,
        address: &str,
        success: bool,
        duration: Duration,
    ) {
        let result = if success { "success" } else { "fail" };
        self.healthcheck_duration_seconds
            .with_label_values(&[record, check_type, address, result])
            .observe(duration.as_secs_f64());
    }

    pub fn update_backend_health(&self, record: &str, address: &str, alive: bool) {
        let value = if alive { 1 } else { 0 };
        self.backend_healthy
            .with_label_values(&[record, address])
            .set(value);
    }

    pub fn remove_backend(&self, record: &str, address: &str) {
        let _ = self.backend_healthy.remove_label_values(&[record, address]);
    }

    pub fn record_backend_selected(&self, record: &str, address: &str) {
        self.backend_selected_total
            .with_label_values(&[record, address])
            .inc();
    }

    pub fn observe_resolution(&self, record: &str, outcome: &str, duration: Duration) {
        self.record_resolutions_total
            .with_label_values(&[record, outcome])
            .inc();
        self.record_resolution_duration_seconds
            .with_label_values(&[record, outcome])
            .observe(duration.as_secs_f64());
    }

    pub fn record_reload(&self, success: bool) {
        let result = if success { "success" } else { "fail" };
        self.config_reloads_total.with_label_values(&[result]).inc();
    }

    pub fn update_inventory(&self, zones: usize, records: usize, backends: usize, healthchecks: usize) {
        self.zones_total.set(zones as i64);
        self.records_total.set(records as i64);
        self.backends_total.set(backends as i64);
        self.healthchecks_total.set(healthchecks as i64);
    }
}
