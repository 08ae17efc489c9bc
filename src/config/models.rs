// src/config/models.rs
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::health::HealthCheckSpec;

use super::duration;

/// Process-wide engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Zone name to zone file.
    pub zones: BTreeMap<String, PathBuf>,
    #[serde(with = "duration")]
    pub max_stagger_start: Duration,
    pub batch_size_start: usize,
    #[serde(with = "duration")]
    pub resolution_idle_timeout: Duration,
    pub healthcheck_idle_multiplier: u32,
    /// Optional subnet to location map for the geoip policy.
    pub geoip_custom: Option<PathBuf>,
    /// MaxMind databases for the geoip and nearest policies.
    pub geoip_maxmind: MaxMindConfig,
    /// Optional file of profiles shared by every zone.
    pub healthcheck_profiles: Option<PathBuf>,
    pub metrics: MetricsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            zones: BTreeMap::new(),
            max_stagger_start: Duration::from_secs(60),
            batch_size_start: 100,
            resolution_idle_timeout: Duration::from_secs(3600),
            healthcheck_idle_multiplier: 10,
            geoip_custom: None,
            geoip_maxmind: MaxMindConfig::default(),
            healthcheck_profiles: None,
            metrics: MetricsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9153,
            path: "/metrics".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxMindConfig {
    pub country_db: Option<PathBuf>,
    pub city_db: Option<PathBuf>,
    pub asn_db: Option<PathBuf>,
}

/// Inputs of the adaptive probing interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdlePolicy {
    pub resolution_idle_timeout: Duration,
    pub multiplier: u32,
}

impl Default for IdlePolicy {
    fn default() -> Self {
        EngineConfig::default().idle_policy()
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.zones.is_empty() {
            return Err(ConfigError::Validation("at least one zone must be configured".into()));
        }
        if self.batch_size_start == 0 {
            return Err(ConfigError::Validation("batch_size_start must be greater than 0".into()));
        }
        if self.healthcheck_idle_multiplier == 0 {
            return Err(ConfigError::Validation(
                "healthcheck_idle_multiplier must be at least 1".into(),
            ));
        }
        if self.resolution_idle_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "resolution_idle_timeout must be greater than 0".into(),
            ));
        }
        if self.metrics.enabled && !self.metrics.path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "metrics path '{}' must start with '/'",
                self.metrics.path
            )));
        }
        Ok(())
    }

    pub fn idle_policy(&self) -> IdlePolicy {
        IdlePolicy {
            resolution_idle_timeout: self.resolution_idle_timeout,
            multiplier: self.healthcheck_idle_multiplier,
        }
    }
}

/// Layout of the global profile file.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProfileFile {
    #[serde(default)]
    pub healthcheck_profiles: HashMap<String, HealthCheckSpec>,
}
