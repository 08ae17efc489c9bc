// src/config/zone.rs
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use tracing::{error, info, warn};

use crate::error::ConfigError;
use crate::health::{build_probe, HealthCheckSpec, HealthProbe};
use crate::selection::SelectionMode;

use super::duration;

pub type Profiles = HashMap<String, HealthCheckSpec>;

/// Lower-case with exactly one trailing dot.
pub fn normalize_fqdn(name: &str) -> String {
    let trimmed = name.trim().trim_end_matches('.');
    format!("{}.", trimmed.to_ascii_lowercase())
}

/// True when `fqdn` is `zone` itself or a name below it. Both must already
/// be normalized.
pub fn in_zone(fqdn: &str, zone: &str) -> bool {
    fqdn == zone || fqdn.ends_with(&format!(".{zone}"))
}

/// Validated settings of one backend, ready to be merged into live state.
#[derive(Debug, Clone)]
pub struct BackendDefinition {
    pub address: IpAddr,
    pub description: Option<String>,
    pub priority: i32,
    /// Already floored at 1.
    pub weight: u32,
    pub enabled: bool,
    pub tags: Vec<String>,
    pub timeout: Duration,
    pub country: Option<String>,
    pub city: Option<String>,
    pub asn: Option<String>,
    pub location: Option<String>,
    pub coordinates: Option<(f64, f64)>,
    pub probes: Vec<Arc<dyn HealthProbe>>,
}

impl BackendDefinition {
    /// A backend with default settings and no probes.
    pub fn new(address: IpAddr) -> Self {
        Self {
            address,
            description: None,
            priority: 0,
            weight: 1,
            enabled: true,
            tags: Vec::new(),
            timeout: Duration::from_secs(5),
            country: None,
            city: None,
            asn: None,
            location: None,
            coordinates: None,
            probes: Vec::new(),
        }
    }
}

/// Validated settings of one record.
#[derive(Debug, Clone)]
pub struct RecordDefinition {
    pub fqdn: String,
    pub mode: SelectionMode,
    pub owner: Option<String>,
    pub description: Option<String>,
    pub ttl: u32,
    pub scrape_interval: Duration,
    pub scrape_retries: u32,
    pub scrape_timeout: Duration,
    pub backends: Vec<BackendDefinition>,
}

impl RecordDefinition {
    /// A failover record with default timings.
    pub fn new(fqdn: &str, backends: Vec<BackendDefinition>) -> Self {
        Self {
            fqdn: normalize_fqdn(fqdn),
            mode: SelectionMode::default(),
            owner: None,
            description: None,
            ttl: default_ttl(),
            scrape_interval: default_scrape_interval(),
            scrape_retries: default_retries(),
            scrape_timeout: default_scrape_timeout(),
            backends,
        }
    }
}

/// A record that failed validation. On reload its live state is kept.
#[derive(Debug)]
pub struct RejectedRecord {
    pub fqdn: String,
    pub error: ConfigError,
}

/// Everything one zone file yields.
#[derive(Debug)]
pub struct ZoneConfig {
    pub zone: String,
    pub records: Vec<RecordDefinition>,
    pub rejected: Vec<RejectedRecord>,
}

impl ZoneConfig {
    pub fn new(zone: &str, records: Vec<RecordDefinition>) -> Self {
        Self {
            zone: normalize_fqdn(zone),
            records,
            rejected: Vec::new(),
        }
    }

    pub fn is_rejected(&self, fqdn: &str) -> bool {
        self.rejected.iter().any(|r| r.fqdn == fqdn)
    }

    pub async fn load(
        zone: &str,
        path: impl AsRef<Path>,
        global_profiles: &Profiles,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        if contents.trim().is_empty() {
            return Err(ConfigError::EmptyFile(path.to_path_buf()));
        }
        Self::from_yaml_str(zone, &contents, global_profiles)
    }

    /// Parse a zone file. Problems with the file as a whole are errors;
    /// problems with a single record land in `rejected`.
    pub fn from_yaml_str(
        zone: &str,
        yaml: &str,
        global_profiles: &Profiles,
    ) -> Result<Self, ConfigError> {
        let zone = normalize_fqdn(zone);
        let raw: RawZoneFile = serde_yaml::from_str(yaml)?;

        let mut config = ZoneConfig {
            zone: zone.clone(),
            records: Vec::new(),
            rejected: Vec::new(),
        };

        for (key, value) in raw.records {
            let name = key
                .as_str()
                .ok_or_else(|| ConfigError::MalformedRecord(format!("{key:?}")))?;
            let fqdn = normalize_fqdn(name);
            if !in_zone(&fqdn, &zone) {
                return Err(ConfigError::ZoneMismatch {
                    record: fqdn,
                    zone,
                });
            }

            let Value::Mapping(record) = value else {
                return Err(ConfigError::MalformedRecord(fqdn));
            };
            let mut merged = raw.defaults.clone();
            for (k, v) in record {
                merged.insert(k, v);
            }
            resolve_profiles(&fqdn, &mut merged, &raw.healthcheck_profiles, global_profiles)?;

            match build_record(&fqdn, Value::Mapping(merged)) {
                Ok(definition) => config.records.push(definition),
                Err(error) => {
                    warn!(record = %fqdn, zone = %zone, %error, "record rejected");
                    config.rejected.push(RejectedRecord { fqdn, error });
                }
            }
        }

        Ok(config)
    }
}

/// Load every configured zone. A zone whose file cannot be loaded is logged
/// and left out; the others still load.
pub async fn load_zones(
    zones: &BTreeMap<String, PathBuf>,
    profiles: &Profiles,
) -> Vec<ZoneConfig> {
    let mut loaded = Vec::with_capacity(zones.len());
    for (zone, path) in zones {
        match ZoneConfig::load(zone, path, profiles).await {
            Ok(config) => {
                if !config.rejected.is_empty() {
                    warn!(zone = %config.zone, rejected = config.rejected.len(), "zone loaded with invalid records");
                }
                info!(zone = %config.zone, records = config.records.len(), "zone loaded");
                loaded.push(config);
            }
            Err(error) => {
                error!(zone = %zone, path = %path.display(), %error, "failed to load zone, skipping");
            }
        }
    }
    loaded
}

/// Load the profile file shared across zones.
pub async fn load_profiles(path: impl AsRef<Path>) -> Result<Profiles, ConfigError> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if contents.trim().is_empty() {
        return Ok(Profiles::new());
    }
    let file: super::models::ProfileFile = serde_yaml::from_str(&contents)?;
    Ok(file.healthcheck_profiles)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawZoneFile {
    defaults: Mapping,
    healthcheck_profiles: Profiles,
    records: Mapping,
}

/// Replace profile names in every backend's `healthchecks` with the
/// profile body. Zone-file profiles shadow global ones.
fn resolve_profiles(
    fqdn: &str,
    record: &mut Mapping,
    local: &Profiles,
    global: &Profiles,
) -> Result<(), ConfigError> {
    let Some(Value::Sequence(backends)) = record.get_mut("backends") else {
        return Ok(());
    };

    for backend in backends.iter_mut() {
        let Value::Mapping(backend) = backend else {
            continue;
        };
        let Some(checks) = backend.get_mut("healthchecks") else {
            continue;
        };
        let Value::Sequence(checks) = checks else {
            return Err(ConfigError::MalformedRecord(format!(
                "{fqdn}: healthchecks must be a list"
            )));
        };

        for check in checks.iter_mut() {
            if let Value::String(name) = check {
                let profile = local
                    .get(name.as_str())
                    .or_else(|| global.get(name.as_str()))
                    .ok_or_else(|| ConfigError::UndefinedProfile(name.clone()))?;
                *check = serde_yaml::to_value(profile)?;
            }
        }
    }
    Ok(())
}

fn default_ttl() -> u32 {
    30
}

fn default_scrape_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_retries() -> u32 {
    1
}

fn default_scrape_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_weight() -> i64 {
    1
}

fn default_enable() -> bool {
    true
}

fn default_backend_timeout() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    mode: Option<String>,
    owner: Option<String>,
    description: Option<String>,
    #[serde(default = "default_ttl")]
    record_ttl: u32,
    #[serde(default = "default_scrape_interval", with = "duration")]
    scrape_interval: Duration,
    #[serde(default = "default_retries")]
    scrape_retries: u32,
    #[serde(default = "default_scrape_timeout", with = "duration")]
    scrape_timeout: Duration,
    #[serde(default)]
    backends: Vec<RawBackend>,
}

/// ASN written either as `64512` or `"AS64512"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Asn {
    Number(u64),
    Text(String),
}

impl fmt::Display for Asn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asn::Number(n) => write!(f, "{n}"),
            Asn::Text(s) => f.write_str(s.trim_start_matches("AS").trim_start_matches("as")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawBackend {
    address: String,
    description: Option<String>,
    #[serde(default)]
    priority: i32,
    #[serde(default = "default_weight")]
    weight: i64,
    #[serde(default = "default_enable")]
    enable: bool,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default = "default_backend_timeout", with = "duration")]
    timeout: Duration,
    country: Option<String>,
    city: Option<String>,
    asn: Option<Asn>,
    location: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(default)]
    healthchecks: Vec<HealthCheckSpec>,
}

fn build_record(fqdn: &str, value: Value) -> Result<RecordDefinition, ConfigError> {
    let raw: RawRecord = serde_yaml::from_value(value)?;

    let mode = match raw.mode.as_deref() {
        Some(mode) => mode.parse()?,
        None => SelectionMode::default(),
    };
    if raw.scrape_interval.is_zero() {
        return Err(ConfigError::Validation(format!(
            "{fqdn}: scrape_interval must be greater than 0"
        )));
    }
    if raw.scrape_timeout.is_zero() {
        return Err(ConfigError::Validation(format!(
            "{fqdn}: scrape_timeout must be greater than 0"
        )));
    }
    if raw.backends.is_empty() {
        return Err(ConfigError::EmptyRecord(fqdn.to_string()));
    }

    let mut seen = HashSet::new();
    let mut backends = Vec::with_capacity(raw.backends.len());
    for backend in raw.backends {
        let definition = build_backend(backend)?;
        if !seen.insert(definition.address) {
            return Err(ConfigError::DuplicateBackend {
                record: fqdn.to_string(),
                address: definition.address.to_string(),
            });
        }
        backends.push(definition);
    }

    Ok(RecordDefinition {
        fqdn: fqdn.to_string(),
        mode,
        owner: raw.owner,
        description: raw.description,
        ttl: raw.record_ttl,
        scrape_interval: raw.scrape_interval,
        scrape_retries: raw.scrape_retries,
        scrape_timeout: raw.scrape_timeout,
        backends,
    })
}

fn build_backend(raw: RawBackend) -> Result<BackendDefinition, ConfigError> {
    let address: IpAddr = raw
        .address
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidAddress(raw.address.clone()))?;

    let coordinates = match (raw.latitude, raw.longitude) {
        (None, None) => None,
        (Some(lat), Some(lon))
            if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) =>
        {
            Some((lat, lon))
        }
        _ => return Err(ConfigError::InvalidCoordinates(raw.address)),
    };

    let probes = raw
        .healthchecks
        .iter()
        .map(|spec| build_probe(spec, raw.timeout))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(BackendDefinition {
        address,
        description: raw.description,
        priority: raw.priority,
        weight: raw.weight.clamp(1, i64::from(u32::MAX)) as u32,
        enabled: raw.enable,
        tags: raw.tags,
        timeout: raw.timeout,
        country: raw.country.filter(|s| !s.is_empty()),
        city: raw.city.filter(|s| !s.is_empty()),
        asn: raw.asn.map(|a| a.to_string()).filter(|s| !s.is_empty()),
        location: raw.location.filter(|s| !s.is_empty()),
        coordinates,
        probes,
    })
}
