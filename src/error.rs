// src/error.rs
use std::path::PathBuf;

use crate::selection::{AddressFamily, SelectionMode};

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to load engine settings: {0}")]
    Settings(#[from] ::config::ConfigError),

    #[error("configuration file {0} is empty")]
    EmptyFile(PathBuf),

    #[error("invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("record {record} does not match zone {zone}")]
    ZoneMismatch { record: String, zone: String },

    #[error("record {0} is not a map")]
    MalformedRecord(String),

    #[error("healthcheck profile '{0}' is not defined")]
    UndefinedProfile(String),

    #[error("unsupported healthcheck type '{0}'")]
    UnsupportedCheck(String),

    #[error("invalid {kind} healthcheck: {reason}")]
    InvalidCheck { kind: String, reason: String },

    #[error("unknown mode '{0}'")]
    InvalidMode(String),

    #[error("invalid backend address '{0}'")]
    InvalidAddress(String),

    #[error("record {record} lists backend {address} more than once")]
    DuplicateBackend { record: String, address: String },

    #[error("record {0} has no backends")]
    EmptyRecord(String),

    #[error("backend {0}: latitude and longitude must be set together and within range")]
    InvalidCoordinates(String),

    #[error("failed to open MaxMind database {path}: {reason}")]
    GeoDatabase { path: PathBuf, reason: String },

    #[error("invalid subnet '{0}'")]
    InvalidSubnet(String),

    #[error("zone {0} is not configured")]
    UnknownZone(String),

    #[error("invalid setting: {0}")]
    Validation(String),
}

/// Errors returned to the DNS responder when no answer can be chosen.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectionError {
    #[error("domain not found: {0}")]
    RecordNotFound(String),

    #[error("no healthy backends in {mode} mode for {family}")]
    NoHealthyBackend {
        mode: SelectionMode,
        family: AddressFamily,
    },

    #[error("no backends exist for {fqdn} ({family})")]
    NoBackends { fqdn: String, family: AddressFamily },

    #[error("no healthy backends with coordinates for {0}")]
    NoCoordinates(AddressFamily),

    #[error("weighted selection failed")]
    WeightedExhausted,
}

/// Failure reported by a single health probe.
///
/// The runner reduces every variant to `alive = false`; the class only feeds
/// the failure counter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("timed out")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

impl ProbeError {
    /// Label used by `gslb_healthcheck_failures_total`.
    pub fn class(&self) -> &'static str {
        match self {
            ProbeError::Connection(_) => "connection",
            ProbeError::Protocol(_) => "protocol",
            ProbeError::Timeout => "timeout",
            ProbeError::Other(_) => "other",
        }
    }
}
