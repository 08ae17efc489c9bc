// src/health/probe.rs
use std::any::Any;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ProbeError};

use super::http::{HttpParams, HttpProbe};
use super::tcp::{TcpParams, TcpProbe};

/// One configured health check attached to a backend.
#[async_trait]
pub trait HealthProbe: Send + Sync + fmt::Debug {
    /// Stable identifier such as `https/443`, used for metrics labels.
    fn type_tag(&self) -> String;

    /// Probe `address` on behalf of `record`, retrying up to `max_retries`
    /// extra times. Must honour the probe's own timeout.
    async fn perform(&self, address: IpAddr, record: &str, max_retries: u32)
        -> Result<(), ProbeError>;

    /// Structural equality against another probe of any type.
    fn equivalent(&self, other: &dyn HealthProbe) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// A health check as written in a zone file or a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: serde_yaml::Value,
}

impl HealthCheckSpec {
    pub fn new(kind: impl Into<String>, params: serde_yaml::Value) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }

    fn decode<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        let params = if self.params.is_null() {
            serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
        } else {
            self.params.clone()
        };
        serde_yaml::from_value(params).map_err(|e| ConfigError::InvalidCheck {
            kind: self.kind.clone(),
            reason: e.to_string(),
        })
    }
}

/// Turn a spec into a concrete probe. `default_timeout` is the backend's
/// timeout, used when the params do not set one.
pub fn build_probe(
    spec: &HealthCheckSpec,
    default_timeout: Duration,
) -> Result<Arc<dyn HealthProbe>, ConfigError> {
    match spec.kind.trim().to_ascii_lowercase().as_str() {
        "http" => {
            let params: HttpParams = spec.decode()?;
            Ok(Arc::new(HttpProbe::new(params, default_timeout)?))
        }
        "tcp" => {
            let params: TcpParams = spec.decode()?;
            Ok(Arc::new(TcpProbe::new(params, default_timeout)?))
        }
        other => Err(ConfigError::UnsupportedCheck(other.to_string())),
    }
}

/// Same length and pairwise equivalent, in order.
pub fn probes_equivalent(a: &[Arc<dyn HealthProbe>], b: &[Arc<dyn HealthProbe>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equivalent(y.as_ref()))
}
