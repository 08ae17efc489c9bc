// src/health/tcp.rs
use std::any::Any;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{ConfigError, ProbeError};

use super::probe::HealthProbe;
use super::retry::{RetryDecision, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TcpParams {
    pub port: u16,
    #[serde(default, with = "crate::config::duration::option")]
    pub timeout: Option<Duration>,
}

/// Alive when a TCP connection to the port completes in time.
#[derive(Debug)]
pub struct TcpProbe {
    params: TcpParams,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(params: TcpParams, default_timeout: Duration) -> Result<Self, ConfigError> {
        if params.port == 0 {
            return Err(ConfigError::InvalidCheck {
                kind: "tcp".to_string(),
                reason: "port must be non-zero".to_string(),
            });
        }
        let timeout = params.timeout.unwrap_or(default_timeout);
        Ok(Self { params, timeout })
    }

    async fn connect(&self, addr: SocketAddr) -> Result<(), ProbeError> {
        match timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(ProbeError::Connection(e.to_string())),
            Err(_) => Err(ProbeError::Timeout),
        }
    }
}

#[async_trait]
impl HealthProbe for TcpProbe {
    fn type_tag(&self) -> String {
        format!("tcp/{}", self.params.port)
    }

    async fn perform(
        &self,
        address: IpAddr,
        record: &str,
        max_retries: u32,
    ) -> Result<(), ProbeError> {
        let addr = SocketAddr::new(address, self.params.port);
        let target = addr.to_string();

        RetryPolicy::new(max_retries)
            .execute(&target, || self.connect(addr), |_| RetryDecision::Retry)
            .await?;

        debug!(record = %record, backend = %addr, "tcp healthcheck passed");
        Ok(())
    }

    fn equivalent(&self, other: &dyn HealthProbe) -> bool {
        other
            .as_any()
            .downcast_ref::<TcpProbe>()
            .map_or(false, |o| o.params == self.params && o.timeout == self.timeout)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
