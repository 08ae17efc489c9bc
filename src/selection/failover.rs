// src/selection/failover.rs
use std::net::IpAddr;

use crate::error::SelectionError;

use super::algorithm::{SelectionMode, SelectionRequest, Selector};

/// Every healthy backend sharing the lowest priority value.
#[derive(Debug, Default)]
pub struct Failover;

impl Failover {
    /// Shared with the geoip, nearest and fastest policies as their fallback.
    pub fn pick(request: &SelectionRequest<'_>) -> Result<Vec<IpAddr>, SelectionError> {
        let lowest = request
            .eligible()
            .map(|c| c.priority)
            .min()
            .ok_or(SelectionError::NoHealthyBackend {
                mode: SelectionMode::Failover,
                family: request.family,
            })?;

        Ok(request
            .eligible()
            .filter(|c| c.priority == lowest)
            .map(|c| c.address)
            .collect())
    }
}

impl Selector for Failover {
    fn select(&self, request: &SelectionRequest<'_>) -> Result<Vec<IpAddr>, SelectionError> {
        Failover::pick(request)
    }

    fn mode(&self) -> SelectionMode {
        SelectionMode::Failover
    }
}
