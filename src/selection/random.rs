// src/selection/random.rs
use std::net::IpAddr;

use rand::seq::SliceRandom;

use crate::error::SelectionError;

use super::algorithm::{SelectionMode, SelectionRequest, Selector};

/// All healthy backends, uniformly shuffled.
#[derive(Debug, Default)]
pub struct Random;

impl Selector for Random {
    fn select(&self, request: &SelectionRequest<'_>) -> Result<Vec<IpAddr>, SelectionError> {
        let mut addresses: Vec<IpAddr> = request.eligible().map(|c| c.address).collect();
        if addresses.is_empty() {
            return Err(SelectionError::NoHealthyBackend {
                mode: SelectionMode::Random,
                family: request.family,
            });
        }

        addresses.shuffle(&mut rand::thread_rng());
        Ok(addresses)
    }

    fn mode(&self) -> SelectionMode {
        SelectionMode::Random
    }
}
