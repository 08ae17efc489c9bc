// src/selection/weighted.rs
use std::net::IpAddr;

use rand::Rng;

use crate::error::SelectionError;

use super::algorithm::{Candidate, SelectionMode, SelectionRequest, Selector};

/// Roulette-wheel choice proportional to backend weight.
#[derive(Debug, Default)]
pub struct Weighted;

impl Weighted {
    /// Walk the wheel for a draw in `[0, total_weight)`.
    pub fn pick_with_draw(candidates: &[&Candidate], draw: u64) -> Option<IpAddr> {
        let mut cumulative = 0u64;
        for candidate in candidates {
            cumulative += u64::from(candidate.weight);
            if draw < cumulative {
                return Some(candidate.address);
            }
        }
        None
    }
}

impl Selector for Weighted {
    fn select(&self, request: &SelectionRequest<'_>) -> Result<Vec<IpAddr>, SelectionError> {
        let eligible: Vec<&Candidate> = request.eligible().filter(|c| c.weight > 0).collect();
        let total: u64 = eligible.iter().map(|c| u64::from(c.weight)).sum();
        if eligible.is_empty() || total == 0 {
            return Err(SelectionError::NoHealthyBackend {
                mode: SelectionMode::Weighted,
                family: request.family,
            });
        }

        let draw = rand::thread_rng().gen_range(0..total);
        Weighted::pick_with_draw(&eligible, draw)
            .map(|address| vec![address])
            .ok_or(SelectionError::WeightedExhausted)
    }

    fn mode(&self) -> SelectionMode {
        SelectionMode::Weighted
    }
}
