// src/selection/nearest.rs
use std::net::IpAddr;

use crate::error::SelectionError;
use crate::geo::haversine_km;

use super::algorithm::{SelectionMode, SelectionRequest, Selector};
use super::failover::Failover;

/// The single healthy backend closest to the client's city coordinates.
#[derive(Debug, Default)]
pub struct Nearest;

impl Nearest {
    /// Minimum-distance candidate among those with coordinates.
    pub fn closest_to(
        request: &SelectionRequest<'_>,
        latitude: f64,
        longitude: f64,
    ) -> Result<IpAddr, SelectionError> {
        request
            .eligible()
            .filter_map(|c| {
                let (lat, lon) = c.coordinates?;
                Some((haversine_km(latitude, longitude, lat, lon), c.address))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, address)| address)
            .ok_or(SelectionError::NoCoordinates(request.family))
    }
}

impl Selector for Nearest {
    fn select(&self, request: &SelectionRequest<'_>) -> Result<Vec<IpAddr>, SelectionError> {
        let client = request
            .geo
            .city
            .as_ref()
            .and_then(|db| db.city(request.client_ip))
            .and_then(|city| city.coordinates());

        let Some((latitude, longitude)) = client else {
            return Failover::pick(request);
        };

        match Nearest::closest_to(request, latitude, longitude) {
            Ok(address) => Ok(vec![address]),
            Err(_) => Failover::pick(request),
        }
    }

    fn mode(&self) -> SelectionMode {
        SelectionMode::Nearest
    }
}
