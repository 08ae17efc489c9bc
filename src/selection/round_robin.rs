// src/selection/round_robin.rs
use crate::error::SelectionError;
use crate::selection::{Candidate, SelectionMode, SelectionRequest, Selector};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One address per query, rotating through the healthy backends.
///
/// The cursor belongs to the record's selector, so it survives reloads that
/// keep the mode unchanged.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for RoundRobin {
    fn select(&self, request: &SelectionRequest<'_>) -> Result<Vec<IpAddr>, SelectionError> {
        let healthy: Vec<&Candidate> = request.eligible().collect();
        if healthy.is_empty() {
            return Err(SelectionError::NoHealthyBackend {
                mode: SelectionMode::RoundRobin,
                family: request.family,
            });
        }

        let len = healthy.len();
        // Infallible: the closure always returns Some.
        let index = match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % len))
        {
            Ok(prev) | Err(prev) => prev,
        };

        Ok(vec![healthy[index % len].address])
    }

    fn mode(&self) -> SelectionMode {
        SelectionMode::RoundRobin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{GeoDatabases, LocationMap};
    use crate::selection::AddressFamily;

    fn request<'a>(
        candidates: &'a [Candidate],
        geo: &'a GeoDatabases,
        locations: &'a LocationMap,
    ) -> SelectionRequest<'a> {
        SelectionRequest {
            fqdn: "rr.example.org.",
            family: AddressFamily::V4,
            client_ip: "198.51.100.7".parse().unwrap(),
            candidates,
            geo,
            locations,
        }
    }

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let (geo, locations) = (GeoDatabases::default(), LocationMap::default());
        let candidates: Vec<Candidate> = ["10.0.0.1", "10.0.0.2", "10.0.0.3"]
            .iter()
            .map(|a| Candidate::new(a.parse().unwrap()))
            .collect();
        let req = request(&candidates, &geo, &locations);

        let first: Vec<IpAddr> = (0..3).map(|_| lb.select(&req).unwrap()[0]).collect();
        let second: Vec<IpAddr> = (0..3).map(|_| lb.select(&req).unwrap()[0]).collect();

        let addresses: Vec<IpAddr> = candidates.iter().map(|c| c.address).collect();
        assert_eq!(first, addresses);
        assert_eq!(second, first);
    }

    #[test]
    fn test_skips_unhealthy() {
        let lb = RoundRobin::new();
        let (geo, locations) = (GeoDatabases::default(), LocationMap::default());
        let candidates = vec![
            Candidate::new("10.0.0.1".parse().unwrap()),
            Candidate::new("10.0.0.2".parse().unwrap()).with_alive(false),
            Candidate::new("10.0.0.3".parse().unwrap()),
        ];
        let req = request(&candidates, &geo, &locations);

        let picks: Vec<String> = (0..4)
            .map(|_| lb.select(&req).unwrap()[0].to_string())
            .collect();
        assert_eq!(picks, vec!["10.0.0.1", "10.0.0.3", "10.0.0.1", "10.0.0.3"]);
    }

    #[test]
    fn test_cursor_wraps_when_pool_shrinks() {
        let lb = RoundRobin::new();
        let (geo, locations) = (GeoDatabases::default(), LocationMap::default());
        let three: Vec<Candidate> = ["10.0.0.1", "10.0.0.2", "10.0.0.3"]
            .iter()
            .map(|a| Candidate::new(a.parse().unwrap()))
            .collect();
        lb.select(&request(&three, &geo, &locations)).unwrap();
        lb.select(&request(&three, &geo, &locations)).unwrap();

        // cursor is now 2; a single healthy backend still answers
        let one = vec![three[0].clone()];
        assert_eq!(
            lb.select(&request(&one, &geo, &locations)).unwrap(),
            vec![three[0].address]
        );
    }

    #[test]
    fn test_empty_pool() {
        let lb = RoundRobin::new();
        let (geo, locations) = (GeoDatabases::default(), LocationMap::default());
        let err = lb.select(&request(&[], &geo, &locations)).unwrap_err();
        assert!(matches!(err, SelectionError::NoHealthyBackend { .. }));
    }
}
