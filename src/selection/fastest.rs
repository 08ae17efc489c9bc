// src/selection/fastest.rs
use std::net::IpAddr;
use std::time::Duration;

use crate::error::SelectionError;

use super::algorithm::{Candidate, SelectionMode, SelectionRequest, Selector};
use super::failover::Failover;

/// The healthy backend with the lowest measured response time.
///
/// Backends that were never measured (zero response time) are only used when
/// nothing measured is available.
#[derive(Debug, Default)]
pub struct Fastest;

impl Selector for Fastest {
    fn select(&self, request: &SelectionRequest<'_>) -> Result<Vec<IpAddr>, SelectionError> {
        let mut best: Option<&Candidate> = None;
        let mut best_time = Duration::MAX;
        let mut any_measured = false;

        for candidate in request.eligible() {
            if candidate.response_time.is_zero() {
                if best.is_none() {
                    best = Some(candidate);
                }
                continue;
            }
            any_measured = true;
            if candidate.response_time < best_time {
                best_time = candidate.response_time;
                best = Some(candidate);
            }
        }

        let best = best.ok_or(SelectionError::NoHealthyBackend {
            mode: SelectionMode::Fastest,
            family: request.family,
        })?;

        if any_measured && best.response_time.is_zero() {
            return Failover::pick(request);
        }

        Ok(vec![best.address])
    }

    fn mode(&self) -> SelectionMode {
        SelectionMode::Fastest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{GeoDatabases, LocationMap};
    use crate::selection::AddressFamily;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn select(candidates: &[Candidate], family: AddressFamily) -> Result<Vec<IpAddr>, SelectionError> {
        let (geo, locations) = (GeoDatabases::default(), LocationMap::default());
        Fastest.select(&SelectionRequest {
            fqdn: "fast.example.org.",
            family,
            client_ip: ip("198.51.100.7"),
            candidates,
            geo: &geo,
            locations: &locations,
        })
    }

    #[test]
    fn test_lowest_response_time_wins() {
        let candidates = vec![
            Candidate::new(ip("10.0.0.1")).with_response_time(Duration::from_millis(80)),
            Candidate::new(ip("10.0.0.2")).with_response_time(Duration::from_millis(12)),
            Candidate::new(ip("10.0.0.3")).with_response_time(Duration::from_millis(40)),
        ];
        assert_eq!(select(&candidates, AddressFamily::V4).unwrap(), vec![ip("10.0.0.2")]);
    }

    #[test]
    fn test_measured_beats_unmeasured_listed_first() {
        let candidates = vec![
            Candidate::new(ip("10.0.0.1")),
            Candidate::new(ip("10.0.0.2")).with_response_time(Duration::from_millis(500)),
        ];
        assert_eq!(select(&candidates, AddressFamily::V4).unwrap(), vec![ip("10.0.0.2")]);
    }

    #[test]
    fn test_all_unmeasured_returns_first() {
        let candidates = vec![
            Candidate::new(ip("10.0.0.7")),
            Candidate::new(ip("10.0.0.8")),
        ];
        assert_eq!(select(&candidates, AddressFamily::V4).unwrap(), vec![ip("10.0.0.7")]);
    }

    #[test]
    fn test_skips_unhealthy_and_other_family() {
        let candidates = vec![
            Candidate::new(ip("10.0.0.1"))
                .with_response_time(Duration::from_millis(1))
                .with_alive(false),
            Candidate::new(ip("2001:db8::1")).with_response_time(Duration::from_millis(2)),
            Candidate::new(ip("2001:db8::2")).with_response_time(Duration::from_millis(9)),
        ];
        assert_eq!(select(&candidates, AddressFamily::V6).unwrap(), vec![ip("2001:db8::1")]);
        assert!(select(&candidates, AddressFamily::V4).is_err());
    }
}
