// src/selection/geoip.rs
use std::net::IpAddr;

use tracing::debug;

use crate::error::SelectionError;

use super::algorithm::{Candidate, SelectionMode, SelectionRequest, Selector};
use super::failover::Failover;

/// Tiered geographic routing: country, city, ASN, then the custom subnet
/// table. The first tier with a match wins and answers with the first
/// matching backend; with no match the failover answer is returned.
#[derive(Debug, Default)]
pub struct GeoIp;

impl GeoIp {
    fn first_match<F>(request: &SelectionRequest<'_>, wanted: &str, field: F) -> Option<IpAddr>
    where
        F: Fn(&Candidate) -> Option<&str>,
    {
        request
            .eligible()
            .find(|c| field(c) == Some(wanted))
            .map(|c| c.address)
    }

    fn by_country(request: &SelectionRequest<'_>) -> Option<IpAddr> {
        let country = request.geo.country.as_ref()?.country(request.client_ip)?;
        if country.is_empty() {
            return None;
        }
        Self::first_match(request, &country, |c| c.country.as_deref())
    }

    fn by_city(request: &SelectionRequest<'_>) -> Option<IpAddr> {
        let city = request.geo.city.as_ref()?.city(request.client_ip)?.name?;
        if city.is_empty() {
            return None;
        }
        Self::first_match(request, &city, |c| c.city.as_deref())
    }

    fn by_asn(request: &SelectionRequest<'_>) -> Option<IpAddr> {
        let asn = request.geo.asn.as_ref()?.asn(request.client_ip)?;
        if asn == 0 {
            return None;
        }
        Self::first_match(request, &asn.to_string(), |c| c.asn.as_deref())
    }

    fn by_location(request: &SelectionRequest<'_>) -> Option<IpAddr> {
        let location = request.locations.lookup(request.client_ip)?;
        Self::first_match(request, location, |c| c.location.as_deref())
    }
}

impl Selector for GeoIp {
    fn select(&self, request: &SelectionRequest<'_>) -> Result<Vec<IpAddr>, SelectionError> {
        let tiers: [(&str, fn(&SelectionRequest<'_>) -> Option<IpAddr>); 4] = [
            ("country", GeoIp::by_country),
            ("city", GeoIp::by_city),
            ("asn", GeoIp::by_asn),
            ("location", GeoIp::by_location),
        ];

        for (tier, lookup) in tiers {
            if let Some(address) = lookup(request) {
                debug!(record = %request.fqdn, client = %request.client_ip, tier, backend = %address, "geoip match");
                return Ok(vec![address]);
            }
        }

        Failover::pick(request)
    }

    fn mode(&self) -> SelectionMode {
        SelectionMode::GeoIp
    }
}
