// src/geo/mod.rs
//! Client geolocation inputs consumed by the geoip and nearest policies.
//!
//! Policies only see the three lookup traits below plus the custom subnet
//! table. `MaxMindDb` implements all three over a MaxMind database file.

mod distance;
mod location;
mod maxmind;

pub use distance::haversine_km;
pub use location::{LocationMap, SubnetLocation};
pub use maxmind::MaxMindDb;

use std::net::IpAddr;
use std::sync::Arc;

/// City-level lookup result.
#[derive(Debug, Clone, PartialEq)]
pub struct CityInfo {
    /// English city name, if the database has one.
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl CityInfo {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

pub trait CountryLookup: Send + Sync {
    /// ISO country code for the client address.
    fn country(&self, ip: IpAddr) -> Option<String>;
}

pub trait CityLookup: Send + Sync {
    fn city(&self, ip: IpAddr) -> Option<CityInfo>;
}

pub trait AsnLookup: Send + Sync {
    /// Autonomous system number; zero means unknown.
    fn asn(&self, ip: IpAddr) -> Option<u32>;
}

/// Optional lookup services, each absent unless configured.
#[derive(Clone, Default)]
pub struct GeoDatabases {
    pub country: Option<Arc<dyn CountryLookup>>,
    pub city: Option<Arc<dyn CityLookup>>,
    pub asn: Option<Arc<dyn AsnLookup>>,
}

impl GeoDatabases {
    pub fn is_empty(&self) -> bool {
        self.country.is_none() && self.city.is_none() && self.asn.is_none()
    }
}

impl std::fmt::Debug for GeoDatabases {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoDatabases")
            .field("country", &self.country.is_some())
            .field("city", &self.city.is_some())
            .field("asn", &self.asn.is_some())
            .finish()
    }
}
