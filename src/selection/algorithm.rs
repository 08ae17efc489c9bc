// src/selection/algorithm.rs
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SelectionError};
use crate::geo::{GeoDatabases, LocationMap};

use super::{
    fastest::Fastest, failover::Failover, geoip::GeoIp, nearest::Nearest, random::Random,
    round_robin::RoundRobin, weighted::Weighted,
};

/// Policy used to answer queries for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SelectionMode {
    Failover,
    RoundRobin,
    Random,
    Weighted,
    GeoIp,
    Nearest,
    Fastest,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::Failover => "failover",
            SelectionMode::RoundRobin => "roundrobin",
            SelectionMode::Random => "random",
            SelectionMode::Weighted => "weighted",
            SelectionMode::GeoIp => "geoip",
            SelectionMode::Nearest => "nearest",
            SelectionMode::Fastest => "fastest",
        }
    }
}

impl Default for SelectionMode {
    fn default() -> Self {
        SelectionMode::Failover
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "failover" => Ok(SelectionMode::Failover),
            "roundrobin" | "round-robin" | "round_robin" => Ok(SelectionMode::RoundRobin),
            "random" => Ok(SelectionMode::Random),
            "weighted" => Ok(SelectionMode::Weighted),
            "geoip" => Ok(SelectionMode::GeoIp),
            "nearest" | "closest" => Ok(SelectionMode::Nearest),
            "fastest" => Ok(SelectionMode::Fastest),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}

impl TryFrom<String> for SelectionMode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SelectionMode> for String {
    fn from(mode: SelectionMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Address family requested by the query (A vs AAAA).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Family of an address; IPv4-mapped IPv6 addresses count as IPv4.
    pub fn of(ip: IpAddr) -> Self {
        match ip.to_canonical() {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    pub fn matches(&self, ip: IpAddr) -> bool {
        AddressFamily::of(ip) == *self
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => f.write_str("IPv4"),
            AddressFamily::V6 => f.write_str("IPv6"),
        }
    }
}

/// Read-consistent copy of one backend taken at query time.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub address: IpAddr,
    pub priority: i32,
    /// Effective weight, never below 1.
    pub weight: u32,
    pub enabled: bool,
    pub alive: bool,
    /// Duration of the last completed probe cycle; zero when never measured.
    pub response_time: Duration,
    pub country: Option<String>,
    pub city: Option<String>,
    pub asn: Option<String>,
    pub location: Option<String>,
    pub coordinates: Option<(f64, f64)>,
}

impl Candidate {
    /// A healthy, enabled candidate with default priority and weight.
    pub fn new(address: IpAddr) -> Self {
        Self {
            address,
            priority: 0,
            weight: 1,
            enabled: true,
            alive: true,
            response_time: Duration::ZERO,
            country: None,
            city: None,
            asn: None,
            location: None,
            coordinates: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight.max(1);
        self
    }

    pub fn with_alive(mut self, alive: bool) -> Self {
        self.alive = alive;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_response_time(mut self, response_time: Duration) -> Self {
        self.response_time = response_time;
        self
    }

    pub fn with_country(mut self, country: &str) -> Self {
        self.country = Some(country.to_string());
        self
    }

    pub fn with_city(mut self, city: &str) -> Self {
        self.city = Some(city.to_string());
        self
    }

    pub fn with_asn(mut self, asn: &str) -> Self {
        self.asn = Some(asn.to_string());
        self
    }

    pub fn with_location(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.coordinates = Some((latitude, longitude));
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.enabled && self.alive
    }
}

/// Everything a policy needs to answer one query.
pub struct SelectionRequest<'a> {
    pub fqdn: &'a str,
    pub family: AddressFamily,
    pub client_ip: IpAddr,
    pub candidates: &'a [Candidate],
    pub geo: &'a GeoDatabases,
    pub locations: &'a LocationMap,
}

impl<'a> SelectionRequest<'a> {
    /// Healthy candidates of the requested family, in configuration order.
    pub fn eligible(&self) -> impl Iterator<Item = &'a Candidate> + '_ {
        let family = self.family;
        self.candidates
            .iter()
            .filter(move |c| c.is_healthy() && family.matches(c.address))
    }
}

pub trait Selector: Send + Sync + fmt::Debug {
    fn select(&self, request: &SelectionRequest<'_>) -> Result<Vec<IpAddr>, SelectionError>;

    fn mode(&self) -> SelectionMode;
}

/// Build the selector for a mode. Round-robin selectors carry their own
/// cursor, so each record gets a fresh instance.
pub fn create_selector(mode: SelectionMode) -> Arc<dyn Selector> {
    match mode {
        SelectionMode::Failover => Arc::new(Failover),
        SelectionMode::RoundRobin => Arc::new(RoundRobin::new()),
        SelectionMode::Random => Arc::new(Random),
        SelectionMode::Weighted => Arc::new(Weighted),
        SelectionMode::GeoIp => Arc::new(GeoIp),
        SelectionMode::Nearest => Arc::new(Nearest),
        SelectionMode::Fastest => Arc::new(Fastest),
    }
}
