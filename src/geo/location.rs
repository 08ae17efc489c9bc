// src/geo/location.rs
use std::net::IpAddr;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// One `subnet -> location` entry of the custom table.
#[derive(Debug, Clone, PartialEq)]
pub struct SubnetLocation {
    network: IpAddr,
    prefix: u8,
    pub location: String,
}

impl SubnetLocation {
    pub fn parse(subnet: &str, location: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidSubnet(subnet.to_string());
        let (addr, len) = subnet.trim().split_once('/').ok_or_else(invalid)?;
        let network: IpAddr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = len.parse().map_err(|_| invalid())?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(invalid());
        }

        Ok(Self {
            network,
            prefix,
            location: location.to_string(),
        })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = if self.prefix == 0 {
                    0
                } else {
                    u32::MAX << (32 - self.prefix as u32)
                };
                (u32::from(net) & mask) == (u32::from(ip) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = if self.prefix == 0 {
                    0
                } else {
                    u128::MAX << (128 - self.prefix as u32)
                };
                (u128::from(net) & mask) == (u128::from(ip) & mask)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LocationFile {
    #[serde(default)]
    subnets: Vec<LocationEntry>,
}

#[derive(Debug, Deserialize)]
struct LocationEntry {
    subnet: String,
    location: String,
}

/// Custom subnet to location table. Replaced wholesale on reload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationMap {
    entries: Vec<SubnetLocation>,
}

impl LocationMap {
    pub fn new(entries: Vec<SubnetLocation>) -> Self {
        Self { entries }
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let parsed: LocationFile = serde_yaml::from_str(contents)?;
        let entries = parsed
            .subnets
            .iter()
            .map(|e| SubnetLocation::parse(&e.subnet, &e.location))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_yaml_str(&contents)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Location label of the most specific subnet containing `ip`.
    pub fn lookup(&self, ip: IpAddr) -> Option<&str> {
        self.entries
            .iter()
            .filter(|e| e.contains(ip))
            .max_by_key(|e| e.prefix)
            .map(|e| e.location.as_str())
    }
}
