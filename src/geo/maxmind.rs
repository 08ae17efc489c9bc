// src/geo/maxmind.rs
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use maxminddb::{geoip2, Reader};
use tracing::{debug, info};

use crate::config::MaxMindConfig;
use crate::error::ConfigError;

use super::{AsnLookup, CityInfo, CityLookup, CountryLookup, GeoDatabases};

/// One MaxMind database file held in memory.
pub struct MaxMindDb {
    path: PathBuf,
    reader: Reader<Vec<u8>>,
}

impl MaxMindDb {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = Reader::from_source(bytes).map_err(|e| ConfigError::GeoDatabase {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!(
            path = %path.display(),
            database = %reader.metadata.database_type,
            "MaxMind database loaded"
        );
        Ok(Self {
            path: path.to_path_buf(),
            reader,
        })
    }

    pub fn database_type(&self) -> &str {
        &self.reader.metadata.database_type
    }

    fn lookup<'a, T: serde::Deserialize<'a>>(&'a self, ip: IpAddr) -> Option<T> {
        match self.reader.lookup::<T>(ip) {
            Ok(found) => Some(found),
            Err(error) => {
                debug!(path = %self.path.display(), %ip, %error, "MaxMind lookup missed");
                None
            }
        }
    }
}

impl std::fmt::Debug for MaxMindDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaxMindDb")
            .field("path", &self.path)
            .field("database_type", &self.database_type())
            .finish()
    }
}

impl CountryLookup for MaxMindDb {
    fn country(&self, ip: IpAddr) -> Option<String> {
        let found: geoip2::Country = self.lookup(ip)?;
        found.country?.iso_code.map(str::to_string)
    }
}

impl CityLookup for MaxMindDb {
    fn city(&self, ip: IpAddr) -> Option<CityInfo> {
        let found: geoip2::City = self.lookup(ip)?;
        let name = found
            .city
            .and_then(|city| city.names)
            .and_then(|names| names.get("en").map(|name| name.to_string()));
        let (latitude, longitude) = found
            .location
            .map(|location| (location.latitude, location.longitude))
            .unwrap_or((None, None));
        Some(CityInfo {
            name,
            latitude,
            longitude,
        })
    }
}

impl AsnLookup for MaxMindDb {
    fn asn(&self, ip: IpAddr) -> Option<u32> {
        let found: geoip2::Asn = self.lookup(ip)?;
        found.autonomous_system_number
    }
}

impl GeoDatabases {
    /// Open every configured database. A file that cannot be read fails the
    /// whole set.
    pub async fn open(config: &MaxMindConfig) -> Result<Self, ConfigError> {
        let mut databases = GeoDatabases::default();
        if let Some(path) = &config.country_db {
            databases.country = Some(Arc::new(MaxMindDb::open(path).await?));
        }
        if let Some(path) = &config.city_db {
            databases.city = Some(Arc::new(MaxMindDb::open(path).await?));
        }
        if let Some(path) = &config.asn_db {
            databases.asn = Some(Arc::new(MaxMindDb::open(path).await?));
        }
        Ok(databases)
    }
}
