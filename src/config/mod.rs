// src/config/mod.rs
pub mod duration;
mod models;
pub mod watcher;
mod zone;

pub use models::*;
pub use watcher::{ConfigWatcher, WatchTarget};
pub use zone::{
    in_zone, load_profiles, load_zones, normalize_fqdn, BackendDefinition, Profiles, RecordDefinition, RejectedRecord,
    ZoneConfig,
};

use anyhow::{Context, Result};
use std::path::Path;

use crate::error::ConfigError;

/// Load engine settings from a file (YAML or JSON), with `GSLB_*`
/// environment variables taking precedence.
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let format = match path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => ::config::FileFormat::Yaml,
        _ => ::config::FileFormat::Json,
    };

    let config = parse_config(&contents, format, ::config::Environment::with_prefix("GSLB"))
        .context("Failed to parse engine config")?;

    config.validate()?;
    Ok(config)
}

fn parse_config(
    contents: &str,
    format: ::config::FileFormat,
    env: ::config::Environment,
) -> Result<EngineConfig, ConfigError> {
    let settings = ::config::Config::builder()
        .add_source(::config::File::from_str(contents, format))
        .add_source(env.try_parsing(true))
        .build()?;
    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn env(vars: &[(&str, &str)]) -> ::config::Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ::config::Environment::with_prefix("GSLB").source(Some(source))
    }

    #[test]
    fn test_yaml_settings() {
        let yaml = "zones:\n  example.org.: db.example.org.yml\nbatch_size_start: 5\nmax_stagger_start: 10s\n";
        let config = parse_config(yaml, ::config::FileFormat::Yaml, env(&[])).unwrap();
        assert_eq!(config.batch_size_start, 5);
        assert_eq!(config.max_stagger_start, Duration::from_secs(10));
        assert_eq!(config.healthcheck_idle_multiplier, 10);
        assert_eq!(config.zones.len(), 1);
    }

    #[test]
    fn test_geoip_maxmind_section() {
        let yaml = "zones:\n  example.org.: db.example.org.yml\ngeoip_maxmind:\n  city_db: GeoLite2-City.mmdb\n";
        let config = parse_config(yaml, ::config::FileFormat::Yaml, env(&[])).unwrap();
        assert_eq!(
            config.geoip_maxmind.city_db.as_deref(),
            Some(Path::new("GeoLite2-City.mmdb"))
        );
        assert!(config.geoip_maxmind.country_db.is_none());
    }

    #[test]
    fn test_json_settings() {
        let json = r#"{"zones": {"example.org.": "db.json.yml"}, "resolution_idle_timeout": "15m"}"#;
        let config = parse_config(json, ::config::FileFormat::Json, env(&[])).unwrap();
        assert_eq!(config.resolution_idle_timeout, Duration::from_secs(900));
    }

    #[test]
    fn test_environment_overrides_file() {
        let yaml = "zones:\n  example.org.: db.example.org.yml\nbatch_size_start: 5\n";
        let config = parse_config(
            yaml,
            ::config::FileFormat::Yaml,
            env(&[("GSLB_BATCH_SIZE_START", "50"), ("GSLB_HEALTHCHECK_IDLE_MULTIPLIER", "3")]),
        )
        .unwrap();
        assert_eq!(config.batch_size_start, 50);
        assert_eq!(config.healthcheck_idle_multiplier, 3);
    }

    #[tokio::test]
    async fn test_load_config_validates() {
        let dir = std::env::temp_dir().join(format!("gslb-config-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("gslb.yml");
        tokio::fs::write(&path, "batch_size_start: 5\n").await.unwrap();

        // no zones configured
        assert!(load_config(&path).await.is_err());
        assert!(load_config(dir.join("missing.yml")).await.is_err());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
