//! Process-wide configuration — load from YAML, overlay with environment.
//!
//! Mirrors the pattern used for workflow routing config in the source
//! codebase: a plain serde struct loaded from a file, with defaults for
//! every field so a missing config file still produces a usable config.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::pool::PoolConfig;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tdengine_host: String,
    pub mysql_host: String,
    pub mysql_port: u16,
    pub db_user: String,
    pub db_password: String,
    pub resource_db: String,
    pub alarm_db: String,
    pub http_port: u16,
    pub websocket_port: u16,
    pub multicast_ip: String,
    pub multicast_port: u16,
    pub bmc_multicast_ip: String,
    pub bmc_multicast_port: u16,
    pub evaluation_interval: DurationSecs,
    pub stats_interval: DurationSecs,
    pub relational_pool: PoolConfig,
    pub ts_pool: PoolConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tdengine_host: "localhost".to_string(),
            mysql_host: "localhost".to_string(),
            mysql_port: 3306,
            db_user: "root".to_string(),
            db_password: String::new(),
            resource_db: "resource_db".to_string(),
            alarm_db: "alarm_db".to_string(),
            http_port: 8080,
            websocket_port: 8081,
            multicast_ip: "224.100.200.10".to_string(),
            multicast_port: 5710,
            bmc_multicast_ip: "224.100.200.15".to_string(),
            bmc_multicast_port: 5715,
            evaluation_interval: DurationSecs(Duration::from_secs(30)),
            stats_interval: DurationSecs(Duration::from_secs(60)),
            relational_pool: PoolConfig::default(),
            ts_pool: PoolConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a YAML file if present, falling back to defaults; then
    /// apply a small set of environment overrides for secrets that should
    /// never live in a checked-in file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_yaml::from_str(&raw)
                .with_context(|| format!("parsing config file {}", path.display()))?
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        if let Ok(v) = std::env::var("MYSQL_HOST") {
            config.mysql_host = v;
        }
        if let Ok(v) = std::env::var("DB_PASSWORD") {
            config.db_password = v;
        }
        if let Ok(v) = std::env::var("TDENGINE_HOST") {
            config.tdengine_host = v;
        }

        Ok(config)
    }

    pub fn mysql_dsn(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.db_user, self.db_password, self.mysql_host, self.mysql_port, self.alarm_db
        )
    }

    pub fn taos_dsn(&self) -> String {
        format!(
            "taos://{}:6030/{}?user={}&password={}",
            self.tdengine_host, self.resource_db, self.db_user, self.db_password
        )
    }
}

/// Wrapper so `Duration` round-trips through YAML as plain seconds instead
/// of requiring a nested struct in the config file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DurationSecs(#[serde(with = "duration_secs")] pub Duration);

impl From<DurationSecs> for Duration {
    fn from(d: DurationSecs) -> Duration {
        d.0
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let config = AppConfig::default();
        assert_eq!(config.mysql_port, 3306);
        assert_eq!(config.bmc_multicast_port, 5715);
        assert_eq!(Duration::from(config.evaluation_interval), Duration::from_secs(30));
    }

    #[test]
    fn load_falls_back_to_defaults_when_file_missing() {
        let config = AppConfig::load("/nonexistent/path/config.yaml").unwrap();
        assert_eq!(config.http_port, 8080);
    }

    #[test]
    fn mysql_dsn_embeds_credentials() {
        let config = AppConfig::default();
        let dsn = config.mysql_dsn();
        assert!(dsn.starts_with("mysql://root:@localhost:3306/"));
    }
}
