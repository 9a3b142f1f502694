//! Process-level configuration: where the database lives, what address the
//! push/health HTTP surface binds to, and how the data cleaner (§4.8) is
//! paced. Per-monitor and per-channel configuration lives in the database,
//! behind [`crate::repository::MonitorRepository`] — this file only covers
//! what has to exist before a repository can be opened.

use std::net::SocketAddr;

use tracing::trace;

fn default_database_path() -> String {
    "./guardia.db".to_string()
}

fn default_bind_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

fn default_retention_days() -> i64 {
    30
}

fn default_cleanup_interval_hours() -> u64 {
    24
}

/// Top-level process configuration, loaded from a JSON config file.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Bind address for the push-ingestion and health HTTP surface.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// How many days of status history to keep (§4.8).
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// How often the data cleaner runs, in hours.
    #[serde(default = "default_cleanup_interval_hours")]
    pub cleanup_interval_hours: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_addr: default_bind_addr(),
            retention_days: default_retention_days(),
            cleanup_interval_hours: default_cleanup_interval_hours(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        if self.retention_days < 1 {
            return Err("retention_days must be at least 1".to_string());
        }
        if self.retention_days > 3650 {
            return Err("retention_days cannot exceed 3650 (10 years)".to_string());
        }
        if self.cleanup_interval_hours < 1 {
            return Err("cleanup_interval_hours must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Reads and parses a JSON config file. Missing fields fall back to
/// defaults, so an empty `{}` is a valid, fully-defaulted configuration.
pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("invalid configuration file: {e}"))?;
    trace!("loaded config: {config:?}");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_resolves_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.database_path, default_database_path());
        assert_eq!(config.retention_days, default_retention_days());
    }

    #[test]
    fn validate_rejects_zero_retention() {
        let mut config = Config::default();
        config.retention_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(Config::default().validate().is_ok());
    }
}
