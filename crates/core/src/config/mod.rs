//! Store configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (TAGCACHE_*)
//! 2. TOML config file (if TAGCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Store configuration, loaded once at startup and never mutated afterwards.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (TAGCACHE_*)
/// 2. TOML config file (if TAGCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via TAGCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// How long a connection waits on a locked database file, in milliseconds.
    ///
    /// Set via TAGCACHE_BUSY_TIMEOUT_MS environment variable.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Delete expired tag and gallery rows once when the store is opened.
    ///
    /// Set via TAGCACHE_PURGE_ON_OPEN environment variable.
    #[serde(default)]
    pub purge_on_open: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("cache/cache.db")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { db_path: default_db_path(), busy_timeout_ms: default_busy_timeout_ms(), purge_on_open: false }
    }
}

impl AppConfig {
    /// Busy timeout as Duration for use with rusqlite.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `TAGCACHE_`
    /// 2. TOML file from `TAGCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("TAGCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        Self::extract(figment.merge(
            Env::prefixed("TAGCACHE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        ))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("cache/cache.db"));
        assert_eq!(config.busy_timeout_ms, 5_000);
        assert!(!config.purge_on_open);
    }

    #[test]
    fn test_busy_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.busy_timeout(), Duration::from_millis(5_000));
    }

    #[test]
    fn test_toml_layer_overrides_defaults() {
        let figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::string(
            r#"
            db_path = "/var/lib/tagcache/cache.db"
            purge_on_open = true
            "#,
        ));

        let config = AppConfig::extract(figment).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/var/lib/tagcache/cache.db"));
        assert!(config.purge_on_open);
        assert_eq!(config.busy_timeout_ms, 5_000);
    }

    #[test]
    fn test_extract_rejects_invalid_values() {
        let figment =
            Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::string("busy_timeout_ms = 900000"));

        let result = AppConfig::extract(figment);
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "busy_timeout_ms"));
    }

    #[test]
    fn test_extract_reports_type_errors() {
        let figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::string(r#"busy_timeout_ms = "soon""#));

        assert!(matches!(AppConfig::extract(figment), Err(ConfigError::LoadFailed(_))));
    }
}
