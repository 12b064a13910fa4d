//! Cache configuration.
//!
//! Retry and wait settings are read from `~/.config/equipcache/config.json`
//! (or any path given to `load_from`), then optionally overridden from
//! `EQUIPCACHE_*` environment variables. Every field has a default, so an
//! absent file or an empty object is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::retry::{RetryPolicy, DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF_MS};

/// Application name used for the config directory path
const APP_NAME: &str = "equipcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default time `wait_until_ready_default` blocks for.
/// 30s covers a cold start against a slow store while still surfacing a hang.
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub wait_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
        }
    }
}

impl CacheConfig {
    /// Load from the user config directory, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Override fields from `EQUIPCACHE_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parse<T: std::str::FromStr>(key: &str, value: Option<String>) -> Option<T> {
            let value = value?;
            match value.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(key, value = %value, "Ignoring invalid config override");
                    None
                }
            }
        }

        if let Some(v) = parse("EQUIPCACHE_MAX_ATTEMPTS", lookup("EQUIPCACHE_MAX_ATTEMPTS")) {
            self.max_attempts = v;
        }
        if let Some(v) = parse("EQUIPCACHE_INITIAL_BACKOFF_MS", lookup("EQUIPCACHE_INITIAL_BACKOFF_MS")) {
            self.initial_backoff_ms = v;
        }
        if let Some(v) = parse("EQUIPCACHE_MAX_BACKOFF_MS", lookup("EQUIPCACHE_MAX_BACKOFF_MS")) {
            self.max_backoff_ms = v;
        }
        if let Some(v) = parse("EQUIPCACHE_WAIT_TIMEOUT_MS", lookup("EQUIPCACHE_WAIT_TIMEOUT_MS")) {
            self.wait_timeout_ms = v;
        }
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.max_attempts == 0 {
            return Err(CacheError::InvalidConfig(
                "maxAttempts must be at least 1".to_string(),
            ));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(CacheError::InvalidConfig(format!(
                "maxBackoffMs ({}) is smaller than initialBackoffMs ({})",
                self.max_backoff_ms, self.initial_backoff_ms
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry_policy().max_attempts, 3);
        assert_eq!(config.retry_policy().backoff_for(1), Duration::from_millis(200));
        assert_eq!(config.wait_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"maxAttempts": 5}"#).unwrap();

        let config = CacheConfig::load_from(file.path()).unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_backoff_ms, DEFAULT_INITIAL_BACKOFF_MS);
    }

    #[test]
    fn test_unparseable_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"maxAttempts = 5").unwrap();

        let err = CacheConfig::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_overrides_apply_and_ignore_garbage() {
        let vars: HashMap<&str, &str> = [
            ("EQUIPCACHE_MAX_ATTEMPTS", "7"),
            ("EQUIPCACHE_INITIAL_BACKOFF_MS", "fast"),
            ("EQUIPCACHE_WAIT_TIMEOUT_MS", " 1000 "),
        ]
        .into_iter()
        .collect();

        let mut config = CacheConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.max_attempts, 7);
        assert_eq!(config.initial_backoff_ms, DEFAULT_INITIAL_BACKOFF_MS);
        assert_eq!(config.wait_timeout_ms, 1000);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_attempts = CacheConfig {
            max_attempts: 0,
            ..CacheConfig::default()
        };
        assert!(zero_attempts.validate().is_err());

        let inverted = CacheConfig {
            initial_backoff_ms: 1000,
            max_backoff_ms: 10,
            ..CacheConfig::default()
        };
        assert!(inverted.validate().is_err());
    }
}
