//! Configuration
//!
//! Settings come from an optional JSON file and are then overridden by
//! environment variables.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheOptions, DEFAULT_REPORT_CAPACITY};

/// Path of the JSON config file
pub const ENV_CONFIG: &str = "FSCACHE_CONFIG";
/// Source directory
pub const ENV_SOURCE: &str = "FSCACHE_SOURCE";
/// Cache directory
pub const ENV_CACHE_DIR: &str = "FSCACHE_CACHE_DIR";
/// Report channel capacity
pub const ENV_REPORT_CAPACITY: &str = "FSCACHE_REPORT_CAPACITY";
/// Populate timeout in seconds
pub const ENV_POPULATE_TIMEOUT: &str = "FSCACHE_POPULATE_TIMEOUT";

/// Caching layer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Directory served as the source
    pub source_dir: Option<PathBuf>,
    /// Root of the local cache store
    pub cache_dir: PathBuf,
    /// Room for unread population reports
    pub report_capacity: usize,
    /// Upper bound on one background population, in seconds
    pub populate_timeout_secs: Option<u64>,
    /// Remove stale temp files from the cache on startup
    pub cleanup_on_start: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            source_dir: None,
            cache_dir: default_cache_dir(),
            report_capacity: DEFAULT_REPORT_CAPACITY,
            populate_timeout_secs: None,
            cleanup_on_start: true,
        }
    }
}

/// Platform cache directory for fscache
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("fscache")
}

impl CacheConfig {
    /// Load a JSON config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_json(&raw).with_context(|| format!("Invalid config file: {:?}", path))
    }

    /// Parse a JSON config document
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to parse config")
    }

    /// Load from `FSCACHE_CONFIG` (if set), then apply environment overrides
    pub fn load() -> Result<Self> {
        let config = match env::var_os(ENV_CONFIG) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.with_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides looked up by environment variable name
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(source) = lookup(ENV_SOURCE) {
            self.source_dir = Some(PathBuf::from(source));
        }
        if let Some(cache_dir) = lookup(ENV_CACHE_DIR) {
            self.cache_dir = PathBuf::from(cache_dir);
        }
        if let Some(capacity) = lookup(ENV_REPORT_CAPACITY) {
            self.report_capacity = capacity
                .parse()
                .with_context(|| format!("{} must be a number, got {:?}", ENV_REPORT_CAPACITY, capacity))?;
        }
        if let Some(timeout) = lookup(ENV_POPULATE_TIMEOUT) {
            let secs: u64 = timeout
                .parse()
                .with_context(|| format!("{} must be seconds, got {:?}", ENV_POPULATE_TIMEOUT, timeout))?;
            self.populate_timeout_secs = (secs > 0).then_some(secs);
        }
        Ok(self)
    }

    /// Populate timeout as a Duration
    pub fn populate_timeout(&self) -> Option<Duration> {
        self.populate_timeout_secs.map(Duration::from_secs)
    }

    /// Options for the caching filesystem
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            report_capacity: self.report_capacity,
            populate_timeout: self.populate_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert!(config.source_dir.is_none());
        assert!(config.cache_dir.ends_with("fscache"));
        assert_eq!(config.report_capacity, DEFAULT_REPORT_CAPACITY);
        assert!(config.cleanup_on_start);
        assert!(config.populate_timeout().is_none());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = CacheConfig::from_json(
            r#"{
                "sourceDir": "/srv/music",
                "populateTimeoutSecs": 30
            }"#,
        )
        .unwrap();
        assert_eq!(config.source_dir, Some(PathBuf::from("/srv/music")));
        assert_eq!(config.populate_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.report_capacity, DEFAULT_REPORT_CAPACITY);
    }

    #[test]
    fn test_invalid_json() {
        assert!(CacheConfig::from_json("{ not json").is_err());
        assert!(CacheConfig::from_json(r#"{"reportCapacity": "lots"}"#).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("fscache.json");
        std::fs::write(&path, r#"{"cacheDir": "/var/cache/fscache", "cleanupOnStart": false}"#)
            .unwrap();

        let config = CacheConfig::from_file(&path).unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/fscache"));
        assert!(!config.cleanup_on_start);

        assert!(CacheConfig::from_file(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_SOURCE, "/mnt/upstream"),
            (ENV_CACHE_DIR, "/tmp/c"),
            (ENV_REPORT_CAPACITY, "8"),
            (ENV_POPULATE_TIMEOUT, "0"),
        ]
        .into_iter()
        .collect();

        let config = CacheConfig::default()
            .with_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.source_dir, Some(PathBuf::from("/mnt/upstream")));
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/c"));

        let options = config.cache_options();
        assert_eq!(options.report_capacity, 8);
        assert!(options.populate_timeout.is_none());
    }

    #[test]
    fn test_bad_env_override() {
        let result = CacheConfig::default().with_overrides(|key| {
            (key == ENV_REPORT_CAPACITY).then(|| "many".to_string())
        });
        assert!(result.is_err());
    }
}
