//! Application configuration management.
//!
//! Loads and saves application-wide settings from the platform config
//! directory. Everything here is a tunable with a sensible default: the
//! timeout, cache, and TTL values are representative, not contractual,
//! and can be changed without touching engine logic.

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Extractor binary to invoke.
    #[serde(default = "default_exiftool_binary")]
    pub exiftool_binary: PathBuf,

    /// Per-exchange extraction timeout in seconds.
    #[serde(default = "default_extraction_timeout_secs")]
    pub extraction_timeout_secs: u64,

    /// Memory-tier cache bound (entries).
    #[serde(default = "default_memory_cache_entries")]
    pub memory_cache_entries: usize,

    /// Files per extraction exchange.
    #[serde(default = "default_extraction_chunk_size")]
    pub extraction_chunk_size: usize,

    /// Preview memoization TTL in milliseconds.
    #[serde(default = "default_preview_ttl_ms")]
    pub preview_ttl_ms: u64,

    /// Fragment memoization TTL in milliseconds.
    #[serde(default = "default_fragment_ttl_ms")]
    pub fragment_ttl_ms: u64,
}

fn default_exiftool_binary() -> PathBuf {
    PathBuf::from("exiftool")
}

fn default_extraction_timeout_secs() -> u64 {
    10
}

fn default_memory_cache_entries() -> usize {
    crate::cache::DEFAULT_MEMORY_CAPACITY
}

fn default_extraction_chunk_size() -> usize {
    crate::metadata::loader::DEFAULT_CHUNK_SIZE
}

fn default_preview_ttl_ms() -> u64 {
    100
}

fn default_fragment_ttl_ms() -> u64 {
    50
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exiftool_binary: default_exiftool_binary(),
            extraction_timeout_secs: default_extraction_timeout_secs(),
            memory_cache_entries: default_memory_cache_entries(),
            extraction_chunk_size: default_extraction_chunk_size(),
            preview_ttl_ms: default_preview_ttl_ms(),
            fragment_ttl_ms: default_fragment_ttl_ms(),
        }
    }
}

impl Config {
    /// Load the configuration from the default platform-specific path.
    ///
    /// Any failure falls back to defaults; a broken config file must not
    /// keep the tool from running.
    pub fn load() -> Self {
        match Self::load_internal() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Failed to load config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    fn load_internal() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save the configuration to the default platform-specific path.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// The extraction timeout as a [`Duration`].
    #[must_use]
    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    /// Default platform-specific path for the persistent metadata cache.
    pub fn default_cache_path() -> Result<PathBuf> {
        let dirs = Self::project_dirs()?;
        Ok(dirs.cache_dir().join("metadata.db"))
    }

    fn config_path() -> Result<PathBuf> {
        let dirs = Self::project_dirs()?;
        Ok(dirs.config_dir().join("config.json"))
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "oncutf", "oncutf")
            .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.extraction_timeout_secs, 10);
        assert_eq!(config.memory_cache_entries, 1000);
        assert_eq!(config.preview_ttl_ms, 100);
        assert_eq!(config.extraction_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"extraction_timeout_secs": 30}"#).unwrap();
        assert_eq!(config.extraction_timeout_secs, 30);
        assert_eq!(config.memory_cache_entries, 1000);
        assert_eq!(config.exiftool_binary, PathBuf::from("exiftool"));
    }

    #[test]
    fn test_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.extraction_chunk_size, config.extraction_chunk_size);
    }
}
