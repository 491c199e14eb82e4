//! Configuration file parser for ~/.config/newsletter-ingest/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde but logged as warnings, since they are
//! usually typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::feed::{DEFAULT_MAX_FEED_SIZE, DEFAULT_TIMEOUT};
use crate::registry::DEFAULT_PAGE_SIZE;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite registry location. Defaults to `ingest.db` in the config directory.
    pub database_path: Option<PathBuf>,

    /// Upper bound for one feed request, body included.
    pub request_timeout_secs: u64,

    /// Feeds larger than this are rejected.
    pub max_feed_bytes: usize,

    pub user_agent: String,

    /// Interval between poll cycles in `poll --watch` mode.
    pub poll_interval_minutes: u64,

    /// How many subscriptions are ingested at the same time.
    pub max_concurrent_fetches: usize,

    /// Rows per page when loading a subscription's ingested guids.
    pub registry_page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            request_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            max_feed_bytes: DEFAULT_MAX_FEED_SIZE,
            user_agent: concat!("newsletter-ingest/", env!("CARGO_PKG_VERSION")).to_string(),
            poll_interval_minutes: 15,
            max_concurrent_fetches: 10,
            registry_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 7] = [
        "database_path",
        "request_timeout_secs",
        "max_feed_bytes",
        "user_agent",
        "poll_interval_minutes",
        "max_concurrent_fetches",
        "registry_page_size",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            concurrency = config.max_concurrent_fetches,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Registry path: the configured one, or `ingest.db` under `config_dir`.
    pub fn database_path_or(&self, config_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| config_dir.join("ingest.db"))
    }
}

// ============================================================================
// Tests
// ============================================================================
