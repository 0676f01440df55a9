//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [store]      # window shape, rotation intervals, capacity
//! [logging]    # console level, rolling JSON log file
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sessiond_store::{
    DEFAULT_LONG_TERM_DEPTH, DEFAULT_LONG_TERM_INTERVAL, DEFAULT_MAX_SESSIONS,
    DEFAULT_RANDOM_TOKEN_TTL, DEFAULT_SHORT_TERM_DEPTH, DEFAULT_SHORT_TERM_INTERVAL, StoreConfig,
};

use crate::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessiondConfig {
    /// Session store configuration.
    pub store: Option<StoreSection>,

    /// Logging configuration.
    pub logging: Option<LoggingSection>,
}

impl SessiondConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: SessiondConfig) {
        if other.store.is_some() {
            self.store = other.store;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// The store section, or its defaults when absent.
    pub fn store_or_default(&self) -> StoreSection {
        self.store.clone().unwrap_or_default()
    }

    /// The logging section, or its defaults when absent.
    pub fn logging_or_default(&self) -> LoggingSection {
        self.logging.clone().unwrap_or_default()
    }

    /// Validate every present section.
    pub fn validate(&self) -> Result<()> {
        if let Some(ref store) = self.store {
            store.validate()?;
        }
        Ok(())
    }

    /// A fully populated config, as written by `sessiond config init`.
    pub fn with_defaults() -> Self {
        Self {
            store: Some(StoreSection::default()),
            logging: Some(LoggingSection::default()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Session store configuration.
///
/// ```toml
/// [store]
/// short_term_depth = 4
/// short_term_interval_secs = 900
/// long_term_depth = 7
/// long_term_interval_secs = 86400
/// max_sessions = 50000
/// max_sessions_per_context = 0
/// random_token_ttl_secs = 60
/// no_limit = false
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Generations in the short-term window.
    pub short_term_depth: usize,
    /// Seconds between short-term rotations.
    pub short_term_interval_secs: u64,
    /// Generations in the long-term window (0 disables the tier).
    pub long_term_depth: usize,
    /// Seconds between long-term rotations.
    pub long_term_interval_secs: u64,
    /// Maximum resident sessions (0 = unlimited).
    pub max_sessions: usize,
    /// Maximum resident sessions per context (0 = unlimited).
    pub max_sessions_per_context: usize,
    /// Seconds a random token stays redeemable.
    pub random_token_ttl_secs: u64,
    /// Skip all capacity checks.
    pub no_limit: bool,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            short_term_depth: DEFAULT_SHORT_TERM_DEPTH,
            short_term_interval_secs: DEFAULT_SHORT_TERM_INTERVAL.as_secs(),
            long_term_depth: DEFAULT_LONG_TERM_DEPTH,
            long_term_interval_secs: DEFAULT_LONG_TERM_INTERVAL.as_secs(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_sessions_per_context: 0,
            random_token_ttl_secs: DEFAULT_RANDOM_TOKEN_TTL.as_secs(),
            no_limit: false,
        }
    }
}

impl StoreSection {
    /// Reject values the store cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.short_term_depth == 0 {
            return Err(invalid("store.short_term_depth", "must be at least 1"));
        }
        if self.short_term_interval_secs == 0 {
            return Err(invalid("store.short_term_interval_secs", "must be positive"));
        }
        if self.long_term_depth > 0 && self.long_term_interval_secs == 0 {
            return Err(invalid(
                "store.long_term_interval_secs",
                "must be positive when the long-term tier is enabled",
            ));
        }
        if self.random_token_ttl_secs == 0 {
            return Err(invalid("store.random_token_ttl_secs", "must be positive"));
        }
        Ok(())
    }

    /// Build the store's runtime configuration.
    pub fn to_store_config(&self) -> StoreConfig {
        StoreConfig::new()
            .with_short_term_depth(self.short_term_depth)
            .with_short_term_interval(Duration::from_secs(self.short_term_interval_secs))
            .with_long_term_depth(self.long_term_depth)
            .with_long_term_interval(Duration::from_secs(self.long_term_interval_secs))
            .with_max_sessions(self.max_sessions)
            .with_max_sessions_per_context(self.max_sessions_per_context)
            .with_random_token_ttl(Duration::from_secs(self.random_token_ttl_secs))
            .with_no_limit(self.no_limit)
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Whether to write the daily rolling JSON log file.
    pub file: bool,
    /// Directory for log files. Defaults to the platform data directory.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: true,
            directory: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
