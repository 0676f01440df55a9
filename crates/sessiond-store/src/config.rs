//! Configuration for the session store.

use std::time::Duration;

/// Default number of generations in the short-term window.
pub const DEFAULT_SHORT_TERM_DEPTH: usize = 4;

/// Default interval between short-term rotations.
/// With the default depth an untouched session lives about one hour.
pub const DEFAULT_SHORT_TERM_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Default number of generations in the long-term window.
pub const DEFAULT_LONG_TERM_DEPTH: usize = 7;

/// Default interval between long-term rotations (one day).
pub const DEFAULT_LONG_TERM_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default maximum number of resident sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 50_000;

/// Default lifetime of a random token.
pub const DEFAULT_RANDOM_TOKEN_TTL: Duration = Duration::from_secs(60);

/// Configuration for the session store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Number of generations in the short-term window. Clamped to at least 1.
    pub short_term_depth: usize,

    /// Interval between short-term rotations.
    pub short_term_interval: Duration,

    /// Number of generations in the long-term window.
    /// Zero disables the long-term tier.
    pub long_term_depth: usize,

    /// Interval between long-term rotations.
    pub long_term_interval: Duration,

    /// Maximum number of resident sessions (0 = unlimited).
    pub max_sessions: usize,

    /// Maximum number of resident sessions per context (0 = unlimited).
    pub max_sessions_per_context: usize,

    /// Lifetime of a random token before it silently expires.
    pub random_token_ttl: Duration,

    /// Bypass all capacity checks.
    pub no_limit: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            short_term_depth: DEFAULT_SHORT_TERM_DEPTH,
            short_term_interval: DEFAULT_SHORT_TERM_INTERVAL,
            long_term_depth: DEFAULT_LONG_TERM_DEPTH,
            long_term_interval: DEFAULT_LONG_TERM_INTERVAL,
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_sessions_per_context: 0,
            random_token_ttl: DEFAULT_RANDOM_TOKEN_TTL,
            no_limit: false,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the short-term window depth.
    pub fn with_short_term_depth(mut self, depth: usize) -> Self {
        self.short_term_depth = depth;
        self
    }

    /// Set the short-term rotation interval.
    pub fn with_short_term_interval(mut self, interval: Duration) -> Self {
        self.short_term_interval = interval;
        self
    }

    /// Set the long-term window depth (0 disables the tier).
    pub fn with_long_term_depth(mut self, depth: usize) -> Self {
        self.long_term_depth = depth;
        self
    }

    /// Disable the long-term tier.
    pub fn without_long_term(mut self) -> Self {
        self.long_term_depth = 0;
        self
    }

    /// Set the long-term rotation interval.
    pub fn with_long_term_interval(mut self, interval: Duration) -> Self {
        self.long_term_interval = interval;
        self
    }

    /// Set the global session limit.
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the per-context session limit.
    pub fn with_max_sessions_per_context(mut self, max: usize) -> Self {
        self.max_sessions_per_context = max;
        self
    }

    /// Set the random token lifetime.
    pub fn with_random_token_ttl(mut self, ttl: Duration) -> Self {
        self.random_token_ttl = ttl;
        self
    }

    /// Enable or disable "no limit" mode.
    pub fn with_no_limit(mut self, enabled: bool) -> Self {
        self.no_limit = enabled;
        self
    }

    /// Whether sessions falling off the short-term window are kept.
    pub fn long_term_enabled(&self) -> bool {
        self.long_term_depth > 0
    }

    pub(crate) fn effective_short_term_depth(&self) -> usize {
        self.short_term_depth.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.short_term_depth, DEFAULT_SHORT_TERM_DEPTH);
        assert_eq!(config.max_sessions, DEFAULT_MAX_SESSIONS);
        assert!(config.long_term_enabled());
        assert!(!config.no_limit);
    }

    #[test]
    fn test_builders() {
        let config = StoreConfig::new()
            .with_short_term_depth(0)
            .without_long_term()
            .with_max_sessions(3)
            .with_random_token_ttl(Duration::from_millis(10));

        assert_eq!(config.effective_short_term_depth(), 1);
        assert!(!config.long_term_enabled());
        assert_eq!(config.max_sessions, 3);
        assert_eq!(config.random_token_ttl, Duration::from_millis(10));
    }
}
