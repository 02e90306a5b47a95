//! Engine configuration.

use std::time::Duration;

/// Default key prefix of persisted sync snapshots.
pub const DEFAULT_KEY_PREFIX: &str = "sync/";

/// Debounce and persistence settings of a [`SyncRegistry`](crate::SyncRegistry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Quiet period after the last write before a patch call fires.
    pub min_delay: Duration,
    /// Longest a write may wait, counted from the first unflushed write.
    pub max_delay: Duration,
    /// Prefix of the storage keys snapshots are written under.
    pub key_prefix: String,
}

impl EngineConfig {
    /// Creates a configuration with the default delays (5 s / 20 s).
    pub fn new() -> Self {
        Self {
            min_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(20),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// Sets the quiet period.
    pub fn with_min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    /// Sets the longest wait.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the storage key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Delay before the next patch call, given how long ago the first
    /// unflushed write happened.
    ///
    /// ```
    /// use pushsync_engine::EngineConfig;
    /// use std::time::Duration;
    ///
    /// let config = EngineConfig::new();
    /// assert_eq!(config.debounce_delay(Duration::ZERO), Duration::from_secs(5));
    /// assert_eq!(config.debounce_delay(Duration::from_secs(18)), Duration::from_secs(2));
    /// assert_eq!(config.debounce_delay(Duration::from_secs(60)), Duration::ZERO);
    /// ```
    pub fn debounce_delay(&self, since_first_write: Duration) -> Duration {
        self.min_delay
            .min(self.max_delay.saturating_sub(since_first_write))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
