//! Object store configuration.

use std::time::Duration;

/// Configuration for opening an object store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether to sync the backing store after every commit (safer but slower).
    pub sync_on_commit: bool,

    /// GET waits longer than this are logged at `warn` level.
    ///
    /// A wait is never cut short; the threshold only makes long waits visible.
    pub slow_wait_threshold: Duration,

    /// Whether a backing store failure stops the store from starting new
    /// transactions.
    pub halt_on_store_failure: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
            slow_wait_threshold: Duration::from_secs(1),
            halt_on_store_failure: true,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to sync after every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the slow lock wait threshold.
    #[must_use]
    pub const fn slow_wait_threshold(mut self, threshold: Duration) -> Self {
        self.slow_wait_threshold = threshold;
        self
    }

    /// Sets whether a store failure halts the store.
    #[must_use]
    pub const fn halt_on_store_failure(mut self, value: bool) -> Self {
        self.halt_on_store_failure = value;
        self
    }
}
