//! Synchronization engine configuration.
use std::time::Duration;

/// Configuration for the synchronization engine.
// Not implementing `Copy` as `splits_filter_query` is heap-allocated.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Interval between periodic split refreshes.
    ///
    /// Defaults to [`SyncConfig::DEFAULT_FEATURES_REFRESH_RATE`].
    pub features_refresh_rate: Duration,
    /// Interval between periodic segment refreshes.
    ///
    /// Defaults to [`SyncConfig::DEFAULT_SEGMENTS_REFRESH_RATE`].
    pub segments_refresh_rate: Duration,
    /// First retry delay. Each consecutive failure doubles it.
    ///
    /// Defaults to [`SyncConfig::DEFAULT_RETRY_BACKOFF_BASE`].
    pub retry_backoff_base: Duration,
    /// Upper bound for retry delays.
    ///
    /// Defaults to [`SyncConfig::DEFAULT_MAX_BACKOFF`].
    pub max_backoff: Duration,
    /// Maximum number of attempts a push-triggered update worker makes before giving up.
    ///
    /// Defaults to [`SyncConfig::DEFAULT_UPDATE_MAX_RETRIES`].
    pub update_max_retries: u32,
    /// Maximum number of attempts for the initial sync. `None` retries until stopped.
    pub bootstrap_max_retries: Option<u32>,
    /// Random delay added to every periodic interval. This helps to avoid multiple instances
    /// synchronizing and producing spiky network load.
    ///
    /// Defaults to [`SyncConfig::DEFAULT_POLL_JITTER`].
    pub poll_jitter: Duration,
    /// Query string restricting which splits are fetched (e.g., `names=a,b`).
    pub splits_filter_query: Option<String>,
    /// Split definitions last updated longer ago than this are dropped before the initial sync,
    /// which then starts from scratch.
    ///
    /// Defaults to [`SyncConfig::DEFAULT_CACHE_EXPIRATION`].
    pub cache_expiration: Duration,
}

impl SyncConfig {
    /// Default value for [`SyncConfig::features_refresh_rate`].
    pub const DEFAULT_FEATURES_REFRESH_RATE: Duration = Duration::from_secs(3600);
    /// Default value for [`SyncConfig::segments_refresh_rate`].
    pub const DEFAULT_SEGMENTS_REFRESH_RATE: Duration = Duration::from_secs(1800);
    /// Default value for [`SyncConfig::retry_backoff_base`].
    pub const DEFAULT_RETRY_BACKOFF_BASE: Duration = Duration::from_secs(1);
    /// Default value for [`SyncConfig::max_backoff`].
    pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(1800);
    /// Default value for [`SyncConfig::update_max_retries`].
    pub const DEFAULT_UPDATE_MAX_RETRIES: u32 = 10;
    /// Default value for [`SyncConfig::poll_jitter`].
    pub const DEFAULT_POLL_JITTER: Duration = Duration::from_secs(3);
    /// Default value for [`SyncConfig::cache_expiration`] (10 days).
    pub const DEFAULT_CACHE_EXPIRATION: Duration = Duration::from_secs(10 * 24 * 3600);

    /// Create a new `SyncConfig` using default configuration.
    pub fn new() -> SyncConfig {
        SyncConfig::default()
    }

    /// Update split refresh interval with `interval`.
    pub fn with_features_refresh_rate(mut self, interval: Duration) -> SyncConfig {
        self.features_refresh_rate = interval;
        self
    }

    /// Update segment refresh interval with `interval`.
    pub fn with_segments_refresh_rate(mut self, interval: Duration) -> SyncConfig {
        self.segments_refresh_rate = interval;
        self
    }

    /// Update retry backoff base with `base`.
    pub fn with_retry_backoff_base(mut self, base: Duration) -> SyncConfig {
        self.retry_backoff_base = base;
        self
    }

    /// Update maximum retry delay with `max`.
    pub fn with_max_backoff(mut self, max: Duration) -> SyncConfig {
        self.max_backoff = max;
        self
    }

    /// Update the attempt limit of push-triggered update workers.
    pub fn with_update_max_retries(mut self, max_retries: u32) -> SyncConfig {
        self.update_max_retries = max_retries;
        self
    }

    /// Bound the number of attempts of the initial sync.
    pub fn with_bootstrap_max_retries(mut self, max_retries: u32) -> SyncConfig {
        self.bootstrap_max_retries = Some(max_retries);
        self
    }

    /// Update periodic refresh jitter with `jitter`.
    pub fn with_poll_jitter(mut self, jitter: Duration) -> SyncConfig {
        self.poll_jitter = jitter;
        self
    }

    /// Only fetch splits matching `query`.
    pub fn with_splits_filter_query(mut self, query: impl Into<String>) -> SyncConfig {
        self.splits_filter_query = Some(query.into());
        self
    }

    /// Update split definitions expiration with `expiration`.
    pub fn with_cache_expiration(mut self, expiration: Duration) -> SyncConfig {
        self.cache_expiration = expiration;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> SyncConfig {
        SyncConfig {
            features_refresh_rate: SyncConfig::DEFAULT_FEATURES_REFRESH_RATE,
            segments_refresh_rate: SyncConfig::DEFAULT_SEGMENTS_REFRESH_RATE,
            retry_backoff_base: SyncConfig::DEFAULT_RETRY_BACKOFF_BASE,
            max_backoff: SyncConfig::DEFAULT_MAX_BACKOFF,
            update_max_retries: SyncConfig::DEFAULT_UPDATE_MAX_RETRIES,
            bootstrap_max_retries: None,
            poll_jitter: SyncConfig::DEFAULT_POLL_JITTER,
            splits_filter_query: None,
            cache_expiration: SyncConfig::DEFAULT_CACHE_EXPIRATION,
        }
    }
}
