use std::sync::Arc;

use crate::{
    config::SyncConfig,
    storage::{SegmentStorage, SplitStorage},
    sync::{
        BackoffCounter, NoopSyncEventListener, PeriodicSyncWorker, RetryableSyncWorker,
        SegmentsFetcher, SegmentsSyncTask, SplitFetcher, SplitsSyncTask, SplitsUpdateTask,
        SyncEventListener, ThreadTimer,
    },
};

/// Builds sync workers wired to the same fetchers, storages and configuration.
pub struct SyncWorkerFactory {
    config: SyncConfig,
    split_fetcher: Arc<dyn SplitFetcher>,
    segments_fetcher: Arc<dyn SegmentsFetcher>,
    split_storage: Arc<dyn SplitStorage>,
    segment_storage: Arc<dyn SegmentStorage>,
    listener: Arc<dyn SyncEventListener>,
}

impl SyncWorkerFactory {
    /// Create a factory. Events are discarded until a listener is set with
    /// [`SyncWorkerFactory::with_listener`].
    pub fn new(
        config: SyncConfig,
        split_fetcher: Arc<dyn SplitFetcher>,
        segments_fetcher: Arc<dyn SegmentsFetcher>,
        split_storage: Arc<dyn SplitStorage>,
        segment_storage: Arc<dyn SegmentStorage>,
    ) -> SyncWorkerFactory {
        SyncWorkerFactory {
            config,
            split_fetcher,
            segments_fetcher,
            split_storage,
            segment_storage,
            listener: Arc::new(NoopSyncEventListener),
        }
    }

    /// Report events of every worker built from now on to `listener`.
    pub fn with_listener(mut self, listener: impl SyncEventListener + 'static) -> SyncWorkerFactory {
        self.listener = Arc::new(listener);
        self
    }

    /// Configuration workers are built with.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Split storage workers write to.
    pub fn split_storage(&self) -> Arc<dyn SplitStorage> {
        Arc::clone(&self.split_storage)
    }

    pub(crate) fn listener(&self) -> Arc<dyn SyncEventListener> {
        Arc::clone(&self.listener)
    }

    /// Worker bringing split storage up to date, starting over if stored splits are older than
    /// [`SyncConfig::cache_expiration`]. Bounded by [`SyncConfig::bootstrap_max_retries`] if set.
    pub fn splits_sync_worker(&self) -> RetryableSyncWorker {
        let worker = RetryableSyncWorker::new(
            SplitsSyncTask::new(
                Arc::clone(&self.split_fetcher),
                Arc::clone(&self.split_storage),
                self.config.splits_filter_query.clone(),
                self.listener(),
            )
            .with_cache_expiration(self.config.cache_expiration),
            self.backoff(),
            self.listener(),
        );
        match self.config.bootstrap_max_retries {
            Some(max_retries) => worker.with_max_retries(max_retries),
            None => worker,
        }
    }

    /// Worker catching split storage up to `change_number`, bounded by
    /// [`SyncConfig::update_max_retries`].
    pub fn splits_update_worker(&self, change_number: i64) -> RetryableSyncWorker {
        RetryableSyncWorker::new(
            SplitsUpdateTask::new(
                Arc::clone(&self.split_fetcher),
                Arc::clone(&self.split_storage),
                self.config.splits_filter_query.clone(),
                change_number,
                self.listener(),
            ),
            self.backoff(),
            self.listener(),
        )
        .with_max_retries(self.config.update_max_retries)
    }

    /// Worker refreshing the segments of `key`. Bounded by
    /// [`SyncConfig::bootstrap_max_retries`] if set.
    pub fn segments_sync_worker(&self, key: &str) -> RetryableSyncWorker {
        let worker = RetryableSyncWorker::new(self.segments_task(key), self.backoff(), self.listener());
        match self.config.bootstrap_max_retries {
            Some(max_retries) => worker.with_max_retries(max_retries),
            None => worker,
        }
    }

    /// Worker refreshing splits every [`SyncConfig::features_refresh_rate`].
    pub fn periodic_splits_worker(&self) -> PeriodicSyncWorker {
        PeriodicSyncWorker::new(
            SplitsSyncTask::new(
                Arc::clone(&self.split_fetcher),
                Arc::clone(&self.split_storage),
                self.config.splits_filter_query.clone(),
                self.listener(),
            ),
            ThreadTimer::new("split-periodic-splits", self.config.poll_jitter),
            self.config.features_refresh_rate,
            self.listener(),
        )
    }

    /// Worker refreshing the segments of `key` every [`SyncConfig::segments_refresh_rate`].
    pub fn periodic_segments_worker(&self, key: &str) -> PeriodicSyncWorker {
        PeriodicSyncWorker::new(
            self.segments_task(key),
            ThreadTimer::new("split-periodic-segments", self.config.poll_jitter),
            self.config.segments_refresh_rate,
            self.listener(),
        )
    }

    fn segments_task(&self, key: &str) -> SegmentsSyncTask {
        SegmentsSyncTask::new(
            key,
            Arc::clone(&self.segments_fetcher),
            Arc::clone(&self.segment_storage),
            self.listener(),
        )
    }

    fn backoff(&self) -> BackoffCounter {
        BackoffCounter::new(self.config.retry_backoff_base, self.config.max_backoff)
    }
}
