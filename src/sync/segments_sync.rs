use std::sync::Arc;

use crate::{
    storage::SegmentStorage,
    sync::{SegmentsFetcher, StopSignal, SyncEvent, SyncEventListener, SyncTask},
    Error, Result,
};

/// Refreshes the segments a single user key belongs to.
pub struct SegmentsSyncTask {
    key: String,
    fetcher: Arc<dyn SegmentsFetcher>,
    storage: Arc<dyn SegmentStorage>,
    listener: Arc<dyn SyncEventListener>,
}

impl SegmentsSyncTask {
    /// Create a task syncing the segments of `key`.
    pub fn new(
        key: impl Into<String>,
        fetcher: Arc<dyn SegmentsFetcher>,
        storage: Arc<dyn SegmentStorage>,
        listener: Arc<dyn SyncEventListener>,
    ) -> SegmentsSyncTask {
        SegmentsSyncTask {
            key: key.into(),
            fetcher,
            storage,
            listener,
        }
    }
}

impl SyncTask for SegmentsSyncTask {
    fn name(&self) -> &str {
        "segments-sync"
    }

    fn sync(&mut self, stop: &StopSignal) -> Result<()> {
        if stop.is_stopped() {
            return Err(Error::WorkerStopped);
        }

        log::debug!(target: "split", key = self.key.as_str(); "fetching segments");
        let segments = self.fetcher.fetch(&self.key)?;

        if stop.is_stopped() {
            return Err(Error::WorkerStopped);
        }

        if self.storage.update(&self.key, segments)? {
            self.listener.on_event(SyncEvent::SegmentsUpdated {
                key: self.key.clone(),
            });
        }
        Ok(())
    }
}
