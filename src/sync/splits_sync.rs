use std::{sync::Arc, time::Duration};

use chrono::Utc;

use crate::{
    split::{Split, SplitChange, Status},
    storage::{SplitStorage, SplitsUpdate},
    sync::{SplitFetcher, StopSignal, SyncEvent, SyncEventListener, SyncTask},
    Error, Result,
};

/// Turns a fetched [`SplitChange`] into a storage update: active splits are added, archived ones
/// removed. Splits that failed to parse are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct SplitChangeProcessor;

impl SplitChangeProcessor {
    /// Split `change` into additions and removals, stamped with the change's `till`.
    pub fn process(&self, change: SplitChange) -> SplitsUpdate {
        let mut update = SplitsUpdate {
            added: Vec::new(),
            removed: Vec::new(),
            change_number: change.till,
        };

        for split in change.splits {
            match Option::<Split>::from(split) {
                Some(split) if split.status == Status::Archived => update.removed.push(split.name),
                Some(split) => update.added.push(split),
                None => {
                    log::warn!(target: "split",
                               till = change.till;
                               "skipping a split definition that failed to parse");
                }
            }
        }

        update
    }
}

/// Shared fetch-and-apply loop of the split tasks. Pages through changes until the origin
/// reports no newer change (`till == since`).
struct SplitsSyncer {
    fetcher: Arc<dyn SplitFetcher>,
    storage: Arc<dyn SplitStorage>,
    processor: SplitChangeProcessor,
    query: Option<String>,
    listener: Arc<dyn SyncEventListener>,
}

impl SplitsSyncer {
    fn sync(&self, stop: &StopSignal) -> Result<()> {
        loop {
            if stop.is_stopped() {
                return Err(Error::WorkerStopped);
            }

            let since = self.storage.change_number();
            log::debug!(target: "split", since; "fetching split changes");
            let change = self.fetcher.fetch(since, self.query.as_deref())?;

            // The worker may have been stopped while the request was in flight.
            if stop.is_stopped() {
                return Err(Error::WorkerStopped);
            }

            let till = change.till;
            let applied = self.storage.update(self.processor.process(change))?;
            if applied && till > since {
                log::debug!(target: "split", since, till; "applied split changes");
                self.listener
                    .on_event(SyncEvent::SplitsUpdated { change_number: till });
            }

            if till <= since {
                return Ok(());
            }
        }
    }
}

/// Brings split storage up to date with the origin.
pub struct SplitsSyncTask {
    syncer: SplitsSyncer,
    cache_expiration: Option<Duration>,
}

impl SplitsSyncTask {
    /// Create a task syncing `storage` from `fetcher`.
    pub fn new(
        fetcher: Arc<dyn SplitFetcher>,
        storage: Arc<dyn SplitStorage>,
        query: Option<String>,
        listener: Arc<dyn SyncEventListener>,
    ) -> SplitsSyncTask {
        SplitsSyncTask {
            syncer: SplitsSyncer {
                fetcher,
                storage,
                processor: SplitChangeProcessor,
                query,
                listener,
            },
            cache_expiration: None,
        }
    }

    /// Drop stored splits last updated more than `expiration` ago before syncing.
    pub fn with_cache_expiration(mut self, expiration: Duration) -> SplitsSyncTask {
        self.cache_expiration = Some(expiration);
        self
    }

    fn clear_expired(&self) -> Result<()> {
        let (Some(expiration), Some(updated_at)) =
            (self.cache_expiration, self.syncer.storage.updated_at())
        else {
            return Ok(());
        };
        let expired = chrono::Duration::from_std(expiration)
            .is_ok_and(|expiration| Utc::now() - updated_at > expiration);
        if expired {
            log::info!(target: "split",
                       updated_at = updated_at.to_rfc3339().as_str();
                       "split definitions expired, syncing from scratch");
            self.syncer.storage.clear()?;
        }
        Ok(())
    }
}

impl SyncTask for SplitsSyncTask {
    fn name(&self) -> &str {
        "splits-sync"
    }

    fn sync(&mut self, stop: &StopSignal) -> Result<()> {
        self.clear_expired()?;
        self.syncer.sync(stop)
    }
}

/// Catches split storage up to a change number announced by a push notification.
///
/// Fails with [`Error::ChangeNumberNotReached`] while the origin hasn't caught up yet (e.g., a
/// CDN serving stale data), so that the worker retries.
pub struct SplitsUpdateTask {
    syncer: SplitsSyncer,
    target: i64,
}

impl SplitsUpdateTask {
    /// Create a task syncing `storage` until it reaches `target`.
    pub fn new(
        fetcher: Arc<dyn SplitFetcher>,
        storage: Arc<dyn SplitStorage>,
        query: Option<String>,
        target: i64,
        listener: Arc<dyn SyncEventListener>,
    ) -> SplitsUpdateTask {
        SplitsUpdateTask {
            syncer: SplitsSyncer {
                fetcher,
                storage,
                processor: SplitChangeProcessor,
                query,
                listener,
            },
            target,
        }
    }
}

impl SyncTask for SplitsUpdateTask {
    fn name(&self) -> &str {
        "splits-update"
    }

    fn sync(&mut self, stop: &StopSignal) -> Result<()> {
        // Another worker may have got there first.
        if self.syncer.storage.change_number() >= self.target {
            return Ok(());
        }

        self.syncer.sync(stop)?;

        let actual = self.syncer.storage.change_number();
        if actual < self.target {
            return Err(Error::ChangeNumberNotReached {
                expected: self.target,
                actual,
            });
        }
        Ok(())
    }
}
