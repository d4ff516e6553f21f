use std::sync::{Arc, Mutex};

use crate::{
    storage::SplitStorage,
    sync::{SyncWorkerFactory, SyncWorkerHandle},
    Result,
};

/// Change notification delivered by the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateNotification {
    /// Split definitions changed at `change_number`.
    SplitUpdate {
        /// Change number the origin is at.
        change_number: i64,
    },
    /// A split was killed at `change_number`.
    SplitKill {
        /// Name of the killed split.
        split_name: String,
        /// Treatment to serve from now on.
        default_treatment: String,
        /// Change number of the kill.
        change_number: i64,
    },
}

impl UpdateNotification {
    /// Change number carried by the notification.
    pub fn change_number(&self) -> i64 {
        match self {
            UpdateNotification::SplitUpdate { change_number }
            | UpdateNotification::SplitKill { change_number, .. } => *change_number,
        }
    }
}

/// What [`UpdateReconciler::notify`] did with a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Storage is already at (or past) the notified change number.
    Discarded,
    /// The running update worker already targets this change number or a newer one.
    AlreadyInFlight,
    /// A new update worker has been started, replacing the one targeting an older change number.
    Started,
}

/// Turns push notifications into targeted, bounded split syncs.
///
/// At most one update worker writes to split storage at a time: a notification newer than the
/// running worker's target stops that worker and starts one targeting the newer change number.
pub struct UpdateReconciler {
    storage: Arc<dyn SplitStorage>,
    factory: Arc<SyncWorkerFactory>,
    workers: Mutex<UpdateWorkers>,
}

#[derive(Default)]
struct UpdateWorkers {
    /// Running update worker and its target change number.
    current: Option<(i64, SyncWorkerHandle)>,
    /// Replaced workers, stopped but possibly still finishing a request.
    superseded: Vec<SyncWorkerHandle>,
}

impl UpdateReconciler {
    /// Create a reconciler checking notifications against `storage`.
    pub fn new(storage: Arc<dyn SplitStorage>, factory: Arc<SyncWorkerFactory>) -> UpdateReconciler {
        UpdateReconciler {
            storage,
            factory,
            workers: Mutex::new(UpdateWorkers::default()),
        }
    }

    /// Handle a notification.
    ///
    /// A kill is applied to storage right away (when newer than the split), then the notification
    /// is reconciled like an update. Notifications not newer than storage never trigger a fetch.
    ///
    /// # Errors
    ///
    /// Returns an error if storage rejects the kill or the worker thread cannot be spawned.
    pub fn notify(&self, notification: UpdateNotification) -> Result<ReconcileOutcome> {
        let change_number = notification.change_number();

        if let UpdateNotification::SplitKill {
            split_name,
            default_treatment,
            ..
        } = &notification
        {
            if self
                .storage
                .kill(split_name, default_treatment, change_number)?
            {
                log::debug!(target: "split",
                            split_name = split_name.as_str(),
                            change_number;
                            "killed split locally");
            }
        }

        let stored = self.storage.change_number();
        if change_number <= stored {
            log::debug!(target: "split",
                        stored,
                        received = change_number;
                        "discarding stale update notification");
            return Ok(ReconcileOutcome::Discarded);
        }

        let mut workers = self.lock_workers();
        workers.superseded.retain(|handle| !handle.is_finished());
        match workers.current.take() {
            Some((target, handle)) if !handle.is_finished() && target >= change_number => {
                workers.current = Some((target, handle));
                return Ok(ReconcileOutcome::AlreadyInFlight);
            }
            Some((target, handle)) if !handle.is_finished() => {
                log::debug!(target: "split",
                            previous = target,
                            expected = change_number;
                            "superseding splits update worker");
                handle.stop();
                workers.superseded.push(handle);
            }
            _ => {}
        }

        log::debug!(target: "split", stored, expected = change_number; "starting splits update worker");
        let handle = self.factory.splits_update_worker(change_number).start()?;
        workers.current = Some((change_number, handle));
        Ok(ReconcileOutcome::Started)
    }

    /// Number of update workers still running: `0` or `1`.
    pub fn in_flight(&self) -> usize {
        let workers = self.lock_workers();
        workers
            .current
            .as_ref()
            .map_or(0, |(_, handle)| usize::from(!handle.is_finished()))
    }

    /// Ask every update worker to stop without waiting for them.
    pub fn stop(&self) {
        let workers = self.lock_workers();
        for handle in workers.current.iter().map(|(_, handle)| handle) {
            handle.stop();
        }
        for handle in &workers.superseded {
            handle.stop();
        }
    }

    /// Stop all update workers and wait for them to exit. Safe to call multiple times.
    pub fn shutdown(&self) -> Result<()> {
        let handles: Vec<SyncWorkerHandle> = {
            let mut guard = self.lock_workers();
            let workers = &mut *guard;
            workers
                .current
                .take()
                .map(|(_, handle)| handle)
                .into_iter()
                .chain(workers.superseded.drain(..))
                .collect()
        };

        for handle in &handles {
            handle.stop();
        }
        for handle in handles {
            handle.shutdown()?;
        }
        Ok(())
    }

    fn lock_workers(&self) -> std::sync::MutexGuard<'_, UpdateWorkers> {
        self.workers
            .lock()
            .expect("thread holding reconciler lock should not panic")
    }
}
