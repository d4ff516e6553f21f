//! Synchronization engine: workers that keep split and segment storage up to date.
//!
//! - [`RetryableSyncWorker`] runs a [`SyncTask`] until it succeeds, backing off between failed
//!   attempts.
//! - [`PeriodicSyncWorker`] runs a task on every tick of a [`PeriodicTimer`] and never gives up.
//! - [`UpdateReconciler`] turns push notifications into targeted update workers.
//! - [`Synchronizer`] wires all of the above for one user key.
use crate::Result;

mod backoff;
mod events;
mod factory;
mod fetcher;
mod periodic_worker;
mod reconciler;
mod retryable_worker;
mod segments_sync;
mod splits_sync;
mod stop;
mod synchronizer;
mod timer;

pub use backoff::BackoffCounter;
pub use events::{SyncEvent, SyncEventListener};
pub(crate) use events::NoopSyncEventListener;
pub use factory::SyncWorkerFactory;
pub use fetcher::{parse_segments, parse_split_change, SegmentsFetcher, SplitFetcher};
pub use periodic_worker::PeriodicSyncWorker;
pub use reconciler::{ReconcileOutcome, UpdateNotification, UpdateReconciler};
pub use retryable_worker::{RetryableSyncWorker, SyncWorkerHandle, WorkerState};
pub use segments_sync::SegmentsSyncTask;
pub use splits_sync::{SplitChangeProcessor, SplitsSyncTask, SplitsUpdateTask};
pub use stop::StopSignal;
pub use synchronizer::Synchronizer;
pub use timer::{PeriodicTimer, ThreadTimer, TickCallback};

/// One fetch-and-apply cycle.
pub trait SyncTask: Send {
    /// Short name used for thread names, logs and events.
    fn name(&self) -> &str;

    /// Fetch from the origin and apply the result to storage.
    ///
    /// Implementations must check `stop` before fetching and must not apply a fetched result once
    /// `stop` has been raised; [`Error::WorkerStopped`](crate::Error::WorkerStopped) is returned
    /// in that case.
    fn sync(&mut self, stop: &StopSignal) -> Result<()>;
}
