use std::time::Duration;

use crate::Error;

/// Notable things happening in the synchronization engine.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncEvent {
    /// New split definitions have been applied to storage.
    SplitsUpdated {
        /// Change number storage is at now.
        change_number: i64,
    },
    /// Segment membership of `key` has changed.
    SegmentsUpdated {
        /// User key whose segments were refreshed.
        key: String,
    },
    /// A sync attempt failed and will be retried after `delay`.
    RetryScheduled {
        /// Name of the sync task.
        task: String,
        /// Number of the attempt that failed, starting at 1.
        attempt: u32,
        /// Time until the next attempt.
        delay: Duration,
    },
    /// A sync task completed successfully.
    SyncSucceeded {
        /// Name of the sync task.
        task: String,
    },
    /// A sync task failed. Retryable workers emit this only once they give up; periodic workers
    /// emit it for every failed tick.
    SyncFailed {
        /// Name of the sync task.
        task: String,
        /// Error of the last attempt.
        error: Error,
    },
    /// Initial synchronization has completed.
    Ready,
}

/// Receives [`SyncEvent`]s. Called on worker threads, so implementations should return quickly.
///
/// Closures are accepted:
/// ```
/// # use split_core::sync::{SyncEvent, SyncEventListener};
/// fn takes_listener(_: impl SyncEventListener) {}
/// takes_listener(|event: SyncEvent| println!("{:?}", event));
/// ```
pub trait SyncEventListener: Send + Sync {
    /// Handle a single event.
    fn on_event(&self, event: SyncEvent);
}

pub(crate) struct NoopSyncEventListener;
impl SyncEventListener for NoopSyncEventListener {
    fn on_event(&self, _event: SyncEvent) {}
}

impl<T: Fn(SyncEvent) + Send + Sync> SyncEventListener for T {
    fn on_event(&self, event: SyncEvent) {
        self(event);
    }
}
