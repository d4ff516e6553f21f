//! Storage collaborators. Persistent backends live outside this crate; the in-memory
//! implementations here are enough for evaluation and tests.
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{split::Split, Result};

mod segment_storage;
mod split_storage;

pub use segment_storage::InMemorySegmentStorage;
pub use split_storage::InMemorySplitStorage;

/// One batch of split changes, applied atomically.
#[derive(Debug, Clone, Default)]
pub struct SplitsUpdate {
    /// Splits to insert or replace.
    pub added: Vec<Split>,
    /// Names of splits to remove (archived at the origin).
    pub removed: Vec<String>,
    /// Change number to persist along with the batch.
    pub change_number: i64,
}

/// Rule storage. Shared by many readers (evaluations) and the sync workers.
pub trait SplitStorage: Send + Sync {
    /// Get the current definition of a split.
    fn get(&self, name: &str) -> Option<Arc<Split>>;

    /// Apply `update` atomically: readers see either the old or the new set of splits, never a
    /// mix. Returns `Ok(false)` without touching storage if `update` is older than what is
    /// stored.
    fn update(&self, update: SplitsUpdate) -> Result<bool>;

    /// Change number of the last applied update, `-1` if nothing has been applied.
    fn change_number(&self) -> i64;

    /// When the last update was applied, `None` if nothing has been applied.
    fn updated_at(&self) -> Option<DateTime<Utc>>;

    /// Drop every split and reset the change number to `-1`.
    fn clear(&self) -> Result<()>;

    /// Kill a split locally, ahead of the next fetch. Ignored unless `change_number` is newer
    /// than the split's own change number. Returns whether the split was killed.
    fn kill(&self, name: &str, default_treatment: &str, change_number: i64) -> Result<bool>;
}

/// Segment membership storage, keyed by user key.
pub trait SegmentStorage: Send + Sync {
    /// Whether `key` belongs to `segment_name`.
    fn contains(&self, key: &str, segment_name: &str) -> bool;

    /// Replace the segments `key` belongs to. Returns whether membership changed.
    fn update(&self, key: &str, segments: Vec<String>) -> Result<bool>;
}
