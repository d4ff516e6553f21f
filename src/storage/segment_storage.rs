use std::{
    collections::{HashMap, HashSet},
    sync::RwLock,
};

use crate::{storage::SegmentStorage, Result};

/// In-memory segment membership, keyed by user key.
#[derive(Default)]
pub struct InMemorySegmentStorage {
    segments: RwLock<HashMap<String, HashSet<String>>>,
}

impl InMemorySegmentStorage {
    /// Create a new empty segment storage.
    pub fn new() -> Self {
        InMemorySegmentStorage::default()
    }

    /// Replace the segments `key` belongs to. Returns whether membership changed.
    pub fn set_segments(&self, key: &str, segments: Vec<String>) -> bool {
        let segments: HashSet<String> = segments.into_iter().collect();
        let mut all = self
            .segments
            .write()
            .expect("thread holding segment storage lock should not panic");
        if all.get(key) == Some(&segments) {
            return false;
        }
        all.insert(key.to_owned(), segments);
        true
    }

    /// Segments `key` belongs to, in no particular order.
    pub fn segments_for(&self, key: &str) -> Vec<String> {
        let all = self
            .segments
            .read()
            .expect("thread holding segment storage lock should not panic");
        all.get(key)
            .map(|segments| segments.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl SegmentStorage for InMemorySegmentStorage {
    fn contains(&self, key: &str, segment_name: &str) -> bool {
        let all = self
            .segments
            .read()
            .expect("thread holding segment storage lock should not panic");
        all.get(key)
            .is_some_and(|segments| segments.contains(segment_name))
    }

    fn update(&self, key: &str, segments: Vec<String>) -> Result<bool> {
        Ok(self.set_segments(key, segments))
    }
}

#[cfg(test)]
mod tests {
    use super::InMemorySegmentStorage;
    use crate::storage::SegmentStorage;

    #[test]
    fn membership_is_per_key() {
        let storage = InMemorySegmentStorage::new();
        assert!(storage.set_segments("alice", vec!["beta".to_owned()]));

        assert!(storage.contains("alice", "beta"));
        assert!(!storage.contains("alice", "employees"));
        assert!(!storage.contains("bob", "beta"));
    }

    #[test]
    fn reports_whether_membership_changed() {
        let storage = InMemorySegmentStorage::new();
        assert!(storage
            .update("alice", vec!["a".to_owned(), "b".to_owned()])
            .unwrap());
        assert!(!storage
            .update("alice", vec!["b".to_owned(), "a".to_owned()])
            .unwrap());
        assert!(storage.update("alice", vec![]).unwrap());
        assert!(storage.segments_for("alice").is_empty());
    }
}
