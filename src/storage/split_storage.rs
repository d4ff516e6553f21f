use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use chrono::{DateTime, Utc};

use crate::{
    split::Split,
    storage::{SplitStorage, SplitsUpdate},
    Result,
};

/// `InMemorySplitStorage` provides a thread-safe (`Sync`) storage for split definitions that
/// allows concurrent access for readers and writers.
///
/// The set of splits is an immutable snapshot that is only ever replaced completely, so a reader
/// never observes a partially applied update.
#[derive(Default)]
pub struct InMemorySplitStorage {
    snapshot: RwLock<Arc<Snapshot>>,
}

#[derive(Debug, Clone)]
struct Snapshot {
    splits: HashMap<String, Arc<Split>>,
    change_number: i64,
    updated_at: Option<DateTime<Utc>>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Snapshot {
            splits: HashMap::new(),
            change_number: -1,
            updated_at: None,
        }
    }
}

impl InMemorySplitStorage {
    /// Create a new empty split storage.
    pub fn new() -> Self {
        InMemorySplitStorage::default()
    }

    /// Names of all stored splits.
    pub fn split_names(&self) -> Vec<String> {
        self.current().splits.keys().cloned().collect()
    }

    fn current(&self) -> Arc<Snapshot> {
        // self.snapshot.read() should always return Ok(). Err() is possible only if the lock is
        // poisoned (writer panicked while holding the lock), which should never happen.
        let snapshot = self
            .snapshot
            .read()
            .expect("thread holding split storage lock should not panic");
        snapshot.clone()
    }

    /// Replace the current snapshot with `f(current)` if it returns one.
    fn swap(&self, f: impl FnOnce(&Snapshot) -> Option<Snapshot>) -> bool {
        let mut slot = self
            .snapshot
            .write()
            .expect("thread holding split storage lock should not panic");
        match f(&slot) {
            Some(next) => {
                *slot = Arc::new(next);
                true
            }
            None => false,
        }
    }
}

impl SplitStorage for InMemorySplitStorage {
    fn get(&self, name: &str) -> Option<Arc<Split>> {
        self.current().splits.get(name).cloned()
    }

    fn update(&self, update: SplitsUpdate) -> Result<bool> {
        let SplitsUpdate {
            added,
            removed,
            change_number,
        } = update;

        let applied = self.swap(|current| {
            if change_number < current.change_number {
                log::debug!(target: "split",
                            stored = current.change_number,
                            received = change_number;
                            "ignoring stale splits update");
                return None;
            }

            let mut next = current.clone();
            for name in &removed {
                next.splits.remove(name);
            }
            for split in added {
                next.splits.insert(split.name.clone(), Arc::new(split));
            }
            next.change_number = change_number;
            next.updated_at = Some(Utc::now());
            Some(next)
        });

        Ok(applied)
    }

    fn change_number(&self) -> i64 {
        self.current().change_number
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.current().updated_at
    }

    fn clear(&self) -> Result<()> {
        self.swap(|_| Some(Snapshot::default()));
        Ok(())
    }

    fn kill(&self, name: &str, default_treatment: &str, change_number: i64) -> Result<bool> {
        let killed = self.swap(|current| {
            let split = current.splits.get(name)?;
            if split.change_number >= change_number {
                return None;
            }

            let mut killed = Split::clone(split);
            killed.killed = true;
            killed.default_treatment = Some(default_treatment.to_owned());
            killed.change_number = change_number;

            let mut next = current.clone();
            next.splits.insert(name.to_owned(), Arc::new(killed));
            Some(next)
        });

        Ok(killed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::InMemorySplitStorage;
    use crate::{
        split::Split,
        storage::{SplitStorage, SplitsUpdate},
    };

    fn split(name: &str, change_number: i64) -> Split {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "changeNumber": change_number,
            "defaultTreatment": "off",
        }))
        .unwrap()
    }

    #[test]
    fn starts_empty() {
        let storage = InMemorySplitStorage::new();
        assert_eq!(storage.change_number(), -1);
        assert!(storage.get("any").is_none());
    }

    #[test]
    fn can_update_from_another_thread() {
        let storage = Arc::new(InMemorySplitStorage::new());

        {
            let storage = storage.clone();
            let _ = std::thread::spawn(move || {
                storage
                    .update(SplitsUpdate {
                        added: vec![split("a", 5)],
                        removed: vec![],
                        change_number: 5,
                    })
                    .unwrap();
            })
            .join();
        }

        assert!(storage.get("a").is_some());
        assert_eq!(storage.change_number(), 5);
    }

    #[test]
    fn update_adds_and_removes_atomically() {
        let storage = InMemorySplitStorage::new();
        storage
            .update(SplitsUpdate {
                added: vec![split("a", 1), split("b", 1)],
                removed: vec![],
                change_number: 1,
            })
            .unwrap();

        let before = storage.get("a").unwrap();
        storage
            .update(SplitsUpdate {
                added: vec![split("a", 2)],
                removed: vec!["b".to_owned()],
                change_number: 2,
            })
            .unwrap();

        // Snapshots handed out earlier are not affected by later writes.
        assert_eq!(before.change_number, 1);
        assert_eq!(storage.get("a").unwrap().change_number, 2);
        assert!(storage.get("b").is_none());
        assert_eq!(storage.change_number(), 2);
    }

    #[test]
    fn stale_update_is_ignored() {
        let storage = InMemorySplitStorage::new();
        storage
            .update(SplitsUpdate {
                added: vec![split("a", 10)],
                removed: vec![],
                change_number: 10,
            })
            .unwrap();

        let applied = storage
            .update(SplitsUpdate {
                added: vec![split("a", 3)],
                removed: vec![],
                change_number: 3,
            })
            .unwrap();

        assert!(!applied);
        assert_eq!(storage.get("a").unwrap().change_number, 10);
        assert_eq!(storage.change_number(), 10);
    }

    #[test]
    fn kill_only_applies_when_newer() {
        let storage = InMemorySplitStorage::new();
        storage
            .update(SplitsUpdate {
                added: vec![split("a", 10)],
                removed: vec![],
                change_number: 10,
            })
            .unwrap();

        assert!(!storage.kill("a", "on", 10).unwrap());
        assert!(!storage.get("a").unwrap().killed);

        assert!(storage.kill("a", "on", 11).unwrap());
        let killed = storage.get("a").unwrap();
        assert!(killed.killed);
        assert_eq!(killed.default_treatment.as_deref(), Some("on"));
        assert_eq!(killed.change_number, 11);

        assert!(!storage.kill("missing", "on", 99).unwrap());
        // Killing a single split doesn't move the global change number.
        assert_eq!(storage.change_number(), 10);
    }

    #[test]
    fn clear_resets_everything() {
        let storage = InMemorySplitStorage::new();
        assert!(storage.updated_at().is_none());
        storage
            .update(SplitsUpdate {
                added: vec![split("a", 10)],
                removed: vec![],
                change_number: 10,
            })
            .unwrap();
        assert!(storage.updated_at().is_some());

        storage.clear().unwrap();

        assert!(storage.get("a").is_none());
        assert_eq!(storage.change_number(), -1);
        assert!(storage.updated_at().is_none());
    }
}
