use serde::{Deserialize, Serialize};

/// Identifies the end user a treatment is computed for.
///
/// `matching_key` is what matchers compare against. `bucketing_key` drives the hashing; when it is
/// absent or empty, the matching key is used instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    /// Key used by matchers.
    pub matching_key: String,
    /// Optional key used for bucketing.
    #[serde(default)]
    pub bucketing_key: Option<String>,
}

impl Key {
    /// Create a key that buckets on its matching key.
    pub fn new(matching_key: impl Into<String>) -> Key {
        Key {
            matching_key: matching_key.into(),
            bucketing_key: None,
        }
    }

    /// Create a key with a separate bucketing key.
    pub fn with_bucketing_key(
        matching_key: impl Into<String>,
        bucketing_key: impl Into<String>,
    ) -> Key {
        Key {
            matching_key: matching_key.into(),
            bucketing_key: Some(bucketing_key.into()),
        }
    }

    /// The key hashing operates on.
    pub fn effective_bucketing_key(&self) -> &str {
        match self.bucketing_key.as_deref() {
            Some(bucketing_key) if !bucketing_key.is_empty() => bucketing_key,
            _ => &self.matching_key,
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::new(value)
    }
}
