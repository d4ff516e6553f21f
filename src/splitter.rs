//! Bucketing: mapping a key onto `[1, 100]` and onto a condition's partitions.
use serde::{Deserialize, Serialize};

use crate::{
    hash::{legacy_hash, murmur3_32},
    split::Partition,
    CONTROL,
};

/// Hash algorithm a split was created with. Older splits use the legacy hash.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum Algorithm {
    /// Java `String.hashCode`-style hash.
    #[default]
    Legacy,
    /// MurmurHash3 x86 32-bit.
    Murmur3,
}

impl From<i32> for Algorithm {
    fn from(value: i32) -> Self {
        match value {
            2 => Algorithm::Murmur3,
            // Unknown algorithm versions fall back to legacy, as every other SDK does.
            _ => Algorithm::Legacy,
        }
    }
}

impl From<Algorithm> for i32 {
    fn from(value: Algorithm) -> Self {
        match value {
            Algorithm::Legacy => 1,
            Algorithm::Murmur3 => 2,
        }
    }
}

/// Stateless bucketing service injected into the evaluator.
pub trait Splitter: Send + Sync {
    /// Bucket for `key` under `seed`, always in `[1, 100]`.
    fn bucket(&self, key: &str, seed: i32, algo: Algorithm) -> i64;

    /// Treatment of the partition the key falls into.
    ///
    /// Partitions are walked in order, accumulating their sizes; the first partition whose
    /// cumulative size reaches the bucket wins. If sizes do not cover the bucket, returns
    /// [`CONTROL`].
    fn select_partition<'a>(
        &self,
        key: &str,
        seed: i32,
        partitions: &'a [Partition],
        algo: Algorithm,
    ) -> &'a str {
        if let [single] = partitions {
            if single.size == 100 {
                return &single.treatment;
            }
        }

        let bucket = self.bucket(key, seed, algo);
        let mut covered = 0;
        for partition in partitions {
            covered += partition.size;
            if covered >= bucket {
                return &partition.treatment;
            }
        }

        CONTROL
    }
}

/// The splitter every Split SDK uses.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSplitter;

impl Splitter for DefaultSplitter {
    fn bucket(&self, key: &str, seed: i32, algo: Algorithm) -> i64 {
        let hash = match algo {
            Algorithm::Legacy => i64::from(legacy_hash(key, seed)),
            // Seed is reinterpreted bit-for-bit and the result treated as unsigned.
            Algorithm::Murmur3 => i64::from(murmur3_32(key.as_bytes(), seed as u32)),
        };
        (hash % 100).abs() + 1
    }
}

/// Splitter that puts every key into the same bucket.
#[cfg(test)]
pub(crate) struct FixedBucketSplitter(pub i64);

#[cfg(test)]
impl Splitter for FixedBucketSplitter {
    fn bucket(&self, _key: &str, _seed: i32, _algo: Algorithm) -> i64 {
        self.0
    }
}
