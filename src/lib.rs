//! Core of a Split feature flag SDK: evaluation and synchronization.
//!
//! # Overview
//!
//! An [`Evaluator`] decides which treatment of a split (feature flag) applies to a [`Key`],
//! optionally taking [`Attributes`] into account. Evaluation is deterministic: the same key,
//! attributes and split definition always yield the same [`EvaluationResult`].
//!
//! Split definitions and segment memberships are read from storage (see [`storage`]), which the
//! synchronization engine (see [`sync`]) keeps up to date by polling the origin and reacting to
//! push notifications.
//!
//! # Error Handling
//!
//! Evaluation never fails. When a treatment cannot be computed, the [`CONTROL`] treatment is
//! returned with a label explaining why (see [`labels`]).
//!
//! Synchronization errors are represented by the [`Error`] enum. They are retried by the workers
//! and reported to a [`SyncEventListener`](sync::SyncEventListener); evaluation callers never see
//! them.
//!
//! # Logging
//!
//! The crate uses the [`log`](https://docs.rs/log/latest/log/) crate with target `"split"`.
//! Consider integrating a `log`-compatible logger implementation for better visibility into
//! evaluation and sync operations.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

pub mod config;
pub mod eval;
pub mod hash;
pub mod split;
pub mod splitter;
pub mod storage;
pub mod sync;

mod attributes;
mod error;
mod key;

pub use attributes::{AttributeValue, Attributes};
pub use config::SyncConfig;
pub use error::{Error, Result};
pub use eval::{labels, EvaluationResult, Evaluator, CONTROL};
pub use key::Key;
