//! Split (feature flag) definitions as served by the split changes endpoint, and matcher
//! evaluation over them.
mod matchers;
mod models;

pub use models::*;
