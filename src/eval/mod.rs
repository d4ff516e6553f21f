//! Split evaluation.
use serde::{Deserialize, Serialize};

use crate::{storage::SegmentStorage, Attributes, Key};

mod evaluator;

pub use evaluator::Evaluator;

/// Treatment returned whenever a proper treatment cannot be computed.
pub const CONTROL: &str = "control";

/// Labels explaining how a treatment was chosen.
pub mod labels {
    /// The split is absent or archived.
    pub const DEFINITION_NOT_FOUND: &str = "definition not found";
    /// The split is killed; the default treatment is served.
    pub const KILLED: &str = "killed";
    /// The key falls outside the split's traffic allocation.
    pub const NOT_IN_SPLIT: &str = "not in split";
    /// No condition matched; the default treatment is served.
    pub const NO_CONDITION_MATCHED: &str = "no condition matched";
    /// The split definition is malformed.
    pub const EXCEPTION: &str = "exception";
    /// The split uses a matcher this SDK can't evaluate.
    pub const MATCHER_NOT_FOUND: &str = "matcher not found";
}

/// Outcome of evaluating one split for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    /// Treatment assigned to the key.
    pub treatment: String,
    /// Why this treatment was assigned.
    pub label: String,
    /// Change number of the split the treatment was computed from.
    pub change_number: Option<i64>,
    /// Configuration attached to the treatment (a JSON string).
    pub configuration: Option<String>,
}

impl EvaluationResult {
    pub(crate) fn control(label: &str, change_number: Option<i64>) -> EvaluationResult {
        EvaluationResult {
            treatment: CONTROL.to_owned(),
            label: label.to_owned(),
            change_number,
            configuration: None,
        }
    }
}

/// Input handed to matchers.
pub(crate) struct EvalValues<'a> {
    pub key: &'a Key,
    pub attributes: Option<&'a Attributes>,
}

/// Read-only collaborators matchers may consult.
pub(crate) struct EvalContext<'a> {
    /// Used by dependency matchers to evaluate another split.
    pub evaluator: &'a Evaluator,
    pub segments: &'a dyn SegmentStorage,
    /// Splits currently being evaluated, outermost first.
    pub visited: &'a [&'a str],
}
