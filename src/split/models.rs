#![allow(missing_docs)]

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::splitter::Algorithm;

/// Response of the split changes endpoint: every split that changed in `(since, till]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitChange {
    /// Splits that changed. Value is wrapped in `TryParse` so that if we fail to parse one split
    /// (e.g., new server format), we can still apply the others.
    pub splits: Vec<TryParse<Split>>,
    /// Change number the request was made with.
    pub since: i64,
    /// Change number the client is at after applying this change.
    pub till: i64,
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed.
    ParseFailed(serde_json::Value),
}
impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}
impl<T> From<T> for TryParse<T> {
    fn from(value: T) -> Self {
        TryParse::Parsed(value)
    }
}

/// Full definition of a feature flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Split {
    pub name: String,
    #[serde(default)]
    pub traffic_type_name: Option<String>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub killed: bool,
    #[serde(default)]
    pub default_treatment: Option<String>,
    #[serde(default = "default_change_number")]
    pub change_number: i64,
    #[serde(default)]
    pub seed: Option<i32>,
    #[serde(default)]
    pub traffic_allocation: Option<i64>,
    #[serde(default)]
    pub traffic_allocation_seed: Option<i32>,
    #[serde(default)]
    pub algo: Algorithm,
    #[serde(default)]
    pub conditions: Option<Vec<Condition>>,
    #[serde(default)]
    pub configurations: Option<HashMap<String, String>>,
}

fn default_change_number() -> i64 {
    -1
}

impl Split {
    /// Configuration attached to `treatment`, if any.
    pub fn configuration_for(&self, treatment: &str) -> Option<&str> {
        self.configurations
            .as_ref()?
            .get(treatment)
            .map(String::as_str)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    Active,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default)]
    pub condition_type: ConditionType,
    pub matcher_group: MatcherGroup,
    #[serde(default)]
    pub partitions: Vec<Partition>,
    #[serde(default)]
    pub label: String,
}

/// Only the first `Rollout` condition of a split is subject to traffic allocation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionType {
    Rollout,
    #[default]
    Whitelist,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatcherGroup {
    /// Only `AND` is ever sent.
    #[serde(default)]
    pub combiner: Combiner,
    pub matchers: Vec<Matcher>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Combiner {
    #[default]
    And,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    pub treatment: String,
    pub size: i64,
}

/// A predicate over the key or one of its attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Matcher {
    /// When the selector names an attribute, the matcher runs against that attribute instead of
    /// the key.
    #[serde(default)]
    pub key_selector: Option<KeySelector>,
    #[serde(default)]
    pub negate: bool,
    #[serde(flatten)]
    pub kind: MatcherKind,
}

impl Matcher {
    pub(crate) fn attribute(&self) -> Option<&str> {
        self.key_selector.as_ref()?.attribute.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySelector {
    #[serde(default)]
    pub traffic_type: Option<String>,
    #[serde(default)]
    pub attribute: Option<String>,
}

/// Matcher variants, tagged by `matcherType`. Each variant carries the data field the server
/// populates for it; the other `*MatcherData` fields are null and ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "matcherType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatcherKind {
    AllKeys,
    #[serde(rename_all = "camelCase")]
    InSegment {
        user_defined_segment_matcher_data: SegmentMatcherData,
    },
    #[serde(rename_all = "camelCase")]
    Whitelist {
        whitelist_matcher_data: WhitelistMatcherData,
    },
    #[serde(rename_all = "camelCase")]
    EqualTo {
        unary_numeric_matcher_data: UnaryNumericMatcherData,
    },
    #[serde(rename_all = "camelCase")]
    GreaterThanOrEqualTo {
        unary_numeric_matcher_data: UnaryNumericMatcherData,
    },
    #[serde(rename_all = "camelCase")]
    LessThanOrEqualTo {
        unary_numeric_matcher_data: UnaryNumericMatcherData,
    },
    #[serde(rename_all = "camelCase")]
    Between {
        between_matcher_data: BetweenMatcherData,
    },
    #[serde(rename_all = "camelCase")]
    EqualToSet {
        whitelist_matcher_data: WhitelistMatcherData,
    },
    #[serde(rename_all = "camelCase")]
    ContainsAnyOfSet {
        whitelist_matcher_data: WhitelistMatcherData,
    },
    #[serde(rename_all = "camelCase")]
    ContainsAllOfSet {
        whitelist_matcher_data: WhitelistMatcherData,
    },
    #[serde(rename_all = "camelCase")]
    PartOfSet {
        whitelist_matcher_data: WhitelistMatcherData,
    },
    #[serde(rename_all = "camelCase")]
    StartsWith {
        whitelist_matcher_data: WhitelistMatcherData,
    },
    #[serde(rename_all = "camelCase")]
    EndsWith {
        whitelist_matcher_data: WhitelistMatcherData,
    },
    #[serde(rename_all = "camelCase")]
    ContainsString {
        whitelist_matcher_data: WhitelistMatcherData,
    },
    #[serde(rename_all = "camelCase")]
    MatchesString { string_matcher_data: String },
    #[serde(rename_all = "camelCase")]
    EqualToBoolean { boolean_matcher_data: bool },
    #[serde(rename_all = "camelCase")]
    InSplitTreatment {
        dependency_matcher_data: DependencyMatcherData,
    },
    #[serde(rename_all = "camelCase")]
    EqualToSemver { string_matcher_data: String },
    #[serde(rename_all = "camelCase")]
    GreaterThanOrEqualToSemver { string_matcher_data: String },
    #[serde(rename_all = "camelCase")]
    LessThanOrEqualToSemver { string_matcher_data: String },
    #[serde(rename_all = "camelCase")]
    BetweenSemver {
        between_string_matcher_data: BetweenStringMatcherData,
    },
    #[serde(rename_all = "camelCase")]
    InListSemver {
        whitelist_matcher_data: WhitelistMatcherData,
    },
    /// A matcher type this SDK version doesn't know. Evaluating it yields "matcher not found".
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentMatcherData {
    pub segment_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhitelistMatcherData {
    #[serde(default)]
    pub whitelist: Vec<String>,
}

impl From<Vec<String>> for WhitelistMatcherData {
    fn from(whitelist: Vec<String>) -> Self {
        WhitelistMatcherData { whitelist }
    }
}

/// Whether numeric operands are plain numbers or epoch milliseconds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    #[default]
    Number,
    Datetime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnaryNumericMatcherData {
    #[serde(default)]
    pub data_type: DataType,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetweenMatcherData {
    #[serde(default)]
    pub data_type: DataType,
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetweenStringMatcherData {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyMatcherData {
    pub split: String,
    #[serde(default)]
    pub treatments: Vec<String>,
}
