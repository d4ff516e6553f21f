use std::{cmp::Ordering, collections::HashSet};

use chrono::{DateTime, Timelike, Utc};
use regex::Regex;
use semver::Version;

use crate::{
    error::EvaluationError,
    eval::{EvalContext, EvalValues},
    split::{BetweenMatcherData, Condition, DataType, Matcher, MatcherKind, UnaryNumericMatcherData},
    AttributeValue,
};

impl Condition {
    /// All matchers must match (the only combiner is `AND`).
    pub(crate) fn matches(
        &self,
        values: &EvalValues,
        context: &EvalContext,
    ) -> Result<bool, EvaluationError> {
        for matcher in &self.matcher_group.matchers {
            if !matcher.evaluate(values, context)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Value a matcher runs against: the matching key or a named attribute.
#[derive(Debug, Clone, Copy)]
enum MatchValue<'a> {
    Key(&'a str),
    Attribute(&'a AttributeValue),
}

impl<'a> MatchValue<'a> {
    fn as_str(self) -> Option<&'a str> {
        match self {
            MatchValue::Key(key) => Some(key),
            MatchValue::Attribute(value) => value.as_str(),
        }
    }

    fn as_i64(self) -> Option<i64> {
        match self {
            MatchValue::Key(key) => key.parse().ok(),
            MatchValue::Attribute(AttributeValue::Number(n)) if n.is_finite() => Some(*n as i64),
            MatchValue::Attribute(AttributeValue::String(s)) => s.parse().ok(),
            MatchValue::Attribute(_) => None,
        }
    }

    fn as_bool(self) -> Option<bool> {
        match self {
            MatchValue::Attribute(AttributeValue::Boolean(b)) => Some(*b),
            other => {
                let s = other.as_str()?;
                if s.eq_ignore_ascii_case("true") {
                    Some(true)
                } else if s.eq_ignore_ascii_case("false") {
                    Some(false)
                } else {
                    None
                }
            }
        }
    }

    /// The value as a set of strings. Empty sets and non-list values yield `None`.
    fn as_set(self) -> Option<HashSet<&'a str>> {
        match self {
            MatchValue::Attribute(AttributeValue::Set(values)) if !values.is_empty() => {
                Some(values.iter().map(String::as_str).collect())
            }
            _ => None,
        }
    }

    fn as_version(self) -> Option<Version> {
        Version::parse(self.as_str()?).ok()
    }
}

impl Matcher {
    /// Evaluate the matcher, applying `negate` on top of the variant predicate.
    ///
    /// A named attribute that is absent (or null) never matches, regardless of `negate`.
    pub(crate) fn evaluate(
        &self,
        values: &EvalValues,
        context: &EvalContext,
    ) -> Result<bool, EvaluationError> {
        if matches!(self.kind, MatcherKind::Unknown) {
            return Err(EvaluationError::MatcherNotFound);
        }

        let value = match self.attribute() {
            None => MatchValue::Key(&values.key.matching_key),
            Some(attribute) => match values.attributes.and_then(|a| a.get(attribute)) {
                None | Some(AttributeValue::Null) => return Ok(false),
                Some(value) => MatchValue::Attribute(value),
            },
        };

        let matched = match &self.kind {
            MatcherKind::InSplitTreatment {
                dependency_matcher_data: data,
            } => {
                let result = context.evaluator.evaluate_dependency(
                    values.key,
                    &data.split,
                    values.attributes,
                    context.visited,
                )?;
                data.treatments.contains(&result.treatment)
            }
            kind => kind.matches(value, context),
        };

        Ok(matched != self.negate)
    }
}

impl MatcherKind {
    fn matches(&self, value: MatchValue, context: &EvalContext) -> bool {
        self.try_matches(value, context).unwrap_or(false)
    }

    /// Returns `None` if the value cannot be coerced to what the matcher expects.
    fn try_matches(
        &self,
        value: MatchValue,
        context: &EvalContext,
    ) -> Option<bool> {
        match self {
            MatcherKind::AllKeys => Some(true),

            MatcherKind::InSegment {
                user_defined_segment_matcher_data: data,
            } => Some(
                context
                    .segments
                    .contains(value.as_str()?, &data.segment_name),
            ),

            MatcherKind::Whitelist {
                whitelist_matcher_data: data,
            } => {
                let s = value.as_str()?;
                Some(data.whitelist.iter().any(|item| item == s))
            }

            MatcherKind::EqualTo {
                unary_numeric_matcher_data: data,
            } => {
                let (value, operand) = unary_operands(value, data, Truncation::Day)?;
                Some(value == operand)
            }
            MatcherKind::GreaterThanOrEqualTo {
                unary_numeric_matcher_data: data,
            } => {
                let (value, operand) = unary_operands(value, data, Truncation::Minute)?;
                Some(value >= operand)
            }
            MatcherKind::LessThanOrEqualTo {
                unary_numeric_matcher_data: data,
            } => {
                let (value, operand) = unary_operands(value, data, Truncation::Minute)?;
                Some(value <= operand)
            }
            MatcherKind::Between {
                between_matcher_data: data,
            } => {
                let BetweenMatcherData {
                    data_type,
                    start,
                    end,
                } = data;
                let value = normalize(value.as_i64()?, *data_type, Truncation::Minute)?;
                let start = normalize(*start, *data_type, Truncation::Minute)?;
                let end = normalize(*end, *data_type, Truncation::Minute)?;
                Some(start <= value && value <= end)
            }

            MatcherKind::EqualToSet {
                whitelist_matcher_data: data,
            } => {
                let input = value.as_set()?;
                let configured = to_set(&data.whitelist);
                Some(input == configured)
            }
            MatcherKind::ContainsAnyOfSet {
                whitelist_matcher_data: data,
            } => {
                let input = value.as_set()?;
                Some(data.whitelist.iter().any(|item| input.contains(item.as_str())))
            }
            MatcherKind::ContainsAllOfSet {
                whitelist_matcher_data: data,
            } => {
                let input = value.as_set()?;
                if data.whitelist.is_empty() {
                    return Some(false);
                }
                Some(data.whitelist.iter().all(|item| input.contains(item.as_str())))
            }
            MatcherKind::PartOfSet {
                whitelist_matcher_data: data,
            } => {
                let input = value.as_set()?;
                Some(input.is_subset(&to_set(&data.whitelist)))
            }

            MatcherKind::StartsWith {
                whitelist_matcher_data: data,
            } => {
                let s = value.as_str()?;
                Some(data.whitelist.iter().any(|prefix| s.starts_with(prefix.as_str())))
            }
            MatcherKind::EndsWith {
                whitelist_matcher_data: data,
            } => {
                let s = value.as_str()?;
                Some(data.whitelist.iter().any(|suffix| s.ends_with(suffix.as_str())))
            }
            MatcherKind::ContainsString {
                whitelist_matcher_data: data,
            } => {
                let s = value.as_str()?;
                Some(data.whitelist.iter().any(|needle| s.contains(needle.as_str())))
            }
            MatcherKind::MatchesString {
                string_matcher_data: pattern,
            } => {
                let s = value.as_str()?;
                let regex = Regex::new(pattern).ok()?;
                Some(regex.is_match(s))
            }

            MatcherKind::EqualToBoolean {
                boolean_matcher_data: expected,
            } => Some(value.as_bool()? == *expected),

            // Resolved by `Matcher::evaluate`, which can report dependency cycles.
            MatcherKind::InSplitTreatment { .. } => None,

            MatcherKind::EqualToSemver {
                string_matcher_data: operand,
            } => Some(value.as_version()? == Version::parse(operand).ok()?),
            MatcherKind::GreaterThanOrEqualToSemver {
                string_matcher_data: operand,
            } => {
                let operand = Version::parse(operand).ok()?;
                Some(cmp_precedence(&value.as_version()?, &operand) != Ordering::Less)
            }
            MatcherKind::LessThanOrEqualToSemver {
                string_matcher_data: operand,
            } => {
                let operand = Version::parse(operand).ok()?;
                Some(cmp_precedence(&value.as_version()?, &operand) != Ordering::Greater)
            }
            MatcherKind::BetweenSemver {
                between_string_matcher_data: data,
            } => {
                let version = value.as_version()?;
                let start = Version::parse(&data.start).ok()?;
                let end = Version::parse(&data.end).ok()?;
                Some(
                    cmp_precedence(&start, &version) != Ordering::Greater
                        && cmp_precedence(&version, &end) != Ordering::Greater,
                )
            }
            MatcherKind::InListSemver {
                whitelist_matcher_data: data,
            } => {
                let version = value.as_version()?;
                Some(
                    data.whitelist
                        .iter()
                        .filter_map(|item| Version::parse(item).ok())
                        .any(|item| item == version),
                )
            }

            // Rejected in `Matcher::evaluate` before reaching here.
            MatcherKind::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Truncation {
    Day,
    Minute,
}

fn unary_operands(
    value: MatchValue,
    data: &UnaryNumericMatcherData,
    truncation: Truncation,
) -> Option<(i64, i64)> {
    Some((
        normalize(value.as_i64()?, data.data_type, truncation)?,
        normalize(data.value, data.data_type, truncation)?,
    ))
}

/// Datetime operands are epoch milliseconds compared at day or minute granularity (UTC).
fn normalize(value: i64, data_type: DataType, truncation: Truncation) -> Option<i64> {
    match data_type {
        DataType::Number => Some(value),
        DataType::Datetime => {
            let datetime = DateTime::<Utc>::from_timestamp_millis(value)?;
            let truncated = match truncation {
                Truncation::Day => datetime.date_naive().and_hms_opt(0, 0, 0)?.and_utc(),
                Truncation::Minute => datetime.with_second(0)?.with_nanosecond(0)?,
            };
            Some(truncated.timestamp_millis())
        }
    }
}

fn to_set(items: &[String]) -> HashSet<&str> {
    items.iter().map(String::as_str).collect()
}

/// Semver precedence: build metadata is ignored.
fn cmp_precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
}
