use std::sync::Arc;

use crate::{
    error::EvaluationError,
    split::{ConditionType, Split, Status},
    splitter::{DefaultSplitter, Splitter},
    storage::{SegmentStorage, SplitStorage},
    Attributes, Key,
};

use super::{labels, EvalContext, EvalValues, EvaluationResult, CONTROL};

/// Computes treatments from whatever split definitions are currently in storage.
///
/// Evaluation never fails: every failure mode resolves to an [`EvaluationResult`], the safest
/// being the [`CONTROL`] treatment.
pub struct Evaluator {
    split_storage: Arc<dyn SplitStorage>,
    segment_storage: Arc<dyn SegmentStorage>,
    splitter: Arc<dyn Splitter>,
}

impl Evaluator {
    /// Create an evaluator using the [`DefaultSplitter`].
    pub fn new(
        split_storage: Arc<dyn SplitStorage>,
        segment_storage: Arc<dyn SegmentStorage>,
    ) -> Evaluator {
        Evaluator::with_splitter(split_storage, segment_storage, Arc::new(DefaultSplitter))
    }

    /// Create an evaluator with a custom splitter.
    pub fn with_splitter(
        split_storage: Arc<dyn SplitStorage>,
        segment_storage: Arc<dyn SegmentStorage>,
        splitter: Arc<dyn Splitter>,
    ) -> Evaluator {
        Evaluator {
            split_storage,
            segment_storage,
            splitter,
        }
    }

    /// Evaluate `split_name` for `key`.
    pub fn evaluate(
        &self,
        key: &Key,
        split_name: &str,
        attributes: Option<&Attributes>,
    ) -> EvaluationResult {
        let Some(split) = self.active_split(split_name) else {
            return EvaluationResult::control(labels::DEFINITION_NOT_FOUND, None);
        };

        let result = self
            .evaluate_split(&split, key, attributes, &[split_name])
            .unwrap_or_else(|_| {
                log::warn!(target: "split",
                           split_name;
                           "split dependencies form a cycle");
                EvaluationResult::control(labels::EXCEPTION, None)
            });
        log::trace!(target: "split",
                    split_name,
                    matching_key = key.matching_key.as_str(),
                    treatment = result.treatment.as_str(),
                    label = result.label.as_str();
                    "evaluated a split");
        result
    }

    /// Evaluate a split another split depends on. `visited` holds the splits being evaluated
    /// further up the dependency chain.
    pub(crate) fn evaluate_dependency<'a>(
        &self,
        key: &Key,
        split_name: &'a str,
        attributes: Option<&Attributes>,
        visited: &[&'a str],
    ) -> Result<EvaluationResult, EvaluationError> {
        if visited.contains(&split_name) {
            return Err(EvaluationError::DependencyCycle);
        }
        let Some(split) = self.active_split(split_name) else {
            return Ok(EvaluationResult::control(labels::DEFINITION_NOT_FOUND, None));
        };

        let mut chain = visited.to_vec();
        chain.push(split_name);
        self.evaluate_split(&split, key, attributes, &chain)
    }

    fn active_split(&self, split_name: &str) -> Option<Arc<Split>> {
        match self.split_storage.get(split_name) {
            Some(split) if split.status != Status::Archived => Some(split),
            _ => {
                log::warn!(target: "split",
                           split_name;
                           "split definition has not been found");
                None
            }
        }
    }

    /// Only a dependency cycle is returned as an error, so that it reaches the outermost
    /// evaluation.
    fn evaluate_split(
        &self,
        split: &Split,
        key: &Key,
        attributes: Option<&Attributes>,
        visited: &[&str],
    ) -> Result<EvaluationResult, EvaluationError> {
        let change_number = Some(split.change_number);
        let default_treatment = split.default_treatment.as_deref().unwrap_or(CONTROL);

        if split.killed {
            return Ok(with_treatment(split, default_treatment, labels::KILLED));
        }

        match self.walk_conditions(split, key, attributes, default_treatment, visited) {
            Ok(result) => Ok(result),
            Err(EvaluationError::DependencyCycle) => Err(EvaluationError::DependencyCycle),
            Err(EvaluationError::MalformedDefinition) => {
                log::warn!(target: "split",
                           split_name = split.name.as_str();
                           "split definition is missing conditions or seeds");
                Ok(EvaluationResult::control(labels::EXCEPTION, None))
            }
            Err(EvaluationError::MatcherNotFound) => {
                log::error!(target: "split",
                            split_name = split.name.as_str();
                            "the matcher has not been found");
                Ok(EvaluationResult::control(labels::MATCHER_NOT_FOUND, change_number))
            }
        }
    }

    fn walk_conditions(
        &self,
        split: &Split,
        key: &Key,
        attributes: Option<&Attributes>,
        default_treatment: &str,
        visited: &[&str],
    ) -> Result<EvaluationResult, EvaluationError> {
        let bucketing_key = key.effective_bucketing_key();

        let (Some(conditions), Some(traffic_allocation_seed), Some(seed)) = (
            split.conditions.as_ref(),
            split.traffic_allocation_seed,
            split.seed,
        ) else {
            return Err(EvaluationError::MalformedDefinition);
        };

        let values = EvalValues { key, attributes };
        let context = EvalContext {
            evaluator: self,
            segments: self.segment_storage.as_ref(),
            visited,
        };

        // Traffic allocation only gates the first rollout condition; later rollout conditions
        // are evaluated without it.
        let mut in_rollout = false;
        for condition in conditions {
            if !in_rollout && condition.condition_type == ConditionType::Rollout {
                if let Some(traffic_allocation) = split.traffic_allocation {
                    if traffic_allocation < 100 {
                        let bucket =
                            self.splitter
                                .bucket(bucketing_key, traffic_allocation_seed, split.algo);
                        if bucket > traffic_allocation {
                            return Ok(with_treatment(
                                split,
                                default_treatment,
                                labels::NOT_IN_SPLIT,
                            ));
                        }
                        in_rollout = true;
                    }
                }
            }

            if condition.matches(&values, &context)? {
                let treatment = self.splitter.select_partition(
                    bucketing_key,
                    seed,
                    &condition.partitions,
                    split.algo,
                );
                return Ok(with_treatment(split, treatment, &condition.label));
            }
        }

        Ok(with_treatment(
            split,
            default_treatment,
            labels::NO_CONDITION_MATCHED,
        ))
    }
}

fn with_treatment(split: &Split, treatment: &str, label: &str) -> EvaluationResult {
    EvaluationResult {
        treatment: treatment.to_owned(),
        label: label.to_owned(),
        change_number: Some(split.change_number),
        configuration: split.configuration_for(treatment).map(str::to_owned),
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use serde_json::json;

    use super::Evaluator;
    use crate::{
        eval::{labels, EvaluationResult},
        split::Split,
        splitter::FixedBucketSplitter,
        storage::{InMemorySegmentStorage, InMemorySplitStorage, SplitStorage, SplitsUpdate},
        Key,
    };

    fn storage_with(splits: Vec<serde_json::Value>) -> Arc<InMemorySplitStorage> {
        let storage = Arc::new(InMemorySplitStorage::new());
        let added: Vec<Split> = splits
            .into_iter()
            .map(|split| serde_json::from_value(split).unwrap())
            .collect();
        storage
            .update(SplitsUpdate {
                added,
                removed: vec![],
                change_number: 100,
            })
            .unwrap();
        storage
    }

    fn evaluator(storage: Arc<InMemorySplitStorage>) -> Evaluator {
        Evaluator::new(storage, Arc::new(InMemorySegmentStorage::new()))
    }

    fn all_keys_condition(condition_type: &str, label: &str, partitions: serde_json::Value) -> serde_json::Value {
        json!({
            "conditionType": condition_type,
            "matcherGroup": {
                "combiner": "AND",
                "matchers": [{"matcherType": "ALL_KEYS", "negate": false, "keySelector": null}]
            },
            "partitions": partitions,
            "label": label
        })
    }

    fn feature_x() -> serde_json::Value {
        json!({
            "name": "feature_x",
            "status": "ACTIVE",
            "killed": false,
            "defaultTreatment": "off",
            "changeNumber": 7,
            "seed": 1_234_567,
            "trafficAllocation": 100,
            "trafficAllocationSeed": -98_765,
            "algo": 2,
            "conditions": [all_keys_condition(
                "ROLLOUT",
                "default rule",
                json!([{"treatment": "on", "size": 50}, {"treatment": "off", "size": 50}])
            )]
        })
    }

    #[test]
    fn missing_split_is_control() {
        let evaluator = evaluator(storage_with(vec![]));
        assert_eq!(
            evaluator.evaluate(&Key::new("user1"), "nope", None),
            EvaluationResult {
                treatment: "control".to_owned(),
                label: labels::DEFINITION_NOT_FOUND.to_owned(),
                change_number: None,
                configuration: None,
            }
        );
    }

    #[test]
    fn archived_split_is_control() {
        let mut split = feature_x();
        split["status"] = json!("ARCHIVED");
        let evaluator = evaluator(storage_with(vec![split]));

        let result = evaluator.evaluate(&Key::new("user1"), "feature_x", None);
        assert_eq!(result.treatment, "control");
        assert_eq!(result.label, labels::DEFINITION_NOT_FOUND);
    }

    #[test]
    fn rollout_is_deterministic() {
        let evaluator = evaluator(storage_with(vec![feature_x()]));
        let key = Key::new("user1");

        let first = evaluator.evaluate(&key, "feature_x", None);
        assert!(first.treatment == "on" || first.treatment == "off");
        assert_eq!(first.label, "default rule");
        assert_eq!(first.change_number, Some(7));

        for _ in 0..100 {
            assert_eq!(evaluator.evaluate(&key, "feature_x", None), first);
        }
    }

    #[test]
    fn same_bucketing_key_same_treatment() {
        let evaluator = evaluator(storage_with(vec![feature_x()]));
        for i in 0..200 {
            let bucketing_key = format!("bucket-{i}");
            let a = evaluator.evaluate(
                &Key::with_bucketing_key("alice", bucketing_key.as_str()),
                "feature_x",
                None,
            );
            let b = evaluator.evaluate(
                &Key::with_bucketing_key("bob", bucketing_key.as_str()),
                "feature_x",
                None,
            );
            assert_eq!(a.treatment, b.treatment);
        }
    }

    #[test]
    fn killed_split_returns_default_with_configuration() {
        let mut split = feature_x();
        split["name"] = json!("feature_y");
        split["killed"] = json!(true);
        split["configurations"] = json!({"off": "{\"color\":\"red\"}"});
        let evaluator = evaluator(storage_with(vec![split]));

        let result = evaluator.evaluate(
            &Key::new("user1"),
            "feature_y",
            Some(&HashMap::from([("age".to_owned(), 30.0.into())])),
        );
        assert_eq!(
            result,
            EvaluationResult {
                treatment: "off".to_owned(),
                label: labels::KILLED.to_owned(),
                change_number: Some(7),
                configuration: Some("{\"color\":\"red\"}".to_owned()),
            }
        );
    }

    #[test]
    fn killed_short_circuits_malformed_definition() {
        let split = json!({"name": "killed_only", "killed": true, "defaultTreatment": "off", "changeNumber": 1});
        let evaluator = evaluator(storage_with(vec![split]));
        let result = evaluator.evaluate(&Key::new("user1"), "killed_only", None);
        assert_eq!(result.treatment, "off");
        assert_eq!(result.label, labels::KILLED);
    }

    #[test]
    fn traffic_allocation_excludes_keys_above_allocation() {
        let mut split = feature_x();
        split["name"] = json!("feature_z");
        split["trafficAllocation"] = json!(10);
        let evaluator = Evaluator::with_splitter(
            storage_with(vec![split]),
            Arc::new(InMemorySegmentStorage::new()),
            Arc::new(FixedBucketSplitter(55)),
        );

        let result = evaluator.evaluate(&Key::new("user1"), "feature_z", None);
        assert_eq!(result.treatment, "off");
        assert_eq!(result.label, labels::NOT_IN_SPLIT);
        assert_eq!(result.change_number, Some(7));
    }

    #[test]
    fn traffic_allocation_admits_keys_within_allocation() {
        let mut split = feature_x();
        split["trafficAllocation"] = json!(10);
        let evaluator = Evaluator::with_splitter(
            storage_with(vec![split]),
            Arc::new(InMemorySegmentStorage::new()),
            Arc::new(FixedBucketSplitter(10)),
        );

        let result = evaluator.evaluate(&Key::new("user1"), "feature_x", None);
        // Bucket 10 is within the allocation and within the first partition.
        assert_eq!(result.treatment, "on");
        assert_eq!(result.label, "default rule");
    }

    #[test]
    fn whitelist_conditions_bypass_traffic_allocation() {
        let split = json!({
            "name": "beta",
            "defaultTreatment": "off",
            "changeNumber": 3,
            "seed": 1,
            "trafficAllocation": 0,
            "trafficAllocationSeed": 2,
            "conditions": [
                {
                    "conditionType": "WHITELIST",
                    "matcherGroup": {"combiner": "AND", "matchers": [{
                        "matcherType": "WHITELIST",
                        "negate": false,
                        "whitelistMatcherData": {"whitelist": ["qa-user"]}
                    }]},
                    "partitions": [{"treatment": "on", "size": 100}],
                    "label": "whitelisted"
                },
                all_keys_condition("ROLLOUT", "default rule", json!([{"treatment": "on", "size": 100}]))
            ]
        });
        let evaluator = Evaluator::with_splitter(
            storage_with(vec![split]),
            Arc::new(InMemorySegmentStorage::new()),
            Arc::new(FixedBucketSplitter(1)),
        );

        let qa = evaluator.evaluate(&Key::new("qa-user"), "beta", None);
        assert_eq!((qa.treatment.as_str(), qa.label.as_str()), ("on", "whitelisted"));

        let other = evaluator.evaluate(&Key::new("someone"), "beta", None);
        assert_eq!(
            (other.treatment.as_str(), other.label.as_str()),
            ("off", labels::NOT_IN_SPLIT)
        );
    }

    #[test]
    fn only_first_rollout_condition_is_gated() {
        // The first rollout condition doesn't match this key; the gate still applies once and
        // the second rollout condition is reached without another check.
        let split = json!({
            "name": "two_rollouts",
            "defaultTreatment": "off",
            "changeNumber": 3,
            "seed": 1,
            "trafficAllocation": 50,
            "trafficAllocationSeed": 2,
            "conditions": [
                {
                    "conditionType": "ROLLOUT",
                    "matcherGroup": {"combiner": "AND", "matchers": [{
                        "matcherType": "WHITELIST",
                        "negate": false,
                        "whitelistMatcherData": {"whitelist": ["nobody"]}
                    }]},
                    "partitions": [{"treatment": "v1", "size": 100}],
                    "label": "first"
                },
                all_keys_condition("ROLLOUT", "second", json!([{"treatment": "v2", "size": 100}]))
            ]
        });
        let evaluator = Evaluator::with_splitter(
            storage_with(vec![split]),
            Arc::new(InMemorySegmentStorage::new()),
            Arc::new(FixedBucketSplitter(50)),
        );

        let result = evaluator.evaluate(&Key::new("user1"), "two_rollouts", None);
        assert_eq!((result.treatment.as_str(), result.label.as_str()), ("v2", "second"));
    }

    #[test]
    fn no_condition_matched_returns_default() {
        let split = json!({
            "name": "segment_only",
            "defaultTreatment": "off",
            "changeNumber": 4,
            "seed": 1,
            "trafficAllocation": 100,
            "trafficAllocationSeed": 2,
            "configurations": {"off": "{}"},
            "conditions": [{
                "conditionType": "ROLLOUT",
                "matcherGroup": {"combiner": "AND", "matchers": [{
                    "matcherType": "IN_SEGMENT",
                    "negate": false,
                    "userDefinedSegmentMatcherData": {"segmentName": "employees"}
                }]},
                "partitions": [{"treatment": "on", "size": 100}],
                "label": "in segment employees"
            }]
        });
        let evaluator = evaluator(storage_with(vec![split]));

        let result = evaluator.evaluate(&Key::new("user1"), "segment_only", None);
        assert_eq!(
            result,
            EvaluationResult {
                treatment: "off".to_owned(),
                label: labels::NO_CONDITION_MATCHED.to_owned(),
                change_number: Some(4),
                configuration: Some("{}".to_owned()),
            }
        );
    }

    #[test]
    fn malformed_definition_is_exception() {
        let mut split = feature_x();
        split.as_object_mut().unwrap().remove("seed");
        let evaluator = evaluator(storage_with(vec![split]));

        let result = evaluator.evaluate(&Key::new("user1"), "feature_x", None);
        assert_eq!(result, EvaluationResult::control(labels::EXCEPTION, None));
    }

    #[test]
    fn unknown_matcher_is_matcher_not_found() {
        let mut split = feature_x();
        split["conditions"][0]["matcherGroup"]["matchers"][0]["matcherType"] =
            json!("IN_LARGE_SEGMENT");
        let evaluator = evaluator(storage_with(vec![split]));

        let result = evaluator.evaluate(&Key::new("user1"), "feature_x", None);
        assert_eq!(
            result,
            EvaluationResult::control(labels::MATCHER_NOT_FOUND, Some(7))
        );
    }

    #[test]
    fn dependency_matcher_evaluates_parent_split() {
        let mut parent = feature_x();
        parent["name"] = json!("parent");
        parent["conditions"] = json!([all_keys_condition(
            "ROLLOUT",
            "default rule",
            json!([{"treatment": "on", "size": 100}])
        )]);
        let child = json!({
            "name": "child",
            "defaultTreatment": "off",
            "changeNumber": 9,
            "seed": 1,
            "trafficAllocation": 100,
            "trafficAllocationSeed": 2,
            "conditions": [{
                "conditionType": "ROLLOUT",
                "matcherGroup": {"combiner": "AND", "matchers": [{
                    "matcherType": "IN_SPLIT_TREATMENT",
                    "negate": false,
                    "dependencyMatcherData": {"split": "parent", "treatments": ["on"]}
                }]},
                "partitions": [{"treatment": "enabled", "size": 100}],
                "label": "parent is on"
            }]
        });
        let storage = storage_with(vec![parent, child]);
        let evaluator = evaluator(storage.clone());

        let result = evaluator.evaluate(&Key::new("user1"), "child", None);
        assert_eq!(result.treatment, "enabled");

        storage.kill("parent", "off", 101).unwrap();
        let result = evaluator.evaluate(&Key::new("user1"), "child", None);
        assert_eq!(result.label, labels::NO_CONDITION_MATCHED);
    }

    fn depends_on(name: &str, parent: &str) -> serde_json::Value {
        json!({
            "name": name,
            "defaultTreatment": "off",
            "changeNumber": 9,
            "seed": 1,
            "trafficAllocation": 100,
            "trafficAllocationSeed": 2,
            "conditions": [{
                "conditionType": "ROLLOUT",
                "matcherGroup": {"combiner": "AND", "matchers": [{
                    "matcherType": "IN_SPLIT_TREATMENT",
                    "negate": false,
                    "dependencyMatcherData": {"split": parent, "treatments": ["on"]}
                }]},
                "partitions": [{"treatment": "on", "size": 100}],
                "label": format!("{parent} is on")
            }]
        })
    }

    #[test]
    fn dependency_cycle_is_exception() {
        let storage = storage_with(vec![
            depends_on("a", "b"),
            depends_on("b", "a"),
            depends_on("self_loop", "self_loop"),
            depends_on("outside", "a"),
        ]);
        let evaluator = evaluator(storage);

        for split_name in ["a", "b", "self_loop", "outside"] {
            assert_eq!(
                evaluator.evaluate(&Key::new("user1"), split_name, None),
                EvaluationResult::control(labels::EXCEPTION, None),
                "{split_name}"
            );
        }
    }

    #[test]
    fn shared_dependency_is_not_a_cycle() {
        let mut base = feature_x();
        base["name"] = json!("base");
        base["conditions"] = json!([all_keys_condition(
            "ROLLOUT",
            "default rule",
            json!([{"treatment": "on", "size": 100}])
        )]);
        let mut top = depends_on("top", "left");
        top["conditions"][0]["matcherGroup"]["matchers"]
            .as_array_mut()
            .unwrap()
            .push(json!({
                "matcherType": "IN_SPLIT_TREATMENT",
                "negate": false,
                "dependencyMatcherData": {"split": "right", "treatments": ["on"]}
            }));
        let storage = storage_with(vec![
            base,
            depends_on("left", "base"),
            depends_on("right", "base"),
            top,
        ]);

        let result = evaluator(storage).evaluate(&Key::new("user1"), "top", None);
        assert_eq!(result.treatment, "on");
        assert_eq!(result.label, "left is on");
    }
}
