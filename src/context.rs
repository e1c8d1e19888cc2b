// src/context.rs

//! Session Context: the keyed state bus threaded through a pipeline run.
//!
//! Stages never talk to each other directly; the Executor writes every
//! task's result here after the owning stage's join barrier, and later
//! stages read from it. Running tasks only ever see a read-only snapshot
//! (`Arc<SessionContext>`), so there is exactly one writer at a time.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::pipeline::report::StageManifest;
use crate::pipeline::task::TaskResult;
use crate::types::FailureKind;

/// Output key of the `index`-th task spawned by a fan-out with `prefix`.
///
/// `result_key("result", 0) == "result_0"`.
pub fn result_key(prefix: &str, index: usize) -> String {
    format!("{prefix}_{index}")
}

/// Key under which the Executor stores a Parallel stage's manifest.
pub fn manifest_key(stage: &str) -> String {
    format!("stage.{stage}")
}

#[derive(Debug, Clone, PartialEq)]
struct RecordedFailure {
    kind: FailureKind,
    detail: String,
}

/// Mapping from string keys to JSON values, plus recorded task failures.
///
/// Scoped to one pipeline run (or one question-generation run of an
/// interview session) and dropped with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContext {
    values: HashMap<String, Value>,
    failures: HashMap<String, RecordedFailure>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert for seeding the initial context.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a raw value, replacing any earlier value or failure at `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        self.failures.remove(&key);
        self.values.insert(key, value.into());
    }

    /// Serialize `value` and insert it under `key`.
    pub fn put_as<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Deserialize the value at `key`, if any.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.values
            .get(key)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key) || self.failures.contains_key(key)
    }

    /// All keys holding either a value or a recorded failure, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let keys: BTreeSet<&str> = self
            .values
            .keys()
            .chain(self.failures.keys())
            .map(String::as_str)
            .collect();
        keys.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.failures.is_empty()
    }

    /// The task result stored at `key`, reconstructed from either the
    /// value map or the failure map.
    pub fn result(&self, key: &str) -> Option<TaskResult> {
        if let Some(failure) = self.failures.get(key) {
            return Some(TaskResult::Failure {
                kind: failure.kind,
                detail: failure.detail.clone(),
            });
        }
        self.values.get(key).cloned().map(TaskResult::Success)
    }

    /// Manifest written by the Executor after a Parallel stage's join barrier.
    pub fn manifest(&self, stage: &str) -> Option<StageManifest> {
        self.get_as(&manifest_key(stage)).ok().flatten()
    }

    /// Store a task result. Only the Executor calls this, at join barriers.
    pub(crate) fn record(&mut self, key: &str, result: &TaskResult) {
        match result {
            TaskResult::Success(value) => {
                self.failures.remove(key);
                self.values.insert(key.to_string(), value.clone());
            }
            TaskResult::Failure { kind, detail } => {
                self.values.remove(key);
                self.failures.insert(
                    key.to_string(),
                    RecordedFailure {
                        kind: *kind,
                        detail: detail.clone(),
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn result_keys_are_positional() {
        assert_eq!(result_key("result", 0), "result_0");
        assert_eq!(result_key("research_result", 12), "research_result_12");
    }

    #[test]
    fn recorded_failure_replaces_value() {
        let mut ctx = SessionContext::new().with_value("result_0", "draft");
        ctx.record(
            "result_0",
            &TaskResult::Failure {
                kind: FailureKind::Timeout,
                detail: "slow".into(),
            },
        );

        assert!(ctx.get("result_0").is_none());
        assert!(ctx.contains("result_0"));
        assert_eq!(
            ctx.result("result_0"),
            Some(TaskResult::Failure {
                kind: FailureKind::Timeout,
                detail: "slow".into()
            })
        );
    }

    #[test]
    fn typed_round_trip_through_values() {
        let mut ctx = SessionContext::new();
        ctx.put_as("names", &vec!["a", "b"]).unwrap();

        let names: Option<Vec<String>> = ctx.get_as("names").unwrap();
        assert_eq!(names, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(ctx.result("names"), Some(TaskResult::Success(json!(["a", "b"]))));
        assert_eq!(ctx.get_as::<Vec<String>>("missing").unwrap(), None);
    }

    #[test]
    fn keys_cover_values_and_failures() {
        let mut ctx = SessionContext::new().with_value("b", 1).with_value("a", 2);
        ctx.record(
            "c",
            &TaskResult::Failure {
                kind: FailureKind::Cancelled,
                detail: String::new(),
            },
        );
        assert_eq!(ctx.keys(), vec!["a", "b", "c"]);
        assert_eq!(ctx.len(), 3);
    }
}
