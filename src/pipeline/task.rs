// src/pipeline/task.rs

//! Task Units, Task Specs and Task Results.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::collab::CollaboratorError;
use crate::context::SessionContext;
use crate::types::FailureKind;

/// Immutable description of one schedulable piece of work.
///
/// Created by a stage definition or a fan-out planner, consumed exactly
/// once by the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub name: String,
    pub input: Value,
    /// Session Context key the result is written to.
    pub output_key: String,
    /// Overrides the executor's default timeout.
    pub timeout: Option<Duration>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, output_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: Value::Null,
            output_key: output_key.into(),
            timeout: None,
        }
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Outcome of executing a Task Unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum TaskResult {
    Success(Value),
    Failure { kind: FailureKind, detail: String },
}

impl TaskResult {
    pub fn failure(kind: FailureKind, detail: impl Into<String>) -> Self {
        TaskResult::Failure {
            kind,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskResult::Success(_))
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            TaskResult::Success(_) => None,
            TaskResult::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            TaskResult::Success(value) => Some(value),
            TaskResult::Failure { .. } => None,
        }
    }
}

impl From<TaskError> for TaskResult {
    fn from(err: TaskError) -> Self {
        TaskResult::Failure {
            kind: err.kind(),
            detail: err.to_string(),
        }
    }
}

/// Error a Task Unit reports for a single attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("{0}")]
    Failed(String),
}

impl TaskError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TaskError::Timeout(_) => FailureKind::Timeout,
            TaskError::Collaborator(CollaboratorError::Unavailable { .. }) => {
                FailureKind::CollaboratorUnavailable
            }
            TaskError::Collaborator(CollaboratorError::Malformed { .. }) => {
                FailureKind::TaskFailure
            }
            TaskError::MalformedInput(_) => FailureKind::MalformedInput,
            TaskError::Failed(_) => FailureKind::TaskFailure,
        }
    }
}

/// A single unit of work.
///
/// Units read the session context but never write it: the executor stores
/// the returned value under the spec's output key once the stage joins.
#[async_trait]
pub trait TaskUnit: Send + Sync {
    async fn run(&self, spec: &TaskSpec, ctx: &SessionContext) -> Result<Value, TaskError>;
}

/// A spec bound to the unit that executes it.
#[derive(Clone)]
pub struct Task {
    pub spec: TaskSpec,
    pub unit: Arc<dyn TaskUnit>,
}

impl Task {
    pub fn new(spec: TaskSpec, unit: Arc<dyn TaskUnit>) -> Self {
        Self { spec, unit }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}
