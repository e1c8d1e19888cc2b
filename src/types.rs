use std::fmt;

use serde::{Deserialize, Serialize};

/// How a Parallel stage derives its outcome from its tasks' outcomes.
///
/// - `AllOrFail`: the first task failure cancels the still-running siblings
///   and aborts the pipeline.
/// - `BestEffort`: failures are recorded as partial results; the stage
///   succeeds as long as at least one task succeeded. It never aborts the
///   pipeline, even when every task failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JoinPolicy {
    AllOrFail,
    BestEffort,
}

/// Execution topology of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

/// Why a task produced a `Failure` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The task exceeded its timeout (on its final attempt).
    Timeout,
    /// An external collaborator could not be reached or errored.
    CollaboratorUnavailable,
    /// The task's input could not be interpreted.
    MalformedInput,
    /// Any other task-level failure.
    TaskFailure,
    /// A sibling failed in an all-or-fail stage and this task was stopped.
    Cancelled,
}

impl FailureKind {
    /// Whether a failure of this kind is worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::Timeout | FailureKind::CollaboratorUnavailable
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::CollaboratorUnavailable => "collaborator unavailable",
            FailureKind::MalformedInput => "malformed input",
            FailureKind::TaskFailure => "task failure",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}
