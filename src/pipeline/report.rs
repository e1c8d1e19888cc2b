// src/pipeline/report.rs

use serde::{Deserialize, Serialize};

use crate::context::SessionContext;
use crate::errors::DiligenceError;
use crate::pipeline::task::TaskResult;
use crate::types::{ExecutionMode, FailureKind};

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// Every task succeeded.
    Succeeded,
    /// Best-effort stage with at least one success and at least one failure.
    Partial,
    /// The planner produced no tasks.
    NothingToDo,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    /// Spawn index within the stage.
    pub index: usize,
    pub name: String,
    pub output_key: String,
    pub result: TaskResult,
    pub attempts: u32,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub name: String,
    pub execution: ExecutionMode,
    pub outcome: StageOutcome,
    pub duration_ms: u128,
    /// Direct tasks of the stage, in spawn order.
    pub tasks: Vec<TaskReport>,
}

impl StageReport {
    pub fn succeeded_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.result.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.tasks.len() - self.succeeded_count()
    }
}

/// One spawned task as recorded in a [`StageManifest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub index: usize,
    pub name: String,
    pub output_key: String,
}

/// Written into the Session Context after a Parallel stage's join barrier
/// so later stages can find its results without knowing its width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageManifest {
    pub stage: String,
    pub outcome: StageOutcome,
    pub entries: Vec<ManifestEntry>,
}

impl StageManifest {
    pub fn is_nothing_to_do(&self) -> bool {
        self.outcome == StageOutcome::NothingToDo
    }
}

/// Which task made the pipeline stop, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct AbortInfo {
    pub stage: String,
    pub task: String,
    pub output_key: String,
    pub kind: FailureKind,
    pub detail: String,
}

impl From<AbortInfo> for DiligenceError {
    fn from(info: AbortInfo) -> Self {
        DiligenceError::PipelineAborted {
            stage: info.stage,
            task: info.task,
            kind: info.kind,
            detail: info.detail,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineStatus {
    Completed,
    Aborted(AbortInfo),
}

/// Everything a pipeline run hands back to its caller.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Final context; on abort, the partial context accumulated so far.
    pub context: SessionContext,
    /// Per-stage reports in completion order.
    pub stages: Vec<StageReport>,
    pub status: PipelineStatus,
    pub total_duration_ms: u128,
}

impl PipelineOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == PipelineStatus::Completed
    }

    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// The context, or the abort turned into a crate error.
    pub fn into_result(self) -> Result<SessionContext, DiligenceError> {
        match self.status {
            PipelineStatus::Completed => Ok(self.context),
            PipelineStatus::Aborted(info) => Err(info.into()),
        }
    }
}
