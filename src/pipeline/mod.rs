// src/pipeline/mod.rs

//! Pipeline orchestration.
//!
//! - `task`: Task Units, specs and results.
//! - `planner`: run-time fan-out planning, capped at a maximum width.
//! - `stage`: Sequential / Parallel stage descriptors.
//! - `runner`: one task under timeout, retry and cancellation.
//! - `executor`: runs stages in order, joins parallel groups, writes the
//!   Session Context at join barriers.
//! - `aggregate`: synthesis of a parallel stage's results into one report.

pub mod aggregate;
pub mod executor;
pub mod planner;
pub mod report;
pub mod runner;
pub mod stage;
pub mod task;

pub use aggregate::{ReportCompiler, Section, synthesize};
pub use executor::{ExecutorOptions, PipelineExecutor};
pub use planner::{DEFAULT_KEY_PREFIX, Entity, EntityPlanner, FanOutPlanner, cap_width};
pub use report::{
    AbortInfo, ManifestEntry, PipelineOutcome, PipelineStatus, StageManifest, StageOutcome,
    StageReport, TaskReport,
};
pub use runner::RetryPolicy;
pub use stage::{FanOut, Stage, Step};
pub use task::{Task, TaskError, TaskResult, TaskSpec, TaskUnit};
