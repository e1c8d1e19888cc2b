// src/pipeline/stage.rs

//! Stage descriptors.
//!
//! A pipeline is an ordered list of stages; each stage is either a
//! sequential list of steps (tasks or nested stages) or a parallel group of
//! tasks whose width is fixed before any of them starts.

use std::sync::Arc;

use crate::pipeline::planner::FanOutPlanner;
use crate::pipeline::task::{Task, TaskUnit};
use crate::types::{ExecutionMode, JoinPolicy};

/// One element of a Sequential stage.
#[derive(Debug)]
pub enum Step {
    Task(Task),
    Stage(Stage),
}

impl From<Task> for Step {
    fn from(task: Task) -> Self {
        Step::Task(task)
    }
}

impl From<Stage> for Step {
    fn from(stage: Stage) -> Self {
        Step::Stage(stage)
    }
}

/// Where a Parallel stage's tasks come from.
pub enum FanOut {
    /// Tasks known when the pipeline is built.
    Fixed(Vec<Task>),
    /// Tasks planned at run time from the context value at `source_key`,
    /// all executed by the same `unit`.
    Planned {
        source_key: String,
        planner: Arc<dyn FanOutPlanner>,
        unit: Arc<dyn TaskUnit>,
    },
}

impl std::fmt::Debug for FanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FanOut::Fixed(tasks) => f.debug_tuple("Fixed").field(tasks).finish(),
            FanOut::Planned { source_key, .. } => f
                .debug_struct("Planned")
                .field("source_key", source_key)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug)]
pub enum Stage {
    Sequential {
        name: String,
        steps: Vec<Step>,
    },
    Parallel {
        name: String,
        fanout: FanOut,
        policy: JoinPolicy,
    },
}

impl Stage {
    /// Sequential stage; a failing step aborts the pipeline.
    pub fn sequential(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Stage::Sequential {
            name: name.into(),
            steps,
        }
    }

    /// Parallel stage over a fixed task list.
    pub fn parallel(name: impl Into<String>, tasks: Vec<Task>, policy: JoinPolicy) -> Self {
        Stage::Parallel {
            name: name.into(),
            fanout: FanOut::Fixed(tasks),
            policy,
        }
    }

    /// Parallel stage whose tasks are planned from `source_key` at run time.
    pub fn fan_out(
        name: impl Into<String>,
        source_key: impl Into<String>,
        planner: Arc<dyn FanOutPlanner>,
        unit: Arc<dyn TaskUnit>,
        policy: JoinPolicy,
    ) -> Self {
        Stage::Parallel {
            name: name.into(),
            fanout: FanOut::Planned {
                source_key: source_key.into(),
                planner,
                unit,
            },
            policy,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Stage::Sequential { name, .. } | Stage::Parallel { name, .. } => name,
        }
    }

    pub fn execution(&self) -> ExecutionMode {
        match self {
            Stage::Sequential { .. } => ExecutionMode::Sequential,
            Stage::Parallel { .. } => ExecutionMode::Parallel,
        }
    }

    /// Human-readable outline used by `--dry-run`.
    pub fn describe(&self, depth: usize, out: &mut Vec<String>) {
        let indent = "  ".repeat(depth);
        match self {
            Stage::Sequential { name, steps } => {
                out.push(format!("{indent}- {name} (sequential)"));
                for step in steps {
                    match step {
                        Step::Task(task) => out.push(format!(
                            "{indent}    task {} -> {}",
                            task.spec.name, task.spec.output_key
                        )),
                        Step::Stage(stage) => stage.describe(depth + 2, out),
                    }
                }
            }
            Stage::Parallel {
                name,
                fanout,
                policy,
            } => match fanout {
                FanOut::Fixed(tasks) => {
                    out.push(format!(
                        "{indent}- {name} (parallel, {policy:?}, {} fixed tasks)",
                        tasks.len()
                    ));
                }
                FanOut::Planned { source_key, .. } => {
                    out.push(format!(
                        "{indent}- {name} (parallel, {policy:?}, planned from '{source_key}')"
                    ));
                }
            },
        }
    }
}
