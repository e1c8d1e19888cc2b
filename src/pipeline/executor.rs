// src/pipeline/executor.rs

//! The Pipeline Executor.
//!
//! Runs stages strictly in order. Parallel stages spawn every task at once
//! onto a `JoinSet`, join them all (or cancel the rest under all-or-fail),
//! and only then write results into the Session Context in spawn order.
//! Nothing a task does can reach the context before its stage's barrier.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PipelineSettings;
use crate::context::{SessionContext, manifest_key};
use crate::pipeline::report::{
    AbortInfo, ManifestEntry, PipelineOutcome, PipelineStatus, StageManifest, StageOutcome,
    StageReport, TaskReport,
};
use crate::pipeline::runner::{RetryPolicy, run_task};
use crate::pipeline::stage::{FanOut, Stage, Step};
use crate::pipeline::task::{Task, TaskResult};
use crate::types::{ExecutionMode, FailureKind, JoinPolicy};

/// Knobs for a [`PipelineExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Applied to every task whose spec has no timeout of its own.
    pub default_timeout: Option<Duration>,
    pub retry: RetryPolicy,
    /// How long cancelled siblings get to wind down before being aborted.
    pub cancel_grace: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self::from(&PipelineSettings::default())
    }
}

impl From<&PipelineSettings> for ExecutorOptions {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            default_timeout: Some(settings.task_timeout),
            retry: RetryPolicy {
                max_retries: settings.max_retries,
                base_delay: settings.retry_base_delay,
            },
            cancel_grace: settings.cancel_grace,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineExecutor {
    options: ExecutorOptions,
}

impl PipelineExecutor {
    pub fn new(options: ExecutorOptions) -> Self {
        Self { options }
    }

    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self::new(ExecutorOptions::from(settings))
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Run `stages` in order against `initial`.
    ///
    /// Never fails outright: an abort is reported through
    /// [`PipelineStatus::Aborted`] together with the partial context.
    pub async fn run(&self, stages: Vec<Stage>, initial: SessionContext) -> PipelineOutcome {
        let start = Instant::now();
        let mut ctx = initial;
        let mut reports = Vec::new();

        info!(stages = stages.len(), "pipeline starting");

        for stage in stages {
            if let Err(abort) = self.run_stage(stage, &mut ctx, &mut reports).await {
                warn!(
                    stage = %abort.stage,
                    task = %abort.task,
                    kind = %abort.kind,
                    detail = %abort.detail,
                    "pipeline aborted"
                );
                return PipelineOutcome {
                    context: ctx,
                    stages: reports,
                    status: PipelineStatus::Aborted(abort),
                    total_duration_ms: start.elapsed().as_millis(),
                };
            }
        }

        let total_duration_ms = start.elapsed().as_millis();
        info!(total_duration_ms = total_duration_ms as u64, "pipeline completed");

        PipelineOutcome {
            context: ctx,
            stages: reports,
            status: PipelineStatus::Completed,
            total_duration_ms,
        }
    }

    // Boxed so Sequential stages can nest further stages.
    fn run_stage<'a>(
        &'a self,
        stage: Stage,
        ctx: &'a mut SessionContext,
        reports: &'a mut Vec<StageReport>,
    ) -> BoxFuture<'a, Result<(), AbortInfo>> {
        Box::pin(async move {
            match stage {
                Stage::Sequential { name, steps } => {
                    self.run_sequential(name, steps, ctx, reports).await
                }
                Stage::Parallel {
                    name,
                    fanout,
                    policy,
                } => self.run_parallel(name, fanout, policy, ctx, reports).await,
            }
        })
    }

    async fn run_sequential(
        &self,
        name: String,
        steps: Vec<Step>,
        ctx: &mut SessionContext,
        reports: &mut Vec<StageReport>,
    ) -> Result<(), AbortInfo> {
        let start = Instant::now();
        // Sequential tasks are never cancelled by siblings.
        let never = CancellationToken::new();
        let mut tasks: Vec<TaskReport> = Vec::new();

        info!(stage = %name, steps = steps.len(), "sequential stage starting");

        for step in steps {
            let failure = match step {
                Step::Task(task) => {
                    let report = run_task(
                        &task,
                        tasks.len(),
                        ctx,
                        self.options.default_timeout,
                        self.options.retry,
                        &never,
                    )
                    .await;
                    ctx.record(&report.output_key, &report.result);
                    let abort = abort_info(&name, &report);
                    tasks.push(report);
                    abort
                }
                Step::Stage(child) => self.run_stage(child, ctx, reports).await.err(),
            };

            if let Some(abort) = failure {
                reports.push(StageReport {
                    name,
                    execution: ExecutionMode::Sequential,
                    outcome: StageOutcome::Failed,
                    duration_ms: start.elapsed().as_millis(),
                    tasks,
                });
                return Err(abort);
            }
        }

        let duration_ms = start.elapsed().as_millis();
        info!(stage = %name, duration_ms = duration_ms as u64, "sequential stage finished");

        reports.push(StageReport {
            name,
            execution: ExecutionMode::Sequential,
            outcome: StageOutcome::Succeeded,
            duration_ms,
            tasks,
        });
        Ok(())
    }

    async fn run_parallel(
        &self,
        name: String,
        fanout: FanOut,
        policy: JoinPolicy,
        ctx: &mut SessionContext,
        reports: &mut Vec<StageReport>,
    ) -> Result<(), AbortInfo> {
        let start = Instant::now();

        let tasks: Vec<Task> = match fanout {
            FanOut::Fixed(tasks) => tasks,
            FanOut::Planned {
                source_key,
                planner,
                unit,
            } => planner
                .plan(ctx.get(&source_key))
                .into_iter()
                .map(|spec| Task::new(spec, Arc::clone(&unit)))
                .collect(),
        };

        let entries: Vec<ManifestEntry> = tasks
            .iter()
            .enumerate()
            .map(|(index, task)| ManifestEntry {
                index,
                name: task.spec.name.clone(),
                output_key: task.spec.output_key.clone(),
            })
            .collect();

        if tasks.is_empty() {
            info!(stage = %name, "parallel stage has nothing to do");
            write_manifest(ctx, &name, StageOutcome::NothingToDo, entries);
            reports.push(StageReport {
                name,
                execution: ExecutionMode::Parallel,
                outcome: StageOutcome::NothingToDo,
                duration_ms: start.elapsed().as_millis(),
                tasks: Vec::new(),
            });
            return Ok(());
        }

        let width = tasks.len();
        info!(stage = %name, width, ?policy, "parallel stage starting");

        let snapshot = Arc::new(ctx.clone());
        let cancel = CancellationToken::new();
        let mut set = JoinSet::new();

        for (index, task) in tasks.into_iter().enumerate() {
            let snapshot = Arc::clone(&snapshot);
            let cancel = cancel.clone();
            let default_timeout = self.options.default_timeout;
            let retry = self.options.retry;
            set.spawn(async move {
                run_task(&task, index, &snapshot, default_timeout, retry, &cancel).await
            });
        }

        let mut slots: Vec<Option<TaskReport>> = vec![None; width];
        let mut trigger: Option<usize> = None;

        while let Some(joined) = set.join_next().await {
            let report = match joined {
                Ok(report) => report,
                Err(e) => {
                    warn!(stage = %name, error = %e, "task did not join cleanly");
                    continue;
                }
            };
            let index = report.index;
            let failed = !report.result.is_success();
            slots[index] = Some(report);

            if failed && policy == JoinPolicy::AllOrFail {
                warn!(stage = %name, index, "task failed; cancelling siblings");
                trigger = Some(index);
                cancel.cancel();
                break;
            }
        }

        if trigger.is_some() && !set.is_empty() {
            let grace = self.options.cancel_grace;
            let drained = tokio::time::timeout(grace, async {
                while let Some(joined) = set.join_next().await {
                    if let Ok(report) = joined {
                        let index = report.index;
                        slots[index] = Some(report);
                    }
                }
            })
            .await;

            if drained.is_err() {
                warn!(
                    stage = %name,
                    remaining = set.len(),
                    grace_ms = grace.as_millis() as u64,
                    "siblings ignored cancellation; aborting them"
                );
                set.abort_all();
            }
        }
        drop(set);

        let task_reports: Vec<TaskReport> = slots
            .into_iter()
            .zip(&entries)
            .map(|(slot, entry)| {
                slot.unwrap_or_else(|| {
                    let result = if trigger.is_some() {
                        TaskResult::failure(FailureKind::Cancelled, "aborted after cancel grace")
                    } else {
                        TaskResult::failure(FailureKind::TaskFailure, "task did not report a result")
                    };
                    TaskReport {
                        index: entry.index,
                        name: entry.name.clone(),
                        output_key: entry.output_key.clone(),
                        result,
                        attempts: 0,
                        duration_ms: start.elapsed().as_millis(),
                    }
                })
            })
            .collect();

        for report in &task_reports {
            ctx.record(&report.output_key, &report.result);
        }

        let succeeded = task_reports.iter().filter(|r| r.result.is_success()).count();
        let outcome = match policy {
            _ if succeeded == width => StageOutcome::Succeeded,
            JoinPolicy::BestEffort if succeeded > 0 => StageOutcome::Partial,
            _ => StageOutcome::Failed,
        };

        write_manifest(ctx, &name, outcome, entries);

        let duration_ms = start.elapsed().as_millis();
        info!(
            stage = %name,
            succeeded,
            failed = width - succeeded,
            ?outcome,
            duration_ms = duration_ms as u64,
            "parallel stage joined"
        );

        // A best-effort stage with no successes is reported as failed but
        // never stops the pipeline; downstream stages see the gaps.
        let abort = if outcome == StageOutcome::Failed && policy == JoinPolicy::AllOrFail {
            // The task that triggered cancellation, else the first failure.
            trigger
                .and_then(|i| task_reports.get(i))
                .or_else(|| task_reports.iter().find(|r| !r.result.is_success()))
                .and_then(|r| abort_info(&name, r))
        } else {
            None
        };

        reports.push(StageReport {
            name,
            execution: ExecutionMode::Parallel,
            outcome,
            duration_ms,
            tasks: task_reports,
        });

        match abort {
            Some(abort) => Err(abort),
            None => Ok(()),
        }
    }
}

fn abort_info(stage: &str, report: &TaskReport) -> Option<AbortInfo> {
    match &report.result {
        TaskResult::Success(_) => None,
        TaskResult::Failure { kind, detail } => Some(AbortInfo {
            stage: stage.to_string(),
            task: report.name.clone(),
            output_key: report.output_key.clone(),
            kind: *kind,
            detail: detail.clone(),
        }),
    }
}

fn write_manifest(
    ctx: &mut SessionContext,
    stage: &str,
    outcome: StageOutcome,
    entries: Vec<ManifestEntry>,
) {
    let manifest = StageManifest {
        stage: stage.to_string(),
        outcome,
        entries,
    };
    match ctx.put_as(manifest_key(stage), &manifest) {
        Ok(()) => debug!(stage, ?outcome, "stage manifest written"),
        Err(e) => warn!(stage, error = %e, "failed to serialize stage manifest"),
    }
}
