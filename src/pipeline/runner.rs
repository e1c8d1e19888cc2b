// src/pipeline/runner.rs

//! Single-task execution: timeout, retries with backoff, cancellation.

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::SessionContext;
use crate::pipeline::report::TaskReport;
use crate::pipeline::task::{Task, TaskError, TaskResult};
use crate::types::FailureKind;

/// How often a transiently failing task is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Run one attempt, converting a timeout or a panic into a `TaskError`.
async fn run_attempt(
    task: &Task,
    ctx: &SessionContext,
    timeout: Option<Duration>,
) -> Result<Value, TaskError> {
    let fut = AssertUnwindSafe(task.unit.run(&task.spec, ctx)).catch_unwind();

    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(outcome) => outcome,
            Err(_) => return Err(TaskError::Timeout(limit)),
        },
        None => fut.await,
    };

    outcome.unwrap_or_else(|_| Err(TaskError::Failed("task unit panicked".to_string())))
}

fn cancelled() -> TaskResult {
    TaskResult::failure(FailureKind::Cancelled, "cancelled after a sibling task failed")
}

/// Execute `task` to a final [`TaskReport`].
///
/// The task's own timeout wins over `default_timeout`. Each attempt gets the
/// full timeout. Firing `cancel` ends the current attempt or backoff sleep
/// immediately with a `Cancelled` failure.
pub(crate) async fn run_task(
    task: &Task,
    index: usize,
    ctx: &SessionContext,
    default_timeout: Option<Duration>,
    retry: RetryPolicy,
    cancel: &CancellationToken,
) -> TaskReport {
    let start = Instant::now();
    let timeout = task.spec.timeout.or(default_timeout);
    let name = task.spec.name.as_str();
    let mut attempts = 0u32;

    debug!(task = %name, index, ?timeout, "starting task");

    let result = loop {
        attempts += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            res = run_attempt(task, ctx, timeout) => Some(res),
        };

        let err = match outcome {
            None => break cancelled(),
            Some(Ok(value)) => break TaskResult::Success(value),
            Some(Err(err)) => err,
        };

        let retries_used = attempts - 1;
        if !err.kind().is_retryable() || retries_used >= retry.max_retries {
            break TaskResult::from(err);
        }

        let delay = retry.delay_for(retries_used);
        warn!(
            task = %name,
            index,
            attempt = attempts,
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "task attempt failed; retrying"
        );

        let interrupted = tokio::select! {
            biased;
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(delay) => false,
        };
        if interrupted {
            break cancelled();
        }
    };

    let duration_ms = start.elapsed().as_millis();
    match &result {
        TaskResult::Success(_) => {
            info!(task = %name, index, attempts, duration_ms = duration_ms as u64, "task succeeded");
        }
        TaskResult::Failure { kind, detail } => {
            warn!(
                task = %name,
                index,
                attempts,
                kind = %kind,
                detail = %detail,
                "task failed"
            );
        }
    }

    TaskReport {
        index,
        name: task.spec.name.clone(),
        output_key: task.spec.output_key.clone(),
        result,
        attempts,
        duration_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_retry() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn huge_retry_counts_saturate() {
        let policy = RetryPolicy {
            max_retries: u32::MAX,
            base_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_for(64), Duration::from_secs(1).saturating_mul(u32::MAX));
    }
}
