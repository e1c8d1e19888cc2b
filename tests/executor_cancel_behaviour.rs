use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use diligence::context::SessionContext;
use diligence::pipeline::{
    ExecutorOptions, PipelineExecutor, RetryPolicy, Stage, StageOutcome, Task, TaskSpec, TaskUnit,
};
use diligence::types::{FailureKind, JoinPolicy};
use diligence_test_utils::builders::{fast_executor, fast_options};
use diligence_test_utils::fakes::{FlakyUnit, PanickingUnit, ScriptedUnit};
use diligence_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn scripted(unit: &Arc<ScriptedUnit>, name: &str, key: &str, input: serde_json::Value) -> Task {
    let unit: Arc<dyn TaskUnit> = unit.clone();
    Task::new(TaskSpec::new(name, key).with_input(input), unit)
}

fn kinds(outcome: &diligence::pipeline::PipelineOutcome, stage: &str) -> Vec<Option<FailureKind>> {
    outcome
        .stage(stage)
        .map(|s| s.tasks.iter().map(|t| t.result.failure_kind()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn all_or_fail_cancels_slow_siblings() -> TestResult {
    init_tracing();
    let unit = Arc::new(ScriptedUnit::new());

    let stage = Stage::parallel(
        "strict",
        vec![
            scripted(&unit, "slow_a", "result_0", ScriptedUnit::input(1_500)),
            scripted(&unit, "fails", "result_1", ScriptedUnit::failing_input(10, "failure")),
            scripted(&unit, "slow_b", "result_2", ScriptedUnit::input(1_500)),
        ],
        JoinPolicy::AllOrFail,
    );

    let started = Instant::now();
    let outcome = with_timeout(fast_executor().run(vec![stage], SessionContext::new())).await;

    assert!(started.elapsed() < Duration::from_millis(1_000));
    assert!(!outcome.is_completed());
    assert_eq!(
        kinds(&outcome, "strict"),
        vec![
            Some(FailureKind::Cancelled),
            Some(FailureKind::TaskFailure),
            Some(FailureKind::Cancelled),
        ]
    );
    // Cancelled siblings never reached the end of their work.
    assert_eq!(unit.finished(), vec!["fails"]);
    assert_eq!(
        outcome.context.result("result_2").and_then(|r| r.failure_kind()),
        Some(FailureKind::Cancelled)
    );
    Ok(())
}

#[tokio::test]
async fn best_effort_never_cancels_siblings() -> TestResult {
    init_tracing();
    let unit = Arc::new(ScriptedUnit::new());

    let stage = Stage::parallel(
        "lenient",
        vec![
            scripted(&unit, "fails", "result_0", ScriptedUnit::failing_input(0, "failure")),
            scripted(&unit, "slow", "result_1", ScriptedUnit::input(100)),
        ],
        JoinPolicy::BestEffort,
    );

    let outcome = with_timeout(fast_executor().run(vec![stage], SessionContext::new())).await;

    assert!(outcome.is_completed());
    assert_eq!(
        kinds(&outcome, "lenient"),
        vec![Some(FailureKind::TaskFailure), None]
    );
    assert_eq!(unit.finished(), vec!["fails", "slow"]);
    Ok(())
}

#[tokio::test]
async fn exceeding_timeout_is_a_timeout_result() -> TestResult {
    init_tracing();
    let unit = Arc::new(ScriptedUnit::new());

    let slow = Task::new(
        TaskSpec::new("slow", "result_1")
            .with_input(ScriptedUnit::input(2_000))
            .with_timeout(Duration::from_millis(50)),
        unit.clone() as Arc<dyn TaskUnit>,
    );
    let stage = Stage::parallel(
        "timed",
        vec![scripted(&unit, "quick", "result_0", ScriptedUnit::input(0)), slow],
        JoinPolicy::BestEffort,
    );

    let outcome = with_timeout(fast_executor().run(vec![stage], SessionContext::new())).await;

    assert!(outcome.is_completed());
    let report = outcome.stage("timed").ok_or("missing report")?;
    assert_eq!(report.outcome, StageOutcome::Partial);
    assert_eq!(report.tasks[1].result.failure_kind(), Some(FailureKind::Timeout));
    Ok(())
}

#[tokio::test]
async fn transient_failures_are_retried_with_backoff() -> TestResult {
    init_tracing();
    let flaky = Arc::new(FlakyUnit::new(2, FailureKind::CollaboratorUnavailable));

    let executor = PipelineExecutor::new(ExecutorOptions {
        retry: RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(5),
        },
        ..fast_options()
    });
    let stage = Stage::sequential(
        "retrying",
        vec![Task::new(TaskSpec::new("flaky", "out"), flaky.clone() as Arc<dyn TaskUnit>).into()],
    );

    let outcome = with_timeout(executor.run(vec![stage], SessionContext::new())).await;

    assert!(outcome.is_completed());
    assert_eq!(flaky.attempts(), 3);
    let report = &outcome.stage("retrying").ok_or("missing report")?.tasks[0];
    assert_eq!(report.attempts, 3);
    assert_eq!(outcome.context.get("out"), Some(&serde_json::json!({"attempt": 3})));
    Ok(())
}

#[tokio::test]
async fn permanent_failures_are_not_retried() -> TestResult {
    init_tracing();
    let flaky = Arc::new(FlakyUnit::new(1, FailureKind::TaskFailure));

    let executor = PipelineExecutor::new(ExecutorOptions {
        retry: RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(5),
        },
        ..fast_options()
    });
    let stage = Stage::sequential(
        "once",
        vec![Task::new(TaskSpec::new("flaky", "out"), flaky.clone() as Arc<dyn TaskUnit>).into()],
    );

    let outcome = with_timeout(executor.run(vec![stage], SessionContext::new())).await;

    assert!(!outcome.is_completed());
    assert_eq!(flaky.attempts(), 1);
    Ok(())
}

#[tokio::test]
async fn panicking_unit_becomes_task_failure() -> TestResult {
    init_tracing();
    let unit = Arc::new(ScriptedUnit::new());

    let stage = Stage::parallel(
        "mixed",
        vec![
            Task::new(TaskSpec::new("boom", "result_0"), Arc::new(PanickingUnit)),
            scripted(&unit, "fine", "result_1", ScriptedUnit::input(0)),
        ],
        JoinPolicy::BestEffort,
    );

    let outcome = with_timeout(fast_executor().run(vec![stage], SessionContext::new())).await;

    assert!(outcome.is_completed());
    assert_eq!(
        kinds(&outcome, "mixed"),
        vec![Some(FailureKind::TaskFailure), None]
    );
    Ok(())
}
