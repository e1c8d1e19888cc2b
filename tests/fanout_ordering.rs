use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use diligence::context::SessionContext;
use diligence::pipeline::{
    EntityPlanner, ReportCompiler, Stage, StageOutcome, Task, TaskError, TaskSpec, TaskUnit,
};
use diligence::types::JoinPolicy;
use diligence_test_utils::builders::fast_executor;
use diligence_test_utils::fakes::ScriptedUnit;
use diligence_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// Finishes in reverse order of spawn: the first entity sleeps longest.
struct ReverseDelayUnit {
    finished: std::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl TaskUnit for ReverseDelayUnit {
    async fn run(&self, spec: &TaskSpec, _ctx: &SessionContext) -> Result<Value, TaskError> {
        let delay = match spec.name.as_str() {
            "Acme" => 120,
            "Globex" => 60,
            _ => 0,
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.finished.lock().unwrap().push(spec.name.clone());
        if spec.name == "Globex" {
            return Err(TaskError::Timeout(Duration::from_millis(delay)));
        }
        Ok(Value::String(format!("Profile of {}", spec.name)))
    }
}

fn pipeline(unit: Arc<dyn TaskUnit>) -> Vec<Stage> {
    let compile = Task::new(
        TaskSpec::new("compile", "report"),
        Arc::new(
            ReportCompiler::new("research", "Competitor Report")
                .with_subject("competitors")
                .with_empty_message("No competitors found to research."),
        ),
    );
    vec![
        Stage::fan_out(
            "research",
            "entities",
            Arc::new(EntityPlanner::new(3)),
            unit,
            JoinPolicy::BestEffort,
        ),
        Stage::sequential("compile", vec![compile.into()]),
    ]
}

#[tokio::test]
async fn merge_order_follows_spawn_order_not_completion_order() -> TestResult {
    init_tracing();
    let unit = Arc::new(ReverseDelayUnit {
        finished: std::sync::Mutex::new(Vec::new()),
    });
    let ctx = SessionContext::new().with_value(
        "entities",
        json!([{"name": "Acme"}, {"name": "Globex"}, {"name": "Initech"}]),
    );

    let outcome = with_timeout(fast_executor().run(pipeline(unit.clone()), ctx)).await;

    assert!(outcome.is_completed());
    assert_eq!(
        *unit.finished.lock().unwrap(),
        vec!["Initech", "Globex", "Acme"]
    );

    let manifest = outcome.context.manifest("research").ok_or("missing manifest")?;
    assert_eq!(manifest.outcome, StageOutcome::Partial);
    let keys: Vec<_> = manifest.entries.iter().map(|e| e.output_key.as_str()).collect();
    assert_eq!(keys, vec!["result_0", "result_1", "result_2"]);

    let report = outcome.context.get_str("report").ok_or("missing report")?;
    let acme = report.find("## Acme").ok_or("no Acme section")?;
    let globex = report.find("## Globex").ok_or("no Globex section")?;
    let initech = report.find("## Initech").ok_or("no Initech section")?;
    assert!(acme < globex && globex < initech);
    assert!(report.contains("Profile of Acme"));
    assert!(report.contains("_No report available (timeout)"));
    assert!(report.contains("Analyzed 3 key competitors in parallel"));

    let tasks = &outcome.stage("research").ok_or("missing stage")?.tasks;
    let indices: Vec<_> = tasks.iter().map(|t| t.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    Ok(())
}

#[tokio::test]
async fn empty_plan_is_a_no_op_with_marker() -> TestResult {
    init_tracing();
    let unit = Arc::new(ScriptedUnit::new());
    let ctx = SessionContext::new().with_value("entities", json!([{"title": "no name"}]));

    let outcome = with_timeout(fast_executor().run(pipeline(unit.clone()), ctx)).await;

    assert!(outcome.is_completed());
    assert!(unit.finished().is_empty());
    let manifest = outcome.context.manifest("research").ok_or("missing manifest")?;
    assert!(manifest.is_nothing_to_do());
    assert_eq!(
        outcome.stage("research").map(|s| s.outcome),
        Some(StageOutcome::NothingToDo)
    );
    assert_eq!(
        outcome.context.get_str("report"),
        Some("No competitors found to research.")
    );
    Ok(())
}

#[tokio::test]
async fn width_is_capped_at_three() -> TestResult {
    init_tracing();
    let unit = Arc::new(ScriptedUnit::new());
    let ctx = SessionContext::new().with_value(
        "entities",
        json!({"competitors": [
            {"name": "C"}, {"name": "A", "priority": true}, {"name": "D"},
            {"name": "B", "priority": true}, {"name": "E"}
        ]}),
    );

    let outcome = with_timeout(fast_executor().run(pipeline(unit.clone()), ctx)).await;

    assert!(outcome.is_completed());
    let names: Vec<_> = outcome
        .stage("research")
        .ok_or("missing stage")?
        .tasks
        .iter()
        .map(|t| t.name.clone())
        .collect();
    assert_eq!(names, vec!["A", "B", "C"]);
    assert!(!outcome.context.contains("result_3"));
    Ok(())
}

#[tokio::test]
async fn timed_out_last_task_becomes_a_placeholder_in_place() -> TestResult {
    init_tracing();
    let unit = Arc::new(ScriptedUnit::new());
    let unit_dyn: Arc<dyn TaskUnit> = unit.clone();

    let task = |name: &str, key: &str, delay_ms: u64| {
        Task::new(
            TaskSpec::new(name, key)
                .with_input(json!({"delay_ms": delay_ms, "value": format!("Profile of {name}")})),
            unit_dyn.clone(),
        )
    };
    let stalled = Task::new(
        TaskSpec::new("Initech", "result_2")
            .with_input(ScriptedUnit::input(2_000))
            .with_timeout(Duration::from_millis(50)),
        unit_dyn.clone(),
    );
    let compile = Task::new(
        TaskSpec::new("compile", "report"),
        Arc::new(ReportCompiler::new("research", "Competitor Report").with_subject("competitors")),
    );
    let stages = vec![
        Stage::parallel(
            "research",
            vec![task("Acme", "result_0", 20), task("Globex", "result_1", 0), stalled],
            JoinPolicy::BestEffort,
        ),
        Stage::sequential("compile", vec![compile.into()]),
    ];

    let outcome = with_timeout(fast_executor().run(stages, SessionContext::new())).await;

    assert!(outcome.is_completed());
    let research = outcome.stage("research").ok_or("missing stage")?;
    assert_eq!(research.outcome, StageOutcome::Partial);
    assert_eq!(
        research.tasks[2].result.failure_kind(),
        Some(diligence::types::FailureKind::Timeout)
    );

    let report = outcome.context.get_str("report").ok_or("missing report")?;
    assert!(report.contains("2 of 3 reports available"));
    let acme = report.find("## Acme\n\nProfile of Acme").ok_or("no Acme section")?;
    let globex = report.find("## Globex\n\nProfile of Globex").ok_or("no Globex section")?;
    let initech = report
        .find("## Initech\n\n_No report available (timeout)")
        .ok_or("no Initech placeholder")?;
    assert!(acme < globex && globex < initech);
    Ok(())
}
