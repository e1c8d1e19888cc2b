use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use diligence::collab::{Collaborators, Evaluation};
use diligence::config::InterviewSettings;
use diligence::errors::DiligenceError;
use diligence::interview::{
    CLOSING_PROMPT, InterviewService, InterviewStatus, SeedInput, Speaker,
};
use diligence::types::FailureKind;
use diligence_test_utils::builders::{fast_executor, questions};
use diligence_test_utils::fakes::{
    AlwaysFollowup, FailingEvaluator, ScriptedEvaluator, ScriptedGenerator,
};
use diligence_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn settings(max_followups: usize) -> InterviewSettings {
    InterviewSettings {
        max_followups,
        evaluation_timeout: Duration::from_millis(100),
        ..InterviewSettings::default()
    }
}

fn service(collaborators: Collaborators, max_followups: usize) -> InterviewService {
    InterviewService::new(collaborators, fast_executor(), settings(max_followups))
}

fn no_generator() -> Collaborators {
    Collaborators::new(Arc::new(ScriptedGenerator::new()))
}

#[tokio::test]
async fn walks_through_every_question_then_completes() -> TestResult {
    init_tracing();
    let svc = service(no_generator(), 3);

    let reply = svc
        .start_with_questions(questions(&["Q1", "Q2"]), "robots")
        .await?;
    assert_eq!(reply.prompt, "Q1");
    assert_eq!(reply.status, InterviewStatus::InProgress);
    assert_eq!(reply.remaining, 2);
    assert_eq!(reply.current_question.as_deref(), Some("Q1"));
    let id = reply.session_id;

    let reply = svc.respond(id, Some("answer one")).await?;
    assert_eq!(reply.prompt, "Q2");
    assert_eq!(reply.remaining, 1);

    let reply = svc.respond(id, Some("answer two")).await?;
    assert_eq!(reply.prompt, CLOSING_PROMPT);
    assert_eq!(reply.status, InterviewStatus::Completed);
    assert_eq!(reply.remaining, 0);
    assert_eq!(reply.current_question, None);

    let speakers: Vec<_> = reply.history.iter().map(|t| t.speaker).collect();
    assert_eq!(
        speakers,
        vec![
            Speaker::System,
            Speaker::User,
            Speaker::System,
            Speaker::User,
            Speaker::System
        ]
    );

    // Terminal reply is idempotent.
    let again = svc.respond(id, Some("one more thing")).await?;
    assert_eq!(again, reply);

    let state = svc.snapshot(id).await?;
    assert_eq!(state.answers()[0], vec!["answer one".to_string()]);
    Ok(())
}

#[tokio::test]
async fn always_followup_evaluator_is_capped_at_budget() -> TestResult {
    init_tracing();
    let evaluator = Arc::new(AlwaysFollowup::default());
    let svc = service(no_generator().with_evaluator(evaluator.clone()), 3);

    let id = svc
        .start_with_questions(questions(&["Q1", "Q2"]), "")
        .await?
        .session_id;

    for n in 1..=3 {
        let reply = svc.respond(id, Some("vague")).await?;
        assert_eq!(reply.prompt, format!("Follow-up {n} on: Q1"));
        assert_eq!(svc.snapshot(id).await?.followups(), n);
    }

    let reply = svc.respond(id, Some("still vague")).await?;
    assert_eq!(reply.prompt, "Q2");
    assert_eq!(svc.snapshot(id).await?.followups(), 0);
    // Budget exhausted: the fourth answer was never sent for evaluation.
    assert_eq!(evaluator.calls(), 3);

    let answers = svc.snapshot(id).await?.answers()[0].clone();
    assert_eq!(answers.len(), 4);
    Ok(())
}

#[tokio::test]
async fn scripted_verdicts_mix_followups_and_advances() -> TestResult {
    init_tracing();
    let evaluator = Arc::new(ScriptedEvaluator::new(vec![
        Evaluation {
            needs_followup: true,
            followup_prompt: Some("Which customers?".into()),
        },
        Evaluation::default(),
    ]));
    let svc = service(no_generator().with_evaluator(evaluator.clone()), 2);

    let id = svc
        .start_with_questions(questions(&["Q1", "Q2"]), "")
        .await?
        .session_id;

    assert_eq!(svc.respond(id, Some("some")).await?.prompt, "Which customers?");
    assert_eq!(svc.respond(id, Some("banks")).await?.prompt, "Q2");
    assert_eq!(evaluator.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn failing_or_slow_evaluator_degrades_to_advance() -> TestResult {
    init_tracing();
    for evaluator in [
        FailingEvaluator::unavailable(),
        FailingEvaluator::hanging(Duration::from_secs(2)),
    ] {
        let svc = service(no_generator().with_evaluator(Arc::new(evaluator)), 3);
        let id = svc
            .start_with_questions(questions(&["Q1", "Q2"]), "")
            .await?
            .session_id;

        let reply = with_timeout(svc.respond(id, Some("answer"))).await?;
        assert_eq!(reply.prompt, "Q2");
    }
    Ok(())
}

#[tokio::test]
async fn empty_input_repeats_prompt() -> TestResult {
    init_tracing();
    let svc = service(no_generator(), 3);
    let id = svc.start_with_questions(questions(&["Q1"]), "").await?.session_id;

    let before = svc.history(id).await?;
    let reply = svc.respond(id, None).await?;
    assert_eq!(reply.prompt, "Q1");
    assert_eq!(svc.history(id).await?, before);
    Ok(())
}

#[tokio::test]
async fn zero_questions_complete_on_start() -> TestResult {
    init_tracing();
    let svc = service(no_generator(), 3);
    let reply = svc.start_with_questions(Vec::new(), "").await?;

    assert_eq!(reply.status, InterviewStatus::Completed);
    assert_eq!(reply.prompt, CLOSING_PROMPT);
    assert_eq!(reply.remaining, 0);
    Ok(())
}

#[tokio::test]
async fn unknown_and_ended_sessions_are_not_found() -> TestResult {
    init_tracing();
    let svc = service(no_generator(), 3);

    let missing = svc.respond(Uuid::new_v4(), Some("hi")).await;
    assert!(matches!(missing, Err(DiligenceError::SessionNotFound(_))));

    let id = svc.start_with_questions(questions(&["Q1"]), "").await?.session_id;
    assert_eq!(svc.active_sessions().await, 1);
    svc.end(id).await?;
    assert_eq!(svc.active_sessions().await, 0);

    assert!(matches!(
        svc.history(id).await,
        Err(DiligenceError::SessionNotFound(_))
    ));
    assert!(matches!(svc.end(id).await, Err(DiligenceError::SessionNotFound(_))));
    Ok(())
}

#[tokio::test]
async fn start_generates_questions_through_the_pipeline() -> TestResult {
    init_tracing();
    let generator = ScriptedGenerator::new().then_json(json!({"questions": [
        {"question": "What is your retention?"},
        {"question": "Who are your first customers?"},
        {"question": "Why now?"},
        {"question": "What breaks at scale?"},
        {"question": "How do you price?"},
        {"question": "Who decides?"},
        {"question": "What keeps you up at night?"},
        {"question": "An eighth, dropped by the cap?"},
    ]}));
    let svc = service(Collaborators::new(Arc::new(generator)), 3);

    let reply = with_timeout(svc.start(SeedInput {
        startup_context: "We build delivery robots.".into(),
        investor_context: Some("Seed fund".into()),
    }))
    .await?;

    assert_eq!(reply.prompt, "What is your retention?");
    assert_eq!(reply.remaining, 7);

    let state = svc.snapshot(reply.session_id).await?;
    assert_eq!(state.background(), "We build delivery robots.");
    assert_eq!(state.total(), 7);
    Ok(())
}

#[tokio::test]
async fn start_fails_when_no_questions_can_be_generated() -> TestResult {
    init_tracing();
    let generator = ScriptedGenerator::new().then_text("I have no questions.");
    let svc = service(Collaborators::new(Arc::new(generator)), 3);

    let result = with_timeout(svc.start(SeedInput {
        startup_context: "robots".into(),
        investor_context: None,
    }))
    .await;

    assert!(matches!(
        result,
        Err(DiligenceError::PipelineAborted {
            kind: FailureKind::TaskFailure,
            ..
        })
    ));
    assert_eq!(svc.active_sessions().await, 0);
    Ok(())
}

#[tokio::test]
async fn finished_sessions_linger_until_pruned() -> TestResult {
    init_tracing();
    let svc = service(no_generator(), 3);

    let done = svc.start_with_questions(questions(&["Q1"]), "").await?.session_id;
    let open = svc.start_with_questions(questions(&["Q1", "Q2"]), "").await?.session_id;
    let finished = svc.respond(done, Some("answer")).await?;
    assert!(finished.is_complete());

    // Still there, so the terminal reply stays repeatable.
    assert_eq!(svc.respond(done, None).await?, finished);
    assert_eq!(svc.active_sessions().await, 2);

    assert_eq!(svc.prune_completed().await, 1);
    assert_eq!(svc.active_sessions().await, 1);
    assert!(matches!(
        svc.respond(done, None).await,
        Err(DiligenceError::SessionNotFound(_))
    ));
    assert_eq!(svc.respond(open, None).await?.prompt, "Q1");
    assert_eq!(svc.prune_completed().await, 0);
    Ok(())
}
