//! Scripted collaborators and task units.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use diligence::collab::{
    AnswerEvaluator, CollaboratorError, Evaluation, Generation, SearchHit, SearchProvider,
    TextGenerator,
};
use diligence::context::SessionContext;
use diligence::interview::Turn;
use diligence::pipeline::{TaskError, TaskSpec, TaskUnit};
use diligence::types::FailureKind;

pub fn unavailable(service: &'static str) -> CollaboratorError {
    CollaboratorError::Unavailable {
        service,
        detail: "scripted outage".to_string(),
    }
}

type GenerateFn =
    dyn Fn(&str, Option<&Value>) -> Result<Generation, CollaboratorError> + Send + Sync;

/// Generator answering through a closure; records every prompt it sees.
pub struct FnGenerator {
    respond: Box<GenerateFn>,
    prompts: Mutex<Vec<String>>,
}

impl FnGenerator {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&str, Option<&Value>) -> Result<Generation, CollaboratorError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            respond: Box::new(respond),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for FnGenerator {
    async fn generate(
        &self,
        prompt: &str,
        schema: Option<&Value>,
    ) -> Result<Generation, CollaboratorError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.respond)(prompt, schema)
    }
}

/// Generator replaying a fixed queue of responses, then failing.
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<Generation, CollaboratorError>>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn then_text(self, text: &str) -> Self {
        self.push(Ok(Generation::Text(text.to_string())))
    }

    pub fn then_json(self, value: Value) -> Self {
        self.push(Ok(Generation::Structured(value)))
    }

    pub fn then_error(self, err: CollaboratorError) -> Self {
        self.push(Err(err))
    }

    fn push(self, response: Result<Generation, CollaboratorError>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _schema: Option<&Value>,
    ) -> Result<Generation, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unavailable("generator")))
    }
}

/// Search returning one canned hit per query; queries containing
/// `fail_on` fail instead.
#[derive(Default)]
pub struct StaticSearch {
    fail_on: Option<String>,
    queries: Mutex<Vec<String>>,
}

impl StaticSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(needle: &str) -> Self {
        Self {
            fail_on: Some(needle.to_string()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for StaticSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, CollaboratorError> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail_on.as_deref().is_some_and(|n| query.contains(n)) {
            return Err(unavailable("search"));
        }
        Ok(vec![SearchHit {
            title: format!("About {query}"),
            url: "https://example.test/hit".to_string(),
            snippet: "snippet".to_string(),
        }])
    }
}

/// Evaluator replaying verdicts; "advance" once the script runs out.
#[derive(Default)]
pub struct ScriptedEvaluator {
    verdicts: Mutex<VecDeque<Evaluation>>,
    calls: AtomicUsize,
}

impl ScriptedEvaluator {
    pub fn new(verdicts: Vec<Evaluation>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerEvaluator for ScriptedEvaluator {
    async fn evaluate(
        &self,
        _question: &str,
        _answer: &str,
        _transcript: &[Turn],
    ) -> Result<Evaluation, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.verdicts.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// Evaluator that always wants a follow-up.
#[derive(Default)]
pub struct AlwaysFollowup {
    calls: AtomicUsize,
}

impl AlwaysFollowup {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerEvaluator for AlwaysFollowup {
    async fn evaluate(
        &self,
        question: &str,
        _answer: &str,
        _transcript: &[Turn],
    ) -> Result<Evaluation, CollaboratorError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Evaluation {
            needs_followup: true,
            followup_prompt: Some(format!("Follow-up {n} on: {question}")),
        })
    }
}

/// Evaluator that errors, or hangs for `delay` when one is set.
pub struct FailingEvaluator {
    delay: Option<Duration>,
}

impl FailingEvaluator {
    pub fn unavailable() -> Self {
        Self { delay: None }
    }

    pub fn hanging(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }
}

#[async_trait]
impl AnswerEvaluator for FailingEvaluator {
    async fn evaluate(
        &self,
        _question: &str,
        _answer: &str,
        _transcript: &[Turn],
    ) -> Result<Evaluation, CollaboratorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
            return Ok(Evaluation {
                needs_followup: true,
                followup_prompt: Some("too late".to_string()),
            });
        }
        Err(unavailable("evaluator"))
    }
}

fn parse_kind(kind: &str) -> FailureKind {
    match kind {
        "timeout" => FailureKind::Timeout,
        "unavailable" => FailureKind::CollaboratorUnavailable,
        "malformed" => FailureKind::MalformedInput,
        _ => FailureKind::TaskFailure,
    }
}

fn error_for(kind: FailureKind, name: &str) -> TaskError {
    match kind {
        FailureKind::Timeout => TaskError::Timeout(Duration::from_millis(1)),
        FailureKind::CollaboratorUnavailable => TaskError::Collaborator(unavailable("scripted")),
        FailureKind::MalformedInput => TaskError::MalformedInput(format!("{name}: bad input")),
        _ => TaskError::Failed(format!("{name} failed")),
    }
}

/// Unit driven entirely by its spec's input:
///
/// - `delay_ms`: sleep before finishing (default 0)
/// - `fail`: `"timeout" | "unavailable" | "malformed" | "failure"`
/// - `value`: success value (default: the task name)
///
/// Every finished run is appended to `finished` in completion order.
#[derive(Default)]
pub struct ScriptedUnit {
    finished: Mutex<Vec<String>>,
}

impl ScriptedUnit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }

    pub fn input(delay_ms: u64) -> Value {
        json!({ "delay_ms": delay_ms })
    }

    pub fn failing_input(delay_ms: u64, kind: &str) -> Value {
        json!({ "delay_ms": delay_ms, "fail": kind })
    }
}

#[async_trait]
impl TaskUnit for ScriptedUnit {
    async fn run(&self, spec: &TaskSpec, _ctx: &SessionContext) -> Result<Value, TaskError> {
        let delay = spec.input.get("delay_ms").and_then(Value::as_u64).unwrap_or(0);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.finished.lock().unwrap().push(spec.name.clone());

        if let Some(kind) = spec.input.get("fail").and_then(Value::as_str) {
            return Err(error_for(parse_kind(kind), &spec.name));
        }
        Ok(spec
            .input
            .get("value")
            .cloned()
            .unwrap_or_else(|| Value::String(spec.name.clone())))
    }
}

/// Fails with `kind` for the first `failures` attempts, then succeeds.
pub struct FlakyUnit {
    failures: usize,
    kind: FailureKind,
    attempts: AtomicUsize,
}

impl FlakyUnit {
    pub fn new(failures: usize, kind: FailureKind) -> Self {
        Self {
            failures,
            kind,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskUnit for FlakyUnit {
    async fn run(&self, spec: &TaskSpec, _ctx: &SessionContext) -> Result<Value, TaskError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(error_for(self.kind, &spec.name));
        }
        Ok(json!({ "attempt": attempt + 1 }))
    }
}

/// Reads a context key and returns it, failing with `MalformedInput` when
/// absent. Handy for checking what a stage could see.
pub struct ReadKeyUnit {
    key: String,
}

impl ReadKeyUnit {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl TaskUnit for ReadKeyUnit {
    async fn run(&self, _spec: &TaskSpec, ctx: &SessionContext) -> Result<Value, TaskError> {
        ctx.get(&self.key)
            .cloned()
            .ok_or_else(|| TaskError::MalformedInput(format!("missing '{}'", self.key)))
    }
}

/// Unit that panics.
pub struct PanickingUnit;

#[async_trait]
impl TaskUnit for PanickingUnit {
    async fn run(&self, _spec: &TaskSpec, _ctx: &SessionContext) -> Result<Value, TaskError> {
        panic!("scripted panic");
    }
}
