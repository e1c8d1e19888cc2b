// src/interview/session.rs

//! Session service: the async shell around the pure interview machine.
//!
//! Holds live interviews by id, runs the question generation pipeline on
//! `start`, and consults the evaluator between turns. Turns for one session
//! must be serialized by the caller.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analysis::questions::{QUESTIONS_KEY, build_question_pipeline, question_context};
use crate::collab::{Collaborators, Evaluation};
use crate::config::{ConfigFile, InterviewSettings};
use crate::errors::{DiligenceError, Result};
use crate::interview::machine::{advance, needs_evaluation};
use crate::interview::state::{InterviewState, Turn};
use crate::pipeline::PipelineExecutor;

/// What a caller provides to open an interview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedInput {
    pub startup_context: String,
    #[serde(default)]
    pub investor_context: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewStatus {
    InProgress,
    Completed,
}

/// Returned by every `start` / `respond` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterviewReply {
    pub session_id: Uuid,
    pub prompt: String,
    pub status: InterviewStatus,
    pub remaining: usize,
    pub current_question: Option<String>,
    pub history: Vec<Turn>,
}

impl InterviewReply {
    fn new(session_id: Uuid, state: &InterviewState, prompt: String) -> Self {
        let status = if state.is_complete() {
            InterviewStatus::Completed
        } else {
            InterviewStatus::InProgress
        };
        Self {
            session_id,
            prompt,
            status,
            remaining: state.remaining(),
            current_question: state.current_question().map(str::to_string),
            history: state.transcript().to_vec(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == InterviewStatus::Completed
    }
}

/// Owns every open interview session.
///
/// Completed sessions stay in memory so later `respond` calls keep getting
/// the same terminal reply. Callers release them with [`end`], or sweep all
/// finished ones at once with [`prune_completed`].
///
/// [`end`]: InterviewService::end
/// [`prune_completed`]: InterviewService::prune_completed
pub struct InterviewService {
    collaborators: Collaborators,
    executor: PipelineExecutor,
    settings: InterviewSettings,
    sessions: Mutex<HashMap<Uuid, InterviewState>>,
}

impl InterviewService {
    pub fn new(
        collaborators: Collaborators,
        executor: PipelineExecutor,
        settings: InterviewSettings,
    ) -> Self {
        Self {
            collaborators,
            executor,
            settings,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Command-backed service from a validated config.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        Ok(Self::new(
            Collaborators::from_config(&cfg.collaborators)?,
            PipelineExecutor::from_settings(&cfg.pipeline),
            cfg.interview.clone(),
        ))
    }

    /// Generate questions for `seed`, open a session and ask the first one.
    pub async fn start(&self, seed: SeedInput) -> Result<InterviewReply> {
        let stages = build_question_pipeline(Arc::clone(&self.collaborators.generator), &self.settings);
        let ctx = question_context(&seed.startup_context, seed.investor_context.as_deref());

        let ctx = self.executor.run(stages, ctx).await.into_result()?;
        let questions: Vec<String> = ctx.get_as(QUESTIONS_KEY)?.unwrap_or_default();

        self.start_with_questions(questions, seed.startup_context).await
    }

    /// Open a session over an already generated question list.
    pub async fn start_with_questions(
        &self,
        questions: Vec<String>,
        background: impl Into<String>,
    ) -> Result<InterviewReply> {
        let id = Uuid::new_v4();
        let state = InterviewState::new(questions, background, self.settings.max_followups);
        let (state, prompt) = advance(state, None, None);

        info!(session = %id, questions = state.total(), "interview started");
        let reply = InterviewReply::new(id, &state, prompt);
        self.sessions.lock().await.insert(id, state);
        Ok(reply)
    }

    /// Feed one user turn (or `None` to hear the current prompt again).
    pub async fn respond(&self, session_id: Uuid, input: Option<&str>) -> Result<InterviewReply> {
        let state = self.snapshot(session_id).await?;

        let evaluation = if needs_evaluation(&state, input) {
            self.evaluate(session_id, &state, input.unwrap_or_default()).await
        } else {
            None
        };

        let (next, prompt) = advance(state, input, evaluation.as_ref());
        let reply = InterviewReply::new(session_id, &next, prompt);

        let mut sessions = self.sessions.lock().await;
        let slot = sessions
            .get_mut(&session_id)
            .ok_or_else(|| DiligenceError::SessionNotFound(session_id.to_string()))?;
        *slot = next;

        if reply.is_complete() {
            debug!(session = %session_id, "interview complete");
        }
        Ok(reply)
    }

    /// Transcript so far.
    pub async fn history(&self, session_id: Uuid) -> Result<Vec<Turn>> {
        Ok(self.snapshot(session_id).await?.transcript().to_vec())
    }

    /// Copy of the full session state.
    pub async fn snapshot(&self, session_id: Uuid) -> Result<InterviewState> {
        self.sessions
            .lock()
            .await
            .get(&session_id)
            .cloned()
            .ok_or_else(|| DiligenceError::SessionNotFound(session_id.to_string()))
    }

    /// Drop a session and everything it holds.
    pub async fn end(&self, session_id: Uuid) -> Result<()> {
        match self.sessions.lock().await.remove(&session_id) {
            Some(_) => {
                info!(session = %session_id, "interview session ended");
                Ok(())
            }
            None => Err(DiligenceError::SessionNotFound(session_id.to_string())),
        }
    }

    /// Drop every completed session; returns how many were removed.
    pub async fn prune_completed(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, state| !state.is_complete());
        let pruned = before - sessions.len();
        if pruned > 0 {
            info!(pruned, open = sessions.len(), "pruned completed interview sessions");
        }
        pruned
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Ask the evaluator about `answer`. Any failure means "no follow-up".
    async fn evaluate(
        &self,
        session_id: Uuid,
        state: &InterviewState,
        answer: &str,
    ) -> Option<Evaluation> {
        let evaluator = self.collaborators.evaluator.as_ref()?;
        let question = state.current_question()?;
        let limit = self.settings.evaluation_timeout;

        match tokio::time::timeout(limit, evaluator.evaluate(question, answer.trim(), state.transcript()))
            .await
        {
            Ok(Ok(evaluation)) => Some(evaluation),
            Ok(Err(e)) => {
                warn!(session = %session_id, error = %e, "evaluator failed; moving on");
                None
            }
            Err(_) => {
                warn!(
                    session = %session_id,
                    timeout_ms = limit.as_millis() as u64,
                    "evaluator timed out; moving on"
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for InterviewService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterviewService")
            .field("collaborators", &self.collaborators)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
