// src/collab/mod.rs

//! External collaborators.
//!
//! Everything the orchestration core does not own (model-generated text,
//! web search, answer evaluation) sits behind one narrow trait each. The
//! pipeline and the interview only ever see these traits, so tests can swap
//! in scripted fakes while production uses the command-backed
//! implementations in [`command`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::CollaboratorsSection;
use crate::errors::{DiligenceError, Result};
use crate::interview::Turn;

pub mod command;

pub use command::{CommandEvaluator, CommandGenerator, CommandSearch};

/// Failure of a collaborator call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The collaborator could not be reached, crashed or refused the call.
    #[error("{service} unavailable: {detail}")]
    Unavailable { service: &'static str, detail: String },

    /// The collaborator answered, but not in a shape we can use.
    #[error("{service} returned malformed output: {detail}")]
    Malformed { service: &'static str, detail: String },
}

/// Output of a generation call.
#[derive(Debug, Clone, PartialEq)]
pub enum Generation {
    Text(String),
    Structured(Value),
}

impl Generation {
    pub fn into_value(self) -> Value {
        match self {
            Generation::Text(text) => Value::String(text),
            Generation::Structured(value) => value,
        }
    }

    /// Text form: the raw text, or the compact JSON of a structured result.
    pub fn into_text(self) -> String {
        match self {
            Generation::Text(text) => text,
            Generation::Structured(Value::String(text)) => text,
            Generation::Structured(value) => value.to_string(),
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// Verdict on a single interview answer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Evaluation {
    pub needs_followup: bool,
    #[serde(default)]
    pub followup_prompt: Option<String>,
}

/// Produces model text, optionally constrained to an output schema.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        schema: Option<&Value>,
    ) -> std::result::Result<Generation, CollaboratorError>;
}

/// Web search. An empty hit list is a valid answer.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> std::result::Result<Vec<SearchHit>, CollaboratorError>;
}

/// Decides whether an interview answer deserves a follow-up.
#[async_trait]
pub trait AnswerEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        question: &str,
        answer: &str,
        transcript: &[Turn],
    ) -> std::result::Result<Evaluation, CollaboratorError>;
}

/// The set of collaborators a pipeline or interview is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn TextGenerator>,
    pub search: Option<Arc<dyn SearchProvider>>,
    pub evaluator: Option<Arc<dyn AnswerEvaluator>>,
}

impl Collaborators {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            search: None,
            evaluator: None,
        }
    }

    pub fn with_search(mut self, search: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn AnswerEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Build command-backed collaborators from a validated config section.
    pub fn from_config(section: &CollaboratorsSection) -> Result<Self> {
        let generate = section.generate.as_ref().ok_or_else(|| {
            DiligenceError::ConfigError("no [collaborators.generate] configured".to_string())
        })?;

        let mut collaborators = Self::new(Arc::new(CommandGenerator::new(generate.clone())));
        if let Some(search) = &section.search {
            collaborators = collaborators.with_search(Arc::new(CommandSearch::new(search.clone())));
        }
        if let Some(evaluate) = &section.evaluate {
            collaborators =
                collaborators.with_evaluator(Arc::new(CommandEvaluator::new(evaluate.clone())));
        }
        Ok(collaborators)
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("search", &self.search.is_some())
            .field("evaluator", &self.evaluator.is_some())
            .finish_non_exhaustive()
    }
}
