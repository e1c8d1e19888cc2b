// src/analysis/questions.rs

//! Investor question generation: the pipeline that seeds an interview.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::collab::{Generation, TextGenerator};
use crate::config::InterviewSettings;
use crate::context::SessionContext;
use crate::pipeline::{Stage, Task, TaskError, TaskSpec, TaskUnit};

pub const STARTUP_CONTEXT_KEY: &str = "startup_context";
pub const INVESTOR_CONTEXT_KEY: &str = "investor_context";
pub const QUESTIONS_KEY: &str = "interview_questions";

/// Context seeded for a question generation run.
pub fn question_context(startup_context: &str, investor_context: Option<&str>) -> SessionContext {
    let mut ctx = SessionContext::new().with_value(STARTUP_CONTEXT_KEY, startup_context);
    if let Some(investor) = investor_context.filter(|s| !s.trim().is_empty()) {
        ctx.insert(INVESTOR_CONTEXT_KEY, investor);
    }
    ctx
}

fn question_text(item: &Value) -> Option<String> {
    let text = match item {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("question")?.as_str()?,
        _ => return None,
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn parse_numbered(text: &str) -> Vec<String> {
    let re = match Regex::new(r"^\s*\d+\s*[.)]\s+(.+?)\s*$") {
        Ok(re) => re,
        Err(e) => {
            warn!(error = %e, "invalid question list pattern");
            return Vec::new();
        }
    };

    text.lines()
        .filter_map(|line| re.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim_matches('*').trim().to_string())
        .filter(|q| !q.is_empty())
        .collect()
}

/// Extract questions from whatever shape the generator returned.
///
/// Accepts `{"questions": [{"question": ..}]}`, a JSON array of strings or
/// objects, JSON inside text, or a numbered list (`1. ...`, `2) ...`).
/// Blank entries are dropped.
pub fn parse_questions(output: &Value) -> Vec<String> {
    match output {
        Value::Object(map) => map
            .get("questions")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(question_text).collect())
            .unwrap_or_default(),
        Value::Array(items) => items.iter().filter_map(question_text).collect(),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => parse_questions(&parsed),
            _ => parse_numbered(text),
        },
        _ => Vec::new(),
    }
}

fn questions_schema(min: usize, max: usize) -> Value {
    json!({
        "type": "object",
        "properties": {
            "questions": {
                "type": "array",
                "minItems": min,
                "maxItems": max,
                "items": {
                    "type": "object",
                    "properties": {"question": {"type": "string"}},
                    "required": ["question"]
                }
            }
        },
        "required": ["questions"]
    })
}

/// Generates the interview's question list.
pub struct QuestionTask {
    generator: Arc<dyn TextGenerator>,
    min_questions: usize,
    max_questions: usize,
}

impl QuestionTask {
    pub fn new(generator: Arc<dyn TextGenerator>, settings: &InterviewSettings) -> Self {
        Self {
            generator,
            min_questions: settings.min_questions,
            max_questions: settings.max_questions,
        }
    }

    fn prompt(&self, startup: &str, investor: Option<&str>) -> String {
        let mut prompt = format!(
            "You are an experienced venture investor preparing for a founder meeting.\n\
             Write {}-{} sharp questions, one or two sentences each, that probe execution, \
             hidden assumptions and risks not answered by the material below.\n\n\
             STARTUP:\n{startup}\n",
            self.min_questions, self.max_questions
        );
        if let Some(investor) = investor {
            prompt.push_str(&format!("\nINVESTOR PROFILE:\n{investor}\n"));
        }
        prompt
    }
}

#[async_trait]
impl TaskUnit for QuestionTask {
    async fn run(&self, _spec: &TaskSpec, ctx: &SessionContext) -> Result<Value, TaskError> {
        let startup = ctx
            .get_str(STARTUP_CONTEXT_KEY)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                TaskError::MalformedInput(format!("'{STARTUP_CONTEXT_KEY}' is missing or empty"))
            })?;
        let investor = ctx.get_str(INVESTOR_CONTEXT_KEY);

        let schema = questions_schema(self.min_questions, self.max_questions);
        let output = match self
            .generator
            .generate(&self.prompt(startup, investor), Some(&schema))
            .await?
        {
            Generation::Structured(value) => value,
            Generation::Text(text) => Value::String(text),
        };

        let mut questions = parse_questions(&output);
        debug!(parsed = questions.len(), "questions parsed");

        if questions.is_empty() {
            return Err(TaskError::Failed("generator produced no questions".into()));
        }
        if questions.len() > self.max_questions {
            debug!(
                parsed = questions.len(),
                max = self.max_questions,
                "dropping questions beyond the maximum"
            );
            questions.truncate(self.max_questions);
        }
        if questions.len() < self.min_questions {
            warn!(
                count = questions.len(),
                min = self.min_questions,
                "fewer questions than requested"
            );
        }

        info!(count = questions.len(), "interview questions generated");
        Ok(json!(questions))
    }
}

pub fn build_question_pipeline(
    generator: Arc<dyn TextGenerator>,
    settings: &InterviewSettings,
) -> Vec<Stage> {
    let task = Task::new(
        TaskSpec::new("generate_questions", QUESTIONS_KEY),
        Arc::new(QuestionTask::new(generator, settings)),
    );
    vec![Stage::sequential("questions", vec![task.into()])]
}
