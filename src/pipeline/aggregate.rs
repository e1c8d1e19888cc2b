// src/pipeline/aggregate.rs

//! Synthesis: fold a Parallel stage's per-task results into one report.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::SessionContext;
use crate::pipeline::task::{TaskError, TaskResult, TaskSpec, TaskUnit};

/// One labelled slot of the report: a result, or nothing at all if the
/// key was never written.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub label: String,
    pub result: Option<TaskResult>,
}

impl Section {
    pub fn new(label: impl Into<String>, result: Option<TaskResult>) -> Self {
        Self {
            label: label.into(),
            result,
        }
    }
}

const DIVIDER: &str = "\n\n---\n\n";

fn body_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn render_section(section: &Section) -> String {
    let body = match &section.result {
        Some(TaskResult::Success(value)) => body_text(value),
        Some(TaskResult::Failure { kind, detail }) => {
            format!("_No report available ({kind}): {detail}_")
        }
        None => "_No result was recorded._".to_string(),
    };
    format!("## {}\n\n{}", section.label, body)
}

/// Build the report text.
///
/// Sections appear in the order given. Failed or missing entries get a
/// placeholder so one bad task never hides the others.
pub fn synthesize(title: &str, subject: &str, sections: &[Section]) -> String {
    let available = sections
        .iter()
        .filter(|s| matches!(s.result, Some(TaskResult::Success(_))))
        .count();

    let mut out = format!(
        "# {title}\n\n## Executive Summary\n\nAnalyzed {} key {subject} in parallel; {available} of {} reports available.",
        sections.len(),
        sections.len(),
    );

    for section in sections {
        out.push_str(DIVIDER);
        out.push_str(&render_section(section));
    }
    out
}

/// Task Unit compiling the results of a previous Parallel stage.
///
/// Reads the stage's manifest to find the output keys, so it works for any
/// width the planner chose.
#[derive(Debug, Clone)]
pub struct ReportCompiler {
    source_stage: String,
    title: String,
    subject: String,
    empty_message: String,
}

impl ReportCompiler {
    pub fn new(source_stage: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source_stage: source_stage.into(),
            title: title.into(),
            subject: "items".to_string(),
            empty_message: "Nothing to report.".to_string(),
        }
    }

    /// Plural noun used in the summary line ("competitors").
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Report produced when the source stage had nothing to do.
    pub fn with_empty_message(mut self, message: impl Into<String>) -> Self {
        self.empty_message = message.into();
        self
    }

    pub fn compile(&self, ctx: &SessionContext) -> Result<String, TaskError> {
        let manifest = ctx.manifest(&self.source_stage).ok_or_else(|| {
            TaskError::MalformedInput(format!(
                "no manifest for stage '{}'; did it run?",
                self.source_stage
            ))
        })?;

        if manifest.is_nothing_to_do() {
            debug!(stage = %self.source_stage, "source stage had nothing to do");
            return Ok(self.empty_message.clone());
        }

        let sections: Vec<Section> = manifest
            .entries
            .iter()
            .map(|entry| {
                let result = ctx.result(&entry.output_key);
                if result.is_none() {
                    warn!(key = %entry.output_key, "manifest entry has no recorded result");
                }
                Section::new(&entry.name, result)
            })
            .collect();

        Ok(synthesize(&self.title, &self.subject, &sections))
    }
}

#[async_trait]
impl TaskUnit for ReportCompiler {
    async fn run(&self, _spec: &TaskSpec, ctx: &SessionContext) -> Result<Value, TaskError> {
        self.compile(ctx).map(Value::String)
    }
}
