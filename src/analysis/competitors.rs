// src/analysis/competitors.rs

//! Competitor research: identify, research each in parallel, compile.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::collab::{Collaborators, SearchHit, SearchProvider, TextGenerator};
use crate::config::PipelineSettings;
use crate::context::SessionContext;
use crate::pipeline::{
    Entity, EntityPlanner, ReportCompiler, Stage, Task, TaskError, TaskSpec, TaskUnit,
};
use crate::types::JoinPolicy;

/// Startup description supplied by the caller.
pub const STARTUP_INFO_KEY: &str = "startup_info";
/// Competitor names the caller wants researched first.
pub const EXPLICIT_COMPETITORS_KEY: &str = "explicit_competitors";
/// Output of the identification step.
pub const IDENTIFICATION_KEY: &str = "competitor_identification";
/// Compiled report.
pub const REPORT_KEY: &str = "final_competitive_analysis";

pub const RESEARCH_STAGE: &str = "competitor_research";
pub const RESEARCH_KEY_PREFIX: &str = "research_result";
pub const NO_COMPETITORS: &str = "No competitors found to research.";

/// Search topics issued for every competitor, as (label, query suffix).
pub const RESEARCH_TOPICS: [(&str, &str); 5] = [
    ("Founders & Leadership", "founders CEO leadership background"),
    ("Company Basics", "founded year headquarters company size employees"),
    ("Business Model", "business model revenue pricing monetization"),
    ("Product & Performance", "product features customers reviews metrics"),
    ("Funding", "funding rounds investors raised valuation"),
];

/// What the identification step leaves in the context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorList {
    pub competitors: Vec<Entity>,
}

/// Context seeded for a research run.
pub fn research_context(startup_info: &str, explicit: &[String]) -> SessionContext {
    let mut ctx = SessionContext::new().with_value(STARTUP_INFO_KEY, startup_info);
    if !explicit.is_empty() {
        ctx.insert(EXPLICIT_COMPETITORS_KEY, json!(explicit));
    }
    ctx
}

/// Caller-supplied names first (as priority entries), then discovered ones;
/// duplicates are matched case-insensitively and keep the discovered info.
pub fn merge_competitors(explicit: &[String], discovered: Vec<Entity>) -> Vec<Entity> {
    let mut merged: Vec<Entity> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for name in explicit {
        let name = name.trim();
        if name.is_empty() || !seen.insert(name.to_lowercase()) {
            continue;
        }
        merged.push(Entity::new(name).prioritized());
    }

    for entity in discovered {
        let folded = entity.name.to_lowercase();
        if seen.insert(folded.clone()) {
            merged.push(entity);
            continue;
        }
        if let Some(existing) = merged
            .iter_mut()
            .find(|e| e.name.to_lowercase() == folded)
            .filter(|e| e.additional_info.is_empty())
        {
            existing.additional_info = entity.additional_info;
        }
    }

    merged
}

fn identification_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "competitors": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "additional_info": {"type": "string"}
                    },
                    "required": ["name"]
                }
            }
        },
        "required": ["competitors"]
    })
}

/// Asks the generator for the startup's most relevant competitors.
pub struct IdentifyTask {
    generator: Arc<dyn TextGenerator>,
}

impl IdentifyTask {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    fn prompt(startup_info: &str, explicit: &[String]) -> String {
        let mut prompt = format!(
            "Identify the most relevant competitors of the startup described below.\n\
             Prefer competitors the description mentions by name.\n\
             Return a JSON object with a `competitors` list of {{name, additional_info}}.\n\n\
             STARTUP:\n{startup_info}\n"
        );
        if !explicit.is_empty() {
            prompt.push_str(&format!(
                "\nAlready known competitors: {}\n",
                explicit.join(", ")
            ));
        }
        prompt
    }
}

#[async_trait]
impl TaskUnit for IdentifyTask {
    async fn run(&self, _spec: &TaskSpec, ctx: &SessionContext) -> Result<Value, TaskError> {
        let startup_info = ctx
            .get_str(STARTUP_INFO_KEY)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                TaskError::MalformedInput(format!("'{STARTUP_INFO_KEY}' is missing or empty"))
            })?;

        let explicit: Vec<String> = ctx
            .get_as(EXPLICIT_COMPETITORS_KEY)
            .map_err(|e| {
                TaskError::MalformedInput(format!("'{EXPLICIT_COMPETITORS_KEY}': {e}"))
            })?
            .unwrap_or_default();

        let schema = identification_schema();
        let generated = self
            .generator
            .generate(&Self::prompt(startup_info, &explicit), Some(&schema))
            .await?
            .into_value();

        // Width is capped later by the planner; parse everything here.
        let discovered = EntityPlanner::new(usize::MAX).usable_entities(Some(&generated));
        let competitors = merge_competitors(&explicit, discovered);

        info!(
            explicit = explicit.len(),
            total = competitors.len(),
            "competitors identified"
        );

        serde_json::to_value(CompetitorList { competitors })
            .map_err(|e| TaskError::Failed(format!("encoding competitor list: {e}")))
    }
}

/// Researches one competitor: topic searches in parallel, then one
/// generated write-up.
pub struct ResearchTask {
    generator: Arc<dyn TextGenerator>,
    search: Option<Arc<dyn SearchProvider>>,
}

impl ResearchTask {
    pub fn new(generator: Arc<dyn TextGenerator>, search: Option<Arc<dyn SearchProvider>>) -> Self {
        Self { generator, search }
    }

    async fn gather(&self, name: &str) -> Vec<(&'static str, Vec<SearchHit>)> {
        let Some(search) = &self.search else {
            debug!(competitor = %name, "no search provider configured; skipping searches");
            return Vec::new();
        };

        let queries: Vec<String> = RESEARCH_TOPICS
            .iter()
            .map(|(_, suffix)| format!("{name} {suffix}"))
            .collect();
        let results = join_all(queries.iter().map(|q| search.search(q))).await;

        RESEARCH_TOPICS
            .iter()
            .zip(results)
            .map(|((label, _), result)| {
                let hits = result.unwrap_or_else(|e| {
                    warn!(competitor = %name, topic = label, error = %e, "search failed; continuing without it");
                    Vec::new()
                });
                (*label, hits)
            })
            .collect()
    }

    fn prompt(name: &str, info: &str, findings: &[(&str, Vec<SearchHit>)]) -> String {
        let mut prompt = format!(
            "Write a concise competitor profile for {name}.\n\
             Cover founders, company basics, business model, product, funding, and close \
             with a competitive assessment (threat level, strengths, weaknesses).\n\
             Start with a `## {name}` heading.\n"
        );
        if !info.is_empty() {
            prompt.push_str(&format!("\nKnown context: {info}\n"));
        }
        for (label, hits) in findings {
            prompt.push_str(&format!("\n### {label}\n"));
            if hits.is_empty() {
                prompt.push_str("(no results)\n");
            }
            for hit in hits {
                prompt.push_str(&format!("- {} <{}>: {}\n", hit.title, hit.url, hit.snippet));
            }
        }
        prompt
    }
}

#[async_trait]
impl TaskUnit for ResearchTask {
    async fn run(&self, spec: &TaskSpec, _ctx: &SessionContext) -> Result<Value, TaskError> {
        let name = spec
            .input
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TaskError::MalformedInput("research task without a name".into()))?;
        let info = spec
            .input
            .get("additional_info")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let findings = self.gather(name).await;
        let hits: usize = findings.iter().map(|(_, h)| h.len()).sum();
        debug!(competitor = %name, hits, "search findings gathered");

        let text = self
            .generator
            .generate(&Self::prompt(name, info, &findings), None)
            .await?
            .into_text();

        if text.trim().is_empty() {
            return Err(TaskError::Failed(format!("empty research report for {name}")));
        }
        Ok(Value::String(text))
    }
}

/// identify → research (best-effort fan-out) → compile.
pub fn build_competitor_pipeline(
    collaborators: &Collaborators,
    settings: &PipelineSettings,
) -> Vec<Stage> {
    let identify = Task::new(
        TaskSpec::new("identify_competitors", IDENTIFICATION_KEY),
        Arc::new(IdentifyTask::new(Arc::clone(&collaborators.generator))),
    );

    let planner = EntityPlanner::new(settings.max_width).with_key_prefix(RESEARCH_KEY_PREFIX);
    let research = ResearchTask::new(
        Arc::clone(&collaborators.generator),
        collaborators.search.clone(),
    );

    let compiler = ReportCompiler::new(RESEARCH_STAGE, "Comprehensive Competitor Analysis Report")
        .with_subject("competitors")
        .with_empty_message(NO_COMPETITORS);
    let compile = Task::new(TaskSpec::new("compile_report", REPORT_KEY), Arc::new(compiler));

    vec![
        Stage::sequential("identify", vec![identify.into()]),
        Stage::fan_out(
            RESEARCH_STAGE,
            IDENTIFICATION_KEY,
            Arc::new(planner),
            Arc::new(research),
            JoinPolicy::BestEffort,
        ),
        Stage::sequential("compile", vec![compile.into()]),
    ]
}
