// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [pipeline]
/// max_width = 3
/// task_timeout = "300s"
///
/// [interview]
/// max_followups = 3
///
/// [collaborators.generate]
/// cmd = "my-llm --json"
/// ```
///
/// Everything except `[collaborators.generate]` has a default.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub interview: InterviewSection,

    #[serde(default)]
    pub collaborators: CollaboratorsSection,
}

/// `[pipeline]` section, durations still in their textual form.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    /// Maximum number of parallel tasks a fan-out stage may spawn.
    #[serde(default = "default_max_width")]
    pub max_width: usize,

    /// Default per-task timeout (e.g. `"300s"`).
    #[serde(default = "default_task_timeout")]
    pub task_timeout: String,

    /// Extra attempts for tasks failing with a timeout or an unavailable
    /// collaborator.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff base; attempt `n` waits `retry_base_delay * 2^n`.
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay: String,

    /// How long an all-or-fail stage waits for cancelled siblings.
    #[serde(default = "default_cancel_grace")]
    pub cancel_grace: String,
}

fn default_max_width() -> usize {
    3
}

fn default_task_timeout() -> String {
    "300s".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay() -> String {
    "1s".to_string()
}

fn default_cancel_grace() -> String {
    "2s".to_string()
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            task_timeout: default_task_timeout(),
            max_retries: default_max_retries(),
            retry_base_delay: default_retry_base_delay(),
            cancel_grace: default_cancel_grace(),
        }
    }
}

/// `[interview]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct InterviewSection {
    /// Hard ceiling on follow-ups asked for a single question.
    #[serde(default = "default_max_followups")]
    pub max_followups: usize,

    #[serde(default = "default_min_questions")]
    pub min_questions: usize,

    #[serde(default = "default_max_questions")]
    pub max_questions: usize,

    /// Upper bound on a single evaluator call.
    #[serde(default = "default_evaluation_timeout")]
    pub evaluation_timeout: String,
}

fn default_max_followups() -> usize {
    3
}

fn default_min_questions() -> usize {
    5
}

fn default_max_questions() -> usize {
    7
}

fn default_evaluation_timeout() -> String {
    "30s".to_string()
}

impl Default for InterviewSection {
    fn default() -> Self {
        Self {
            max_followups: default_max_followups(),
            min_questions: default_min_questions(),
            max_questions: default_max_questions(),
            evaluation_timeout: default_evaluation_timeout(),
        }
    }
}

/// `[collaborators.*]` sections.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CollaboratorsSection {
    /// Text generation command (required once validated).
    #[serde(default)]
    pub generate: Option<CommandConfig>,

    /// Web search command; research tasks generate from the name alone
    /// when absent.
    #[serde(default)]
    pub search: Option<CommandConfig>,

    /// Answer evaluation command; without it the interview never asks
    /// follow-ups.
    #[serde(default)]
    pub evaluate: Option<CommandConfig>,
}

/// An external command used as a collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    /// Shell command line, run through `sh -c`.
    pub cmd: String,

    /// Extra environment variables for the command.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl CommandConfig {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            env: BTreeMap::new(),
        }
    }
}

/// Resolved `[pipeline]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub max_width: usize,
    pub task_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub cancel_grace: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            task_timeout: Duration::from_secs(300),
            max_retries: default_max_retries(),
            retry_base_delay: Duration::from_secs(1),
            cancel_grace: Duration::from_secs(2),
        }
    }
}

/// Resolved `[interview]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterviewSettings {
    pub max_followups: usize,
    pub min_questions: usize,
    pub max_questions: usize,
    pub evaluation_timeout: Duration,
}

impl Default for InterviewSettings {
    fn default() -> Self {
        Self {
            max_followups: default_max_followups(),
            min_questions: default_min_questions(),
            max_questions: default_max_questions(),
            evaluation_timeout: Duration::from_secs(30),
        }
    }
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>` (see `validate.rs`), so
/// holders can rely on every invariant having been checked.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub pipeline: PipelineSettings,
    pub interview: InterviewSettings,
    pub collaborators: CollaboratorsSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        pipeline: PipelineSettings,
        interview: InterviewSettings,
        collaborators: CollaboratorsSection,
    ) -> Self {
        Self {
            pipeline,
            interview,
            collaborators,
        }
    }

    /// The generation command. Always present after validation.
    pub fn generate_command(&self) -> Option<&CommandConfig> {
        self.collaborators.generate.as_ref()
    }
}
