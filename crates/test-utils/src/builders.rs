use std::time::Duration;

use diligence::config::{CommandConfig, ConfigFile, RawConfigFile};
use diligence::errors::Result;
use diligence::pipeline::{ExecutorOptions, PipelineExecutor, RetryPolicy};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the defaults with `cat` as the generation command.
pub struct ConfigBuilder {
    raw: RawConfigFile,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut raw = RawConfigFile::default();
        raw.collaborators.generate = Some(CommandConfig::new("cat"));
        Self { raw }
    }

    pub fn with_max_width(mut self, width: usize) -> Self {
        self.raw.pipeline.max_width = width;
        self
    }

    pub fn with_task_timeout(mut self, timeout: &str) -> Self {
        self.raw.pipeline.task_timeout = timeout.to_string();
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: &str) -> Self {
        self.raw.pipeline.max_retries = max_retries;
        self.raw.pipeline.retry_base_delay = base_delay.to_string();
        self
    }

    pub fn with_max_followups(mut self, max: usize) -> Self {
        self.raw.interview.max_followups = max;
        self
    }

    pub fn with_question_bounds(mut self, min: usize, max: usize) -> Self {
        self.raw.interview.min_questions = min;
        self.raw.interview.max_questions = max;
        self
    }

    pub fn with_search(mut self, cmd: &str) -> Self {
        self.raw.collaborators.search = Some(CommandConfig::new(cmd));
        self
    }

    pub fn with_evaluate(mut self, cmd: &str) -> Self {
        self.raw.collaborators.evaluate = Some(CommandConfig::new(cmd));
        self
    }

    pub fn without_generate(mut self) -> Self {
        self.raw.collaborators.generate = None;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.raw
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.raw)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Executor tuned for tests: 2s task timeout, no retries, 50ms cancel grace.
pub fn fast_options() -> ExecutorOptions {
    ExecutorOptions {
        default_timeout: Some(Duration::from_secs(2)),
        retry: RetryPolicy::none(),
        cancel_grace: Duration::from_millis(50),
    }
}

pub fn fast_executor() -> PipelineExecutor {
    PipelineExecutor::new(fast_options())
}

pub fn questions(items: &[&str]) -> Vec<String> {
    items.iter().map(|q| q.to_string()).collect()
}
