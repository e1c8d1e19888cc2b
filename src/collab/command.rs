// src/collab/command.rs

//! Collaborators backed by external commands.
//!
//! Each call spawns the configured command line through the platform shell,
//! writes the request to its stdin and reads the answer from stdout. The
//! child is spawned with `kill_on_drop(true)`, so when the executor times a
//! task out or cancels it (both drop the in-flight future) the process is
//! killed with it.

use std::process::Stdio;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::collab::{
    AnswerEvaluator, CollaboratorError, Evaluation, Generation, SearchHit, SearchProvider,
    TextGenerator,
};
use crate::config::CommandConfig;
use crate::interview::Turn;

/// Environment variable carrying the requested output schema, if any.
pub const SCHEMA_ENV: &str = "DILIGENCE_OUTPUT_SCHEMA";

/// Run `config.cmd` with `input` on stdin and return its stdout.
///
/// Spawn failures and non-zero exits are reported as `Unavailable`;
/// non-UTF-8 output as `Malformed`.
async fn run_command(
    service: &'static str,
    config: &CommandConfig,
    input: &str,
    extra_env: &[(&str, String)],
) -> Result<String, CollaboratorError> {
    let unavailable = |detail: String| CollaboratorError::Unavailable { service, detail };

    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&config.cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&config.cmd);
        c
    };

    cmd.envs(&config.env)
        .envs(extra_env.iter().map(|(k, v)| (*k, v.as_str())))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(service, cmd = %config.cmd, input_len = input.len(), "spawning collaborator");

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning {service} command '{}'", config.cmd))
        .map_err(|e| unavailable(format!("{e:#}")))?;

    let stdin = child.stdin.take();
    let payload = input.to_owned();
    let writer = async move {
        if let Some(mut stdin) = stdin {
            stdin.write_all(payload.as_bytes()).await?;
            stdin.shutdown().await?;
        }
        Ok::<(), std::io::Error>(())
    };

    // Feed stdin while collecting output so neither pipe can fill up and stall.
    let (write_res, output) = tokio::join!(writer, child.wait_with_output());

    if let Err(e) = write_res {
        // Commands that ignore stdin close it early; that's not an error.
        debug!(service, error = %e, "collaborator did not consume all of stdin");
    }

    let output = output
        .with_context(|| format!("waiting for {service} command '{}'", config.cmd))
        .map_err(|e| unavailable(format!("{e:#}")))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
        debug!(service, "stderr: {}", line);
    }

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        warn!(service, exit_code = code, "collaborator command failed");
        return Err(unavailable(format!(
            "command exited with status {code}: {}",
            stderr.trim()
        )));
    }

    String::from_utf8(output.stdout).map_err(|e| CollaboratorError::Malformed {
        service,
        detail: format!("stdout is not UTF-8: {e}"),
    })
}

fn parse_json<T: serde::de::DeserializeOwned>(
    service: &'static str,
    stdout: &str,
) -> Result<T, CollaboratorError> {
    serde_json::from_str(stdout.trim()).map_err(|e| CollaboratorError::Malformed {
        service,
        detail: e.to_string(),
    })
}

/// Text generation through an external command.
///
/// The prompt goes to stdin. When a schema is requested it is passed in
/// [`SCHEMA_ENV`] and stdout must be JSON.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    config: CommandConfig,
}

impl CommandGenerator {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TextGenerator for CommandGenerator {
    async fn generate(
        &self,
        prompt: &str,
        schema: Option<&Value>,
    ) -> Result<Generation, CollaboratorError> {
        const SERVICE: &str = "generator";

        match schema {
            Some(schema) => {
                let env = [(SCHEMA_ENV, schema.to_string())];
                let stdout = run_command(SERVICE, &self.config, prompt, &env).await?;
                parse_json(SERVICE, &stdout).map(Generation::Structured)
            }
            None => {
                let stdout = run_command(SERVICE, &self.config, prompt, &[]).await?;
                Ok(Generation::Text(stdout.trim().to_string()))
            }
        }
    }
}

/// Search through an external command: query on stdin, JSON array of hits
/// on stdout.
#[derive(Debug, Clone)]
pub struct CommandSearch {
    config: CommandConfig,
}

impl CommandSearch {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SearchProvider for CommandSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, CollaboratorError> {
        const SERVICE: &str = "search";

        let stdout = run_command(SERVICE, &self.config, query, &[]).await?;
        if stdout.trim().is_empty() {
            return Ok(Vec::new());
        }
        parse_json(SERVICE, &stdout)
    }
}

#[derive(Serialize)]
struct EvaluationRequest<'a> {
    question: &'a str,
    answer: &'a str,
    transcript: &'a [Turn],
}

/// Answer evaluation through an external command: JSON request on stdin,
/// JSON [`Evaluation`] on stdout.
#[derive(Debug, Clone)]
pub struct CommandEvaluator {
    config: CommandConfig,
}

impl CommandEvaluator {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AnswerEvaluator for CommandEvaluator {
    async fn evaluate(
        &self,
        question: &str,
        answer: &str,
        transcript: &[Turn],
    ) -> Result<Evaluation, CollaboratorError> {
        const SERVICE: &str = "evaluator";

        let request = EvaluationRequest {
            question,
            answer,
            transcript,
        };
        let input = serde_json::to_string(&request).map_err(|e| CollaboratorError::Malformed {
            service: SERVICE,
            detail: format!("encoding request: {e}"),
        })?;

        let stdout = run_command(SERVICE, &self.config, &input, &[]).await?;
        parse_json(SERVICE, &stdout)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn generator_echoes_stdin_as_text() {
        let generator = CommandGenerator::new(CommandConfig::new("cat"));
        let out = generator.generate("  hello  ", None).await.unwrap();
        assert_eq!(out, Generation::Text("hello".to_string()));
    }

    #[tokio::test]
    async fn generator_passes_schema_and_parses_json() {
        let generator =
            CommandGenerator::new(CommandConfig::new(format!("printf '%s' \"${SCHEMA_ENV}\"")));
        let schema = json!({"type": "object"});
        let out = generator.generate("ignored", Some(&schema)).await.unwrap();
        assert_eq!(out, Generation::Structured(schema));
    }

    #[tokio::test]
    async fn non_zero_exit_is_unavailable() {
        let search = CommandSearch::new(CommandConfig::new("echo boom >&2; exit 3"));
        let err = search.search("q").await.unwrap_err();
        match err {
            CollaboratorError::Unavailable { service, detail } => {
                assert_eq!(service, "search");
                assert!(detail.contains("status 3"));
                assert!(detail.contains("boom"));
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_search_output_is_no_hits() {
        let search = CommandSearch::new(CommandConfig::new("true"));
        assert!(search.search("q").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn garbage_evaluation_is_malformed() {
        let evaluator = CommandEvaluator::new(CommandConfig::new("echo not-json"));
        let err = evaluator.evaluate("q", "a", &[]).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Malformed { .. }));
    }
}
