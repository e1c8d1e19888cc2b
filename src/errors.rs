// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::types::FailureKind;

#[derive(Error, Debug)]
pub enum DiligenceError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Interview session not found: {0}")]
    SessionNotFound(String),

    #[error("Pipeline aborted in stage '{stage}' (task '{task}', {kind}): {detail}")]
    PipelineAborted {
        stage: String,
        task: String,
        kind: FailureKind,
        detail: String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DiligenceError>;
