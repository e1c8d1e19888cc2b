// src/config/mod.rs

//! Configuration loading and validation for diligence.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate invariants and resolve durations (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    CollaboratorsSection, CommandConfig, ConfigFile, InterviewSection, InterviewSettings,
    PipelineSection, PipelineSettings, RawConfigFile,
};
pub use validate::parse_duration;
