// src/analysis/mod.rs

//! The concrete pipelines built on the orchestration core.

pub mod competitors;
pub mod questions;

pub use competitors::{
    CompetitorList, IdentifyTask, ResearchTask, build_competitor_pipeline, merge_competitors,
    research_context,
};
pub use questions::{QuestionTask, build_question_pipeline, parse_questions, question_context};
