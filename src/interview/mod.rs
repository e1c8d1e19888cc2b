// src/interview/mod.rs

//! Turn-bounded founder interview.
//!
//! `state` and `machine` form the pure core: a transition function over an
//! owned [`InterviewState`]. `session` is the async shell that keeps live
//! sessions, calls the evaluator and generates the question list.

pub mod machine;
pub mod session;
pub mod state;

pub use machine::{CLOSING_PROMPT, DEFAULT_FOLLOWUP, advance, needs_evaluation};
pub use session::{InterviewReply, InterviewService, InterviewStatus, SeedInput};
pub use state::{InterviewPhase, InterviewState, Speaker, Turn};
