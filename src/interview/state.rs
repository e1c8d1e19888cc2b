// src/interview/state.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    System,
    User,
}

/// One entry of the interview transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

impl Turn {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::System,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewPhase {
    NotStarted,
    AwaitingAnswer,
    Completed,
}

/// State of one interview.
///
/// Fields are private: only [`advance`](super::machine::advance) moves an
/// interview forward, which keeps the counters inside their bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewState {
    pub(crate) questions: Vec<String>,
    pub(crate) index: usize,
    pub(crate) followups: usize,
    pub(crate) max_followups: usize,
    pub(crate) transcript: Vec<Turn>,
    pub(crate) phase: InterviewPhase,
    pub(crate) background: String,
    /// Answers given to each question, follow-up answers included.
    pub(crate) answers: Vec<Vec<String>>,
    pub(crate) last_prompt: Option<String>,
}

impl InterviewState {
    pub fn new(questions: Vec<String>, background: impl Into<String>, max_followups: usize) -> Self {
        let answers = vec![Vec::new(); questions.len()];
        Self {
            questions,
            index: 0,
            followups: 0,
            max_followups,
            transcript: Vec::new(),
            phase: InterviewPhase::NotStarted,
            background: background.into(),
            answers,
            last_prompt: None,
        }
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    pub fn total(&self) -> usize {
        self.questions.len()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Follow-ups asked for the current question.
    pub fn followups(&self) -> usize {
        self.followups
    }

    pub fn max_followups(&self) -> usize {
        self.max_followups
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn phase(&self) -> InterviewPhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == InterviewPhase::Completed
    }

    pub fn background(&self) -> &str {
        &self.background
    }

    pub fn answers(&self) -> &[Vec<String>] {
        &self.answers
    }

    /// Questions not yet moved past.
    pub fn remaining(&self) -> usize {
        self.total() - self.index
    }

    pub fn current_question(&self) -> Option<&str> {
        if self.is_complete() {
            return None;
        }
        self.questions.get(self.index).map(String::as_str)
    }

    pub fn last_prompt(&self) -> Option<&str> {
        self.last_prompt.as_deref()
    }
}
