// src/interview/machine.rs

//! The interview transition function.
//!
//! `advance` is pure: the caller fetches the evaluation (if
//! [`needs_evaluation`] says one is wanted) and hands it in, so the same
//! function drives the CLI loop, the session service and the tests.

use tracing::debug;

use crate::collab::Evaluation;
use crate::interview::state::{InterviewPhase, InterviewState, Turn};

/// Final prompt once every question has been covered.
pub const CLOSING_PROMPT: &str =
    "Thank you, that covers all of our questions. The interview is complete.";

/// Follow-up used when the evaluator asks for one without wording it.
pub const DEFAULT_FOLLOWUP: &str = "Could you go into more detail, ideally with a concrete example?";

/// Whether `advance` would use an evaluation for this input.
///
/// False once the follow-up budget for the current question is spent, so
/// the evaluator is never consulted when its answer cannot matter.
pub fn needs_evaluation(state: &InterviewState, input: Option<&str>) -> bool {
    state.phase == InterviewPhase::AwaitingAnswer
        && answer_text(input).is_some()
        && state.followups < state.max_followups
}

fn answer_text(input: Option<&str>) -> Option<&str> {
    input.map(str::trim).filter(|s| !s.is_empty())
}

fn emit(mut state: InterviewState, prompt: String) -> (InterviewState, String) {
    state.transcript.push(Turn::system(prompt.clone()));
    state.last_prompt = Some(prompt.clone());
    (state, prompt)
}

fn move_to_next(mut state: InterviewState) -> (InterviewState, String) {
    state.index += 1;
    state.followups = 0;
    match state.questions.get(state.index).cloned() {
        Some(question) => emit(state, question),
        None => {
            state.phase = InterviewPhase::Completed;
            emit(state, CLOSING_PROMPT.to_string())
        }
    }
}

/// Move the interview one step.
///
/// - `NotStarted`: asks the first question (any input is ignored); with no
///   questions at all the interview completes immediately.
/// - `AwaitingAnswer` without input (or with blank input): repeats the
///   current prompt, state unchanged.
/// - `AwaitingAnswer` with an answer: records it, then asks a follow-up if
///   `evaluation` wants one and the budget allows, else moves on.
/// - `Completed`: returns the closing prompt, state unchanged.
pub fn advance(
    mut state: InterviewState,
    input: Option<&str>,
    evaluation: Option<&Evaluation>,
) -> (InterviewState, String) {
    match state.phase {
        InterviewPhase::Completed => {
            let prompt = state
                .last_prompt
                .clone()
                .unwrap_or_else(|| CLOSING_PROMPT.to_string());
            (state, prompt)
        }

        InterviewPhase::NotStarted => match state.questions.first().cloned() {
            Some(question) => {
                state.phase = InterviewPhase::AwaitingAnswer;
                emit(state, question)
            }
            None => {
                state.phase = InterviewPhase::Completed;
                emit(state, CLOSING_PROMPT.to_string())
            }
        },

        InterviewPhase::AwaitingAnswer => {
            let Some(answer) = answer_text(input) else {
                let prompt = state.last_prompt.clone().unwrap_or_default();
                return (state, prompt);
            };

            state.transcript.push(Turn::user(answer));
            if let Some(slot) = state.answers.get_mut(state.index) {
                slot.push(answer.to_string());
            }

            let followup = evaluation
                .filter(|e| e.needs_followup)
                .filter(|_| state.followups < state.max_followups);

            match followup {
                Some(eval) => {
                    state.followups += 1;
                    debug!(
                        question = state.index,
                        followups = state.followups,
                        "asking follow-up"
                    );
                    let prompt = eval
                        .followup_prompt
                        .as_deref()
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .unwrap_or(DEFAULT_FOLLOWUP)
                        .to_string();
                    emit(state, prompt)
                }
                None => move_to_next(state),
            }
        }
    }
}
