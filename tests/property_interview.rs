use proptest::prelude::*;

use diligence::collab::Evaluation;
use diligence::interview::{InterviewState, advance, needs_evaluation};

#[derive(Debug, Clone)]
enum Step {
    /// An answer, with the verdict the evaluator would give.
    Answer { wants_followup: bool },
    Silence,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        5 => any::<bool>().prop_map(|wants_followup| Step::Answer { wants_followup }),
        1 => Just(Step::Silence),
    ]
}

proptest! {
    #[test]
    fn counters_stay_in_bounds(
        total in 0usize..6,
        max_followups in 0usize..4,
        steps in proptest::collection::vec(step_strategy(), 0..40),
    ) {
        let questions = (0..total).map(|i| format!("Q{i}")).collect();
        let (mut state, _) = advance(InterviewState::new(questions, "", max_followups), None, None);

        for step in steps {
            let prev_index = state.index();
            let prev_followups = state.followups();
            let was_complete = state.is_complete();

            let (input, verdict) = match step {
                Step::Answer { wants_followup } => (
                    Some("an answer"),
                    Some(Evaluation { needs_followup: wants_followup, followup_prompt: None }),
                ),
                Step::Silence => (None, None),
            };
            let eval = verdict.filter(|_| needs_evaluation(&state, input));
            let (next, _) = advance(state, input, eval.as_ref());
            state = next;

            prop_assert!(state.followups() <= max_followups);
            prop_assert!(state.index() >= prev_index);
            prop_assert!(state.index() <= state.total());
            prop_assert_eq!(state.is_complete(), state.index() == state.total());
            if was_complete {
                prop_assert!(state.is_complete());
            }
            // An exhausted budget always moves the interview on.
            if input.is_some() && !was_complete && prev_followups == max_followups {
                prop_assert_eq!(state.index(), prev_index + 1);
            }
        }
    }
}
