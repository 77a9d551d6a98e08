//! Universal invariants checked against arbitrary inputs, complementing the
//! example-based unit tests scattered across the crate's own modules.

use std::path::PathBuf;

use nwb_conversation_orchestrator::event_bus::EventBus;
use nwb_conversation_orchestrator::schema::{self, registry};
use nwb_conversation_orchestrator::state::{
    ConversationPhase, ConversionStatus, StateError, ValidationDisposition, WorkflowStateHandle, MAX_RETRIES,
};
use proptest::prelude::*;

fn handle() -> WorkflowStateHandle {
    let bus = Box::leak(Box::new(EventBus::default()));
    WorkflowStateHandle::new(bus.get_emitter())
}

proptest! {
    /// Every registered field's deterministic normalizer is idempotent, not
    /// just on the one example string used in `schema::mod`'s own unit test.
    #[test]
    fn normalize_is_idempotent_for_arbitrary_input(raw in "\\PC{0,40}") {
        for field in registry() {
            let once = schema::normalize(field.name, &raw);
            let twice = schema::normalize(field.name, &once);
            prop_assert_eq!(&once, &twice, "field {} is not idempotent for {:?}", field.name, raw);
        }
    }

    /// `sex` always normalizes onto exactly one of the four DANDI tokens.
    #[test]
    fn sex_normalizes_into_known_token_set(raw in "\\PC{0,20}") {
        let normalized = schema::normalize("sex", &raw);
        prop_assert!(["M", "F", "U", "O"].contains(&normalized.as_str()));
    }

    /// `correction_attempt` only ever increases by exactly one per call, is
    /// capped at `MAX_RETRIES`, and every call past the cap is rejected.
    #[test]
    fn correction_attempt_is_monotonic_and_capped(calls in 0u32..(MAX_RETRIES + 5)) {
        let h = handle();
        let mut previous = 0u32;
        for i in 0..calls {
            match h.increment_correction_attempt() {
                Ok(value) => {
                    prop_assert_eq!(value, previous + 1);
                    prop_assert!(value <= MAX_RETRIES);
                    previous = value;
                }
                Err(StateError::RetryLimitExceeded) => {
                    prop_assert!(i >= MAX_RETRIES);
                    prop_assert_eq!(previous, MAX_RETRIES);
                }
                Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
            }
        }
    }

    /// `reset()` always lands on the same observable defaults, regardless of
    /// how much state was mutated beforehand.
    #[test]
    fn reset_always_reaches_the_same_observable_defaults(
        filename in "[a-zA-Z0-9_]{1,20}",
        retries in 0u32..5,
    ) {
        let h = handle();
        h.begin_upload(PathBuf::from(format!("/tmp/{filename}.bin")), None).unwrap();
        for _ in 0..retries {
            let _ = h.increment_correction_attempt();
        }
        h.reset();
        h.read(|s| {
            prop_assert_eq!(s.status, ConversionStatus::Idle);
            prop_assert_eq!(s.conversation_phase, ConversationPhase::None);
            prop_assert_eq!(s.correction_attempt, 0);
            prop_assert!(s.input_path.is_none());
            prop_assert!(s.history.is_empty());
            Ok(())
        })?;
    }

    /// Reading `status` (or anything else) through `read` never mutates
    /// `updated_at`, no matter how many times it is called first.
    #[test]
    fn read_never_mutates_updated_at(reads in 0usize..10) {
        let h = handle();
        h.begin_upload(PathBuf::from("/tmp/a.bin"), None).unwrap();
        let before = h.read(|s| s.updated_at);
        for _ in 0..reads {
            let _ = h.read(|s| s.status);
        }
        let after = h.read(|s| s.updated_at);
        prop_assert_eq!(before, after);
    }
}

#[test]
fn reaching_the_retry_cap_always_yields_failed_user_declined_on_terminal() {
    let h = handle();
    h.begin_upload(PathBuf::from("/tmp/a.bin"), None).unwrap();
    for _ in 0..MAX_RETRIES {
        h.increment_correction_attempt().unwrap();
    }
    assert!(matches!(
        h.increment_correction_attempt(),
        Err(StateError::RetryLimitExceeded)
    ));
    h.set_terminal(ValidationDisposition::FailedUserDeclined).unwrap();
    h.read(|s| assert_eq!(s.status, ConversionStatus::Failed));
}
