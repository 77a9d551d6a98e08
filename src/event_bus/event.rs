//! Event payloads broadcast over the push channel.
//!
//! Every transition on [`crate::state::WorkflowState`] emits exactly one
//! [`WorkflowEvent`] carrying the *post*-transition snapshot, so subscribers
//! never observe a half-applied compound transition (see §4.7.6 / §5 of the
//! design: outcome dispatch is one atomic transition, one event).

use serde::{Deserialize, Serialize};

use crate::state::StateSnapshot;

/// A single occurrence on the push channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// Any transition that changes `status` and/or `conversation_phase`.
    StatusChanged { snapshot: StateSnapshot },
    /// Emitted once validation finishes, in addition to the status change.
    ValidationComplete { snapshot: StateSnapshot },
    /// Progress ticks during conversion, reported at the milestones in §4.5.
    ConversionProgress { percentage: u8, phase: String },
    /// Emitted by `reset()`.
    Reset,
}

impl WorkflowEvent {
    /// A deduplication key clients can use across polling + push, per §5's
    /// "(status, message-hash)" ordering guarantee.
    pub fn dedup_key(&self) -> u64 {
        use rustc_hash::FxHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = FxHasher::default();
        match self {
            WorkflowEvent::StatusChanged { snapshot } | WorkflowEvent::ValidationComplete { snapshot } => {
                snapshot.status.as_str().hash(&mut hasher);
                snapshot.llm_message.hash(&mut hasher);
            }
            WorkflowEvent::ConversionProgress { percentage, phase } => {
                "conversion_progress".hash(&mut hasher);
                percentage.hash(&mut hasher);
                phase.hash(&mut hasher);
            }
            WorkflowEvent::Reset => "reset".hash(&mut hasher),
        }
        hasher.finish()
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
