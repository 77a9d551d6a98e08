use thiserror::Error;

use super::event::WorkflowEvent;

/// Error returned when an event cannot be published.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EmitterError {
    #[error("event hub is closed")]
    Closed,
}

/// Narrow capability for publishing events, handed out to agents so they
/// don't need a reference to the whole [`super::hub::EventHub`].
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: WorkflowEvent) -> Result<(), EmitterError>;
}
