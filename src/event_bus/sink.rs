//! Sinks consume the broadcast stream for purposes other than the SSE push
//! channel: server-side logging, and an in-memory capture used by tests.

use parking_lot::Mutex;
use std::sync::Arc;

use super::event::WorkflowEvent;

pub trait EventSink: Send + Sync {
    fn handle(&self, event: &WorkflowEvent);
}

/// Logs every event via `tracing`.
#[derive(Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn handle(&self, event: &WorkflowEvent) {
        tracing::info!(event = ?event, "workflow event");
    }
}

/// Captures events in memory; used by tests that assert on push-channel
/// ordering without standing up a real SSE client.
#[derive(Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<WorkflowEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for MemorySink {
    fn handle(&self, event: &WorkflowEvent) {
        self.events.lock().push(event.clone());
    }
}
