//! Push channel: the server→client half of §6's dual update model.

mod bus;
mod emitter;
mod event;
mod hub;
mod sink;

pub use bus::EventBus;
pub use emitter::{EmitterError, EventEmitter};
pub use event::WorkflowEvent;
pub use hub::{EventHub, EventHubMetrics, EventStream};
pub use sink::{EventSink, MemorySink, TracingSink};
