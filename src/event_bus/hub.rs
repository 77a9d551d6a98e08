use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast::{self, Receiver, Sender};

use super::emitter::{EmitterError, EventEmitter};
use super::event::WorkflowEvent;

/// Backs the push channel with a Tokio broadcast channel so any number of
/// SSE subscribers (plus the status-polling path, which reads state
/// directly and never touches the hub) can observe the same event stream.
#[derive(Debug)]
pub struct EventHub {
    sender: RwLock<Option<Sender<WorkflowEvent>>>,
    dropped: AtomicUsize,
    capacity: usize,
}

impl EventHub {
    pub fn new(capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Arc::new(Self {
            sender: RwLock::new(Some(sender)),
            dropped: AtomicUsize::new(0),
            capacity,
        })
    }

    pub fn publish(&self, event: WorkflowEvent) -> Result<(), EmitterError> {
        match self.current_sender() {
            Some(sender) => match sender.send(event) {
                Ok(_) => Ok(()),
                Err(broadcast::error::SendError(_)) => Err(EmitterError::Closed),
            },
            None => Err(EmitterError::Closed),
        }
    }

    pub fn subscribe(self: &Arc<Self>) -> EventStream {
        let receiver = self
            .current_sender()
            .expect("hub closed before subscribe")
            .subscribe();
        EventStream {
            hub: Arc::clone(self),
            receiver,
        }
    }

    pub fn close(&self) {
        *self.sender.write() = None;
    }

    pub fn metrics(&self) -> EventHubMetrics {
        EventHubMetrics {
            capacity: self.capacity,
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn current_sender(&self) -> Option<Sender<WorkflowEvent>> {
        self.sender.read().clone()
    }

    fn note_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of hub health, useful for tests and a future metrics endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHubMetrics {
    pub capacity: usize,
    pub dropped: usize,
}

/// A subscriber's view of the event hub. Lagged subscribers silently skip
/// forward (duplicates/gaps are tolerated per §5 — clients dedupe by
/// `(status, message-hash)`).
pub struct EventStream {
    hub: Arc<EventHub>,
    receiver: Receiver<WorkflowEvent>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<WorkflowEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    self.hub.note_dropped();
                    continue;
                }
            }
        }
    }
}

struct HubEmitter {
    hub: Arc<EventHub>,
}

impl EventEmitter for HubEmitter {
    fn emit(&self, event: WorkflowEvent) -> Result<(), EmitterError> {
        self.hub.publish(event)
    }
}

impl EventHub {
    pub fn emitter(self: &Arc<Self>) -> Arc<dyn EventEmitter> {
        Arc::new(HubEmitter {
            hub: Arc::clone(self),
        })
    }
}
