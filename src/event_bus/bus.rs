use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::{sync::oneshot, task};

use super::emitter::EventEmitter;
use super::hub::{EventHub, EventStream};
use super::sink::EventSink;

const DEFAULT_BUFFER_CAPACITY: usize = 1024;

/// Owns the [`EventHub`] and fans its broadcast stream out to any number of
/// [`EventSink`]s (logging, in-memory capture for tests). SSE subscribers
/// bypass sinks entirely and call [`EventBus::subscribe`] directly.
pub struct EventBus {
    sinks: Mutex<Vec<SinkWorker>>,
    hub: Arc<EventHub>,
    started: AtomicBool,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sinks(vec![Box::new(super::sink::TracingSink)])
    }
}

impl EventBus {
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        let hub = EventHub::new(DEFAULT_BUFFER_CAPACITY);
        Self {
            sinks: Mutex::new(sinks.into_iter().map(SinkWorker::idle).collect()),
            hub,
            started: AtomicBool::new(false),
        }
    }

    pub fn get_emitter(&self) -> Arc<dyn EventEmitter> {
        self.hub.emitter()
    }

    pub fn subscribe(&self) -> EventStream {
        self.hub.subscribe()
    }

    /// Spawn a worker task per registered sink. Idempotent.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut sinks = self.sinks.lock();
        for worker in sinks.iter_mut() {
            worker.spawn(Arc::clone(&self.hub));
        }
    }

    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut sinks = self.sinks.lock();
        for worker in sinks.iter_mut() {
            worker.stop().await;
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if self.started.load(Ordering::SeqCst) {
            for worker in self.sinks.lock().iter_mut() {
                worker.abort();
            }
        }
    }
}

struct SinkWorker {
    sink: Arc<dyn EventSink>,
    handle: Option<(oneshot::Sender<()>, task::JoinHandle<()>)>,
}

impl SinkWorker {
    fn idle(sink: Box<dyn EventSink>) -> Self {
        Self {
            sink: Arc::from(sink),
            handle: None,
        }
    }

    fn spawn(&mut self, hub: Arc<EventHub>) {
        if self.handle.is_some() {
            return;
        }
        let sink = Arc::clone(&self.sink);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let mut stream = hub.subscribe();
        let join = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    event = stream.recv() => match event {
                        Some(event) => sink.handle(&event),
                        None => break,
                    }
                }
            }
        });
        self.handle = Some((shutdown_tx, join));
    }

    async fn stop(&mut self) {
        if let Some((shutdown, join)) = self.handle.take() {
            let _ = shutdown.send(());
            let _ = join.await;
        }
    }

    fn abort(&mut self) {
        if let Some((shutdown, join)) = self.handle.take() {
            let _ = shutdown.send(());
            join.abort();
        }
    }
}
