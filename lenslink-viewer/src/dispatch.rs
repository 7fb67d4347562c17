//! Ordered hand-off of connection events onto the consumer's execution
//! context. Single writer, single reader; no decision logic.

use lenslink_core::ConnectionEvent;
use tokio::sync::mpsc;

/// Create the event queue connecting the network worker to the consumer.
pub fn event_queue() -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, EventStream { rx })
}

/// Network-side writer. Queuing never blocks the network path; events arrive
/// at the consumer exactly once, in the order they were queued.
pub struct EventSink {
    tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl EventSink {
    /// Queue one event. A consumer that went away drops the rest silently.
    pub fn emit(&self, event: ConnectionEvent) {
        let _ = self.tx.send(event);
    }
}

/// Consumer-side reader, owned by the consumer's execution context.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl EventStream {
    /// Await the next event in production order. `None` once the session
    /// worker has finished and all events were delivered.
    pub async fn next(&mut self) -> Option<ConnectionEvent> {
        self.rx.recv().await
    }

    /// Poll without blocking, for consumers that drain once per render tick.
    pub fn try_next(&mut self) -> Option<ConnectionEvent> {
        self.rx.try_recv().ok()
    }
}
