//! Listener dispatcher
//!
//! Delivers [`PushEvent`]s to the application's [`PushEventListener`] from a
//! single dedicated task. The orchestrator enqueues events while it holds its
//! registration lock, so the queue order is the order in which transitions
//! happened, and the listener never runs on a provider's callback task.
//!
//! ```text
//! orchestrator ──dispatch()──▶ unbounded queue ──▶ dispatcher task ──▶ listener
//! ```

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, warn};

use crate::traits::{PushEvent, PushEventListener};

enum Dispatch {
    Event(PushEvent),
    Shutdown,
}

/// Single-consumer event queue in front of the application listener
///
/// The queue is unbounded: every event is delivered exactly once, and
/// enqueueing never blocks the orchestrator.
pub struct ListenerDispatcher {
    tx: mpsc::UnboundedSender<Dispatch>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ListenerDispatcher {
    /// Start the dispatcher task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(listener: Option<Arc<dyn PushEventListener>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_dispatcher(listener, rx));

        Self {
            tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Queue an event for delivery
    pub fn dispatch(&self, event: PushEvent) {
        debug!("Dispatching {:?}", event);
        if self.tx.send(Dispatch::Event(event)).is_err() {
            warn!("Listener dispatcher stopped, dropping event");
        }
    }

    /// Deliver everything queued so far, then stop the task
    pub async fn shutdown(&self) {
        // Fails only if the task is already gone
        let _ = self.tx.send(Dispatch::Shutdown);

        let task = self.task.lock().await.take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            error!("Listener dispatcher task failed: {}", e);
        }
    }
}

async fn run_dispatcher(
    listener: Option<Arc<dyn PushEventListener>>,
    rx: mpsc::UnboundedReceiver<Dispatch>,
) {
    let mut queue = UnboundedReceiverStream::new(rx);

    while let Some(item) = queue.next().await {
        match item {
            Dispatch::Event(event) => {
                if let Some(listener) = &listener {
                    listener.on_event(&event);
                }
            }
            Dispatch::Shutdown => break,
        }
    }

    debug!("Listener dispatcher stopped");
}

/// Listener that forwards every event into a channel
///
/// Handy for applications that prefer consuming events as a stream, and for
/// tests.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<PushEvent>,
}

impl ChannelListener {
    /// Create the listener and the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PushEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PushEventListener for ChannelListener {
    fn on_event(&self, event: &PushEvent) {
        // Receiver dropped means nobody is interested any more
        let _ = self.tx.send(event.clone());
    }
}
