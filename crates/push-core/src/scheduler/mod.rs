//! In-process retry scheduler
//!
//! [`TokioRetryScheduler`] realizes a [`ScheduledRetry`] as a tokio task that
//! sleeps until the deadline and then fires the orchestrator's retry handle.
//! Nothing here survives a restart; the orchestrator re-arms the retry from
//! the persisted deadline on the next `init()`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::orchestrator::RetryHandle;
use crate::traits::{RetryScheduler, ScheduledRetry};

struct PendingRetry {
    generation: u64,
    retry: ScheduledRetry,
    task: JoinHandle<()>,
}

/// Retry scheduler backed by tokio timers
///
/// Must be used from within a tokio runtime.
#[derive(Default)]
pub struct TokioRetryScheduler {
    pending: Arc<Mutex<Option<PendingRetry>>>,
    generation: AtomicU64,
}

impl TokioRetryScheduler {
    /// Create a scheduler with nothing pending
    pub fn new() -> Self {
        Self::default()
    }

    /// The retry currently waiting for its deadline
    pub async fn pending(&self) -> Option<ScheduledRetry> {
        self.pending.lock().await.as_ref().map(|p| p.retry.clone())
    }
}

#[async_trait]
impl RetryScheduler for TokioRetryScheduler {
    async fn schedule(&self, retry: ScheduledRetry, handle: RetryHandle) {
        let delay = retry.remaining();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        info!(
            "Retry of provider '{}' scheduled at {} (in {:?})",
            retry.provider_name, retry.deadline, delay
        );

        let pending = Arc::clone(&self.pending);
        let deadline = Instant::now() + delay;

        // Hold the lock across spawn so the task cannot observe a stale slot
        let mut slot = self.pending.lock().await;

        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;

            // Leave the slot before firing: firing may schedule the next retry,
            // which would otherwise abort this very task.
            {
                let mut slot = pending.lock().await;
                if slot.as_ref().is_some_and(|p| p.generation == generation) {
                    slot.take();
                } else {
                    return;
                }
            }

            if let Err(e) = handle.fire().await {
                warn!("Scheduled retry failed: {}", e);
            }
        });

        if let Some(previous) = slot.replace(PendingRetry {
            generation,
            retry,
            task,
        }) {
            debug!(
                "Replacing pending retry of provider '{}'",
                previous.retry.provider_name
            );
            previous.task.abort();
        }
    }

    async fn cancel(&self) {
        if let Some(previous) = self.pending.lock().await.take() {
            debug!(
                "Cancelled pending retry of provider '{}'",
                previous.retry.provider_name
            );
            previous.task.abort();
        }
    }
}
