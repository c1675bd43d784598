// # Retry Scheduler Trait
//
// Arranges "retry registration of provider X at time T".
//
// The orchestrator persists the deadline before scheduling, so a scheduler
// does not need to survive restarts: on the next `init()` the orchestrator
// re-arms the retry from the stored deadline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::orchestrator::RetryHandle;

/// A retry waiting for its deadline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledRetry {
    /// Provider to register again
    pub provider_name: String,
    /// When the retry should fire
    pub deadline: DateTime<Utc>,
}

impl ScheduledRetry {
    /// Create a retry for `provider_name` at `deadline`
    pub fn new(provider_name: impl Into<String>, deadline: DateTime<Utc>) -> Self {
        Self {
            provider_name: provider_name.into(),
            deadline,
        }
    }

    /// Time left until the deadline, zero if it already passed
    pub fn remaining(&self) -> Duration {
        (self.deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Deadline-based scheduler for delayed registration retries
///
/// At most one retry is pending at a time. Scheduling a new retry replaces
/// the previous one.
#[async_trait]
pub trait RetryScheduler: Send + Sync {
    /// Arrange for `handle.fire()` to be called once `retry.deadline` passes
    async fn schedule(&self, retry: ScheduledRetry, handle: RetryHandle);

    /// Drop the pending retry, if any
    async fn cancel(&self);
}
