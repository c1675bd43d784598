//! Core traits for the push registration system
//!
//! This module defines the abstract interfaces the orchestrator consumes.
//!
//! - [`PushProvider`]: A notification back-end
//! - [`StateStore`]: Persistent registration state
//! - [`RetryScheduler`]: Deadline-based delayed retries
//! - [`Platform`]: Device facts and availability subscriptions
//! - [`PushEventListener`] / [`MessageListener`]: Application callbacks

pub mod listener;
pub mod platform;
pub mod push_provider;
pub mod retry_scheduler;
pub mod state_store;

pub use listener::{MessageListener, PushEvent, PushEventListener};
pub use platform::{DefaultPlatform, Platform};
pub use push_provider::{
    MessageSender, OutboundMessage, Outcome, ProviderError, PushProvider, PushProviderFactory,
    PushResult, ResultKind,
};
pub use retry_scheduler::{RetryScheduler, ScheduledRetry};
pub use state_store::{PersistedState, RegistrationState, StateStore, StateStoreFactory};
