// # push-core
//
// Core library for registering an application with one of several
// interchangeable push notification providers.
//
// ## Architecture Overview
//
// - **PushProvider**: Trait every notification back-end implements
// - **StateStore**: Trait for persisting the registration across restarts
// - **RetryScheduler**: Trait for deadline-based delayed retries
// - **Platform**: Trait for device facts and provider availability watches
// - **PushOrchestrator**: The registration state machine
// - **ListenerDispatcher**: Ordered delivery of lifecycle events
// - **ProviderRegistry**: Plugin-based registry for providers and stores
//
// ## Design Principles
//
// 1. **Fire-and-forget providers**: results come back through a callback handle
// 2. **Single writer**: only the orchestrator changes the persisted state
// 3. **Validated results**: late or misrouted results are rejected, never applied
// 4. **Library-first**: no globals, one orchestrator handle passed around

pub mod backoff;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use backoff::{Backoff, ExponentialBackoff};
pub use config::{
    BackoffConfig, Options, OptionsBuilder, ProviderConfig, ProviderDescriptor, PushConfig,
    StateStoreConfig,
};
pub use dispatch::{ChannelListener, ListenerDispatcher};
pub use error::{Error, Result};
pub use orchestrator::{ProviderCallback, PushOrchestrator, PushOrchestratorBuilder, RetryHandle};
pub use registry::ProviderRegistry;
pub use scheduler::TokioRetryScheduler;
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{
    MessageListener, OutboundMessage, Platform, ProviderError, PushEvent, PushEventListener,
    PushProvider, PushResult, RegistrationState, ResultKind, StateStore,
};
