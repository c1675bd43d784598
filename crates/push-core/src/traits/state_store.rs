// # State Store Trait
//
// Defines the interface for persisting registration state.
//
// ## Purpose
//
// The state store lets a registration survive process restarts by tracking:
// - The current registration state
// - The last selected provider
// - The device identity captured at registration time
// - The deadline of a pending retry
//
// ## Implementations
//
// - File-based: JSON file with atomic writes
// - In-memory: tests and ephemeral deployments
//
// ## Usage
//
// ```rust,ignore
// use push_core::{PersistedState, RegistrationState, StateStore};
//
// let store = /* StateStore implementation */;
// let mut state = store.load().await?;
// state.state = RegistrationState::Registering;
// store.save(&state).await?;
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Registration state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    /// No provider is registered
    #[default]
    Unregistered,
    /// A provider is being registered
    Registering,
    /// A provider is registered
    Registered,
    /// The registered provider is being unregistered
    Unregistering,
}

impl RegistrationState {
    /// Whether the state machine may move from `self` to `next`
    ///
    /// Re-entering `Registering` covers both a delayed retry of the same
    /// provider and fallback to the next one.
    pub fn can_transition_to(self, next: RegistrationState) -> bool {
        use RegistrationState::*;

        matches!(
            (self, next),
            (Unregistered, Registering)
                | (Registering, Registered)
                | (Registering, Registering)
                | (Registering, Unregistered)
                | (Registered, Unregistering)
                | (Registered, Unregistered)
                | (Unregistering, Unregistered)
                | (Unregistering, Registered)
        )
    }

    /// Whether a current provider must be set in this state
    pub fn has_current_provider(self) -> bool {
        matches!(
            self,
            RegistrationState::Registered | RegistrationState::Unregistering
        )
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistrationState::Unregistered => "unregistered",
            RegistrationState::Registering => "registering",
            RegistrationState::Registered => "registered",
            RegistrationState::Unregistering => "unregistering",
        };
        f.write_str(name)
    }
}

/// Registration state as persisted across restarts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Current state machine state
    #[serde(default)]
    pub state: RegistrationState,
    /// Last selected provider
    #[serde(default)]
    pub last_provider_name: Option<String>,
    /// Device identity captured on the last successful registration
    #[serde(default)]
    pub last_device_identity: Option<String>,
    /// Deadline of a scheduled retry of `last_provider_name`
    #[serde(default)]
    pub pending_retry_at: Option<DateTime<Utc>>,
    /// Time of the last write
    pub updated_at: DateTime<Utc>,
}

impl PersistedState {
    /// Fresh, fully cleared state
    pub fn new() -> Self {
        Self {
            state: RegistrationState::Unregistered,
            last_provider_name: None,
            last_device_identity: None,
            pending_retry_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Whether nothing beyond the default state is recorded
    pub fn is_cleared(&self) -> bool {
        self.state == RegistrationState::Unregistered
            && self.last_provider_name.is_none()
            && self.last_device_identity.is_none()
            && self.pending_retry_at.is_none()
    }

    /// Mark the state as modified now
    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for PersistedState {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for state store implementations
///
/// The orchestrator is the only writer. It calls `save()` after every
/// transition while holding its registration lock, so implementations do not
/// need to order concurrent writers, but they must be safe to call from any
/// task.
///
/// # Implementation Guidelines
///
/// - **Async I/O only**: never block the runtime
/// - **Durable save**: `save()` returns only once the state survives a restart
/// - **Explicit flush**: `flush()` persists anything still buffered
/// - **No business logic**: the store never decides state transitions
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the persisted state
    ///
    /// # Returns
    ///
    /// - `Ok(PersistedState)`: Stored state, or a cleared state if none exists
    /// - `Err(Error)`: Storage error
    async fn load(&self) -> Result<PersistedState, crate::Error>;

    /// Replace the persisted state
    async fn save(&self, state: &PersistedState) -> Result<(), crate::Error>;

    /// Remove everything, leaving a cleared state
    async fn clear(&self) -> Result<(), crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing state stores from configuration
#[async_trait]
pub trait StateStoreFactory: Send + Sync {
    /// Create a StateStore instance from configuration
    async fn create(
        &self,
        config: &serde_json::Value,
    ) -> Result<std::sync::Arc<dyn StateStore>, crate::Error>;
}
