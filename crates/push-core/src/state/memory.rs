// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Purpose
//
// Keeps the registration state for the lifetime of the process only.
// Clones share the same state, which lets tests simulate a restart by
// building a second orchestrator over a clone of the first one's store.
//
// ## Crash Behavior
//
// - All state is lost on restart/crash
// - The next start registers from scratch

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::state_store::{PersistedState, StateStore, StateStoreFactory};

/// In-memory state store implementation
///
/// # Example
///
/// ```rust,no_run
/// use push_core::state::MemoryStateStore;
/// use push_core::traits::{RegistrationState, StateStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStateStore::new();
///
///     let mut state = store.load().await?;
///     state.state = RegistrationState::Registering;
///     store.save(&state).await?;
///
///     assert_eq!(store.load().await?.state, RegistrationState::Registering);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<PersistedState>>,
}

impl MemoryStateStore {
    /// Create a new, cleared memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `state`
    pub fn with_state(state: PersistedState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    /// Current contents of the store
    pub async fn snapshot(&self) -> PersistedState {
        self.inner.read().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<PersistedState, Error> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, state: &PersistedState) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        *guard = state.clone();
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        *guard = PersistedState::new();
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing buffered
        Ok(())
    }
}

/// Factory for the `memory` state store type
#[derive(Debug, Default)]
pub struct MemoryStateStoreFactory;

#[async_trait]
impl StateStoreFactory for MemoryStateStoreFactory {
    async fn create(&self, _config: &serde_json::Value) -> Result<Arc<dyn StateStore>, Error> {
        Ok(Arc::new(MemoryStateStore::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::RegistrationState;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStateStore::new();

        // Initially cleared
        assert!(store.load().await.unwrap().is_cleared());

        let mut state = PersistedState::new();
        state.state = RegistrationState::Registered;
        state.last_provider_name = Some("gcm".to_string());
        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.state, RegistrationState::Registered);
        assert_eq!(loaded.last_provider_name.as_deref(), Some("gcm"));

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_cleared());
    }

    #[tokio::test]
    async fn test_memory_store_clones_share_state() {
        let store = MemoryStateStore::new();
        let other = store.clone();

        let mut state = PersistedState::new();
        state.last_device_identity = Some("device-1".to_string());
        store.save(&state).await.unwrap();

        assert_eq!(
            other.snapshot().await.last_device_identity.as_deref(),
            Some("device-1")
        );
    }
}
