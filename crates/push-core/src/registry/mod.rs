//! Plugin-based provider registry
//!
//! The registry lets push providers and state stores be registered by type
//! name at runtime, so a [`crate::PushConfig`] can name them without the
//! core knowing any concrete implementation.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use push_core::registry::ProviderRegistry;
//! use push_core::config::ProviderConfig;
//!
//! let registry = ProviderRegistry::with_builtin_stores();
//! registry.register_provider("gcm", Arc::new(GcmFactory));
//!
//! let provider = registry.create_provider(&ProviderConfig::new("gcm"), callback)?;
//! let store = registry.create_state_store(&config.state_store).await?;
//! ```
//!
//! ## Registration
//!
//! Provider crates should expose a helper that registers their factory:
//!
//! ```rust,ignore
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_provider("gcm", Arc::new(GcmFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{ProviderConfig, StateStoreConfig};
use crate::error::{Error, Result};
use crate::orchestrator::ProviderCallback;
use crate::state::{FileStateStoreFactory, MemoryStateStoreFactory};
use crate::traits::{PushProvider, PushProviderFactory, StateStore, StateStoreFactory};

/// Registry of provider and state store factories
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered push provider factories
    providers: RwLock<HashMap<String, Arc<dyn PushProviderFactory>>>,

    /// Registered state store factories
    state_stores: RwLock<HashMap<String, Arc<dyn StateStoreFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the `file` and `memory` state stores registered
    pub fn with_builtin_stores() -> Self {
        let registry = Self::new();
        registry.register_state_store("file", Arc::new(FileStateStoreFactory));
        registry.register_state_store("memory", Arc::new(MemoryStateStoreFactory));
        registry
    }

    /// Register a push provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Factory name used by [`ProviderConfig::factory`]
    /// - `factory`: Factory object for creating provider instances
    pub fn register_provider(&self, name: impl Into<String>, factory: Arc<dyn PushProviderFactory>) {
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        providers.insert(name.into(), factory);
    }

    /// Register a state store factory
    pub fn register_state_store(
        &self,
        name: impl Into<String>,
        factory: Arc<dyn StateStoreFactory>,
    ) {
        let mut stores = self
            .state_stores
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        stores.insert(name.into(), factory);
    }

    /// Create a push provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn PushProvider>)`: Created provider instance
    /// - `Err(Error)`: If the factory is not registered or creation fails
    pub fn create_provider(
        &self,
        config: &ProviderConfig,
        callback: ProviderCallback,
    ) -> Result<Arc<dyn PushProvider>> {
        let factory = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&config.factory)
            .cloned()
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", config.factory)))?;

        let provider = factory.create(&config.config, callback)?;
        tracing::debug!(
            "Created provider '{}' from factory '{}'",
            provider.name(),
            config.factory
        );
        Ok(provider)
    }

    /// Create a state store from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn StateStore>)`: Created state store instance
    /// - `Err(Error)`: If the store type is not registered or creation fails
    pub async fn create_state_store(&self, config: &StateStoreConfig) -> Result<Arc<dyn StateStore>> {
        let store_type = config.type_name();

        // Clone the factory out so the lock is not held across the await
        let factory = self
            .state_stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(store_type)
            .cloned()
            .ok_or_else(|| Error::config(format!("Unknown state store type: {}", store_type)))?;

        let config_json = match config {
            StateStoreConfig::Custom { config, .. } => config.clone(),
            _ => serde_json::to_value(config)?,
        };

        factory.create(&config_json).await
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        providers.keys().cloned().collect()
    }

    /// List all registered state store types
    pub fn list_state_stores(&self) -> Vec<String> {
        let stores = self
            .state_stores
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        stores.keys().cloned().collect()
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Check if a state store type is registered
    pub fn has_state_store(&self, name: &str) -> bool {
        self.state_stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PushOrchestrator;
    use crate::state::MemoryStateStore;
    use crate::traits::RegistrationState;
    use tempfile::tempdir;

    struct StaticProvider {
        name: String,
    }

    impl PushProvider for StaticProvider {
        fn name(&self) -> &str {
            &self.name
        }
        fn host_app_package(&self) -> &str {
            "com.example.host"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn register(&self) {}
        fn unregister(&self) {}
        fn is_registered(&self) -> bool {
            false
        }
        fn registration_id(&self) -> Option<String> {
            None
        }
    }

    struct StaticProviderFactory;

    impl PushProviderFactory for StaticProviderFactory {
        fn create(
            &self,
            config: &serde_json::Value,
            _callback: ProviderCallback,
        ) -> Result<Arc<dyn PushProvider>> {
            let name = config
                .get("name")
                .and_then(|n| n.as_str())
                .ok_or_else(|| Error::config("static provider requires 'name'"))?;
            Ok(Arc::new(StaticProvider {
                name: name.to_string(),
            }))
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = ProviderRegistry::new();
        assert!(!registry.has_provider("static"));

        registry.register_provider("static", Arc::new(StaticProviderFactory));

        assert!(registry.has_provider("static"));
        assert!(registry.list_providers().contains(&"static".to_string()));
        assert!(!registry.has_state_store("file"));
    }

    #[tokio::test]
    async fn test_create_provider_from_config() {
        let registry = ProviderRegistry::new();
        registry.register_provider("static", Arc::new(StaticProviderFactory));
        let orchestrator = PushOrchestrator::builder(Arc::new(MemoryStateStore::new())).build();

        let config = ProviderConfig::new("static").with_config(serde_json::json!({"name": "gcm"}));
        let provider = registry
            .create_provider(&config, orchestrator.provider_callback())
            .unwrap();
        assert_eq!(provider.name(), "gcm");

        let err = registry
            .create_provider(&ProviderConfig::new("missing"), orchestrator.provider_callback())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_builtin_state_stores() {
        let registry = ProviderRegistry::with_builtin_stores();
        assert!(registry.has_state_store("file"));
        assert!(registry.has_state_store("memory"));

        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = registry
            .create_state_store(&StateStoreConfig::File {
                path: path.to_string_lossy().into_owned(),
            })
            .await
            .unwrap();

        let mut state = store.load().await.unwrap();
        state.state = RegistrationState::Registering;
        store.save(&state).await.unwrap();
        assert!(path.exists());

        let err = registry
            .create_state_store(&StateStoreConfig::Custom {
                factory: "redis".to_string(),
                config: serde_json::Value::Null,
            })
            .await
            .err();
        assert!(matches!(err, Some(Error::Config(_))));
    }
}
