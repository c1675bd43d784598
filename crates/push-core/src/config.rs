//! Configuration types for the push registration system
//!
//! [`PushConfig`] is the serializable form read from files or the
//! environment. [`Options`] is the runtime form handed to
//! [`crate::PushOrchestrator::init`]: it owns the provider instances in
//! fallback priority order.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::backoff::{Backoff, ExponentialBackoff};
use crate::error::{Error, Result};
use crate::orchestrator::ProviderCallback;
use crate::registry::ProviderRegistry;
use crate::traits::PushProvider;

/// Main push configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushConfig {
    /// Providers in fallback priority order
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Try providers hosted by system applications first
    #[serde(default)]
    pub select_system_preferred: bool,

    /// Register again as soon as the current provider becomes unavailable
    #[serde(default)]
    pub recover_provider: bool,

    /// Retry policy for transient failures; absent means no retries
    #[serde(default)]
    pub backoff: Option<BackoffConfig>,

    /// Where registration state is persisted
    #[serde(default)]
    pub state_store: StateStoreConfig,
}

impl PushConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for provider in &self.providers {
            provider.validate()?;
        }

        if let Some(backoff) = &self.backoff {
            backoff.validate()?;
        }

        self.state_store.validate()
    }
}

/// Provider entry: which factory builds it and with what settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registered factory name
    pub factory: String,

    /// Factory-specific configuration
    #[serde(default)]
    pub config: serde_json::Value,
}

impl ProviderConfig {
    /// Create a provider entry with no extra settings
    pub fn new(factory: impl Into<String>) -> Self {
        Self {
            factory: factory.into(),
            config: serde_json::Value::Null,
        }
    }

    /// Attach factory-specific configuration
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Validate the provider entry
    pub fn validate(&self) -> Result<()> {
        if self.factory.trim().is_empty() {
            return Err(Error::config("Provider factory cannot be empty"));
        }
        Ok(())
    }
}

/// Backoff configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Maximum retries per provider; absent means effectively unbounded
    #[serde(default)]
    pub max_tries: Option<u32>,
}

impl BackoffConfig {
    /// Validate the backoff configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_tries == Some(0) {
            return Err(Error::config("Backoff max_tries must be >= 1"));
        }
        Ok(())
    }

    /// Build the exponential backoff this configuration describes
    pub fn build(&self) -> Result<ExponentialBackoff> {
        match self.max_tries {
            Some(max_tries) => ExponentialBackoff::with_max_tries(max_tries),
            None => Ok(ExponentialBackoff::new()),
        }
    }
}

/// State store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based state store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory state store (not persistent)
    #[default]
    Memory,

    /// Custom state store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl StateStoreConfig {
    /// Validate the state store configuration
    pub fn validate(&self) -> Result<()> {
        match self {
            StateStoreConfig::File { path } => {
                if path.is_empty() {
                    return Err(Error::config("File state store path cannot be empty"));
                }
                Ok(())
            }
            StateStoreConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(Error::config("Custom state store factory cannot be empty"));
                }
                Ok(())
            }
            StateStoreConfig::Memory => Ok(()),
        }
    }

    /// Get the state store type name
    pub fn type_name(&self) -> &str {
        match self {
            StateStoreConfig::File { .. } => "file",
            StateStoreConfig::Memory => "memory",
            StateStoreConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Immutable description of a configured provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    /// Unique provider name
    pub name: String,
    /// Package of the provider's host application
    pub host_app_package: String,
    /// Position in the fallback order
    pub position: usize,
}

/// Runtime options, set once per orchestrator
///
/// # Example
///
/// ```rust,ignore
/// let options = Options::builder()
///     .provider(gcm)
///     .provider(adm)
///     .select_system_preferred(true)
///     .backoff(ExponentialBackoff::with_max_tries(5)?)
///     .build()?;
/// ```
#[derive(Clone)]
pub struct Options {
    providers: Vec<Arc<dyn PushProvider>>,
    select_system_preferred: bool,
    recover_provider: bool,
    backoff: Option<Arc<dyn Backoff>>,
}

impl Options {
    /// Start building options
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Build options from configuration, creating providers through `registry`
    pub fn from_config(
        config: &PushConfig,
        registry: &ProviderRegistry,
        callback: &ProviderCallback,
    ) -> Result<Self> {
        config.validate()?;

        let mut builder = Options::builder()
            .select_system_preferred(config.select_system_preferred)
            .recover_provider(config.recover_provider);

        for provider in &config.providers {
            builder = builder.provider(registry.create_provider(provider, callback.clone())?);
        }

        if let Some(backoff) = &config.backoff {
            builder = builder.backoff(backoff.build()?);
        }

        builder.build()
    }

    /// Providers in fallback priority order
    pub fn providers(&self) -> &[Arc<dyn PushProvider>] {
        &self.providers
    }

    /// Find a provider and its position by exact name
    pub fn provider(&self, name: &str) -> Option<(usize, &Arc<dyn PushProvider>)> {
        self.providers
            .iter()
            .enumerate()
            .find(|(_, p)| p.name() == name)
    }

    /// Descriptors of all configured providers
    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        self.providers
            .iter()
            .enumerate()
            .map(|(position, p)| ProviderDescriptor {
                name: p.name().to_string(),
                host_app_package: p.host_app_package().to_string(),
                position,
            })
            .collect()
    }

    /// Whether system-hosted providers are tried first
    pub fn is_select_system_preferred(&self) -> bool {
        self.select_system_preferred
    }

    /// Whether registration restarts when the current provider goes away
    pub fn is_recover_provider(&self) -> bool {
        self.recover_provider
    }

    /// Retry policy, if any
    pub fn backoff(&self) -> Option<&Arc<dyn Backoff>> {
        self.backoff.as_ref()
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("Options")
            .field("providers", &names)
            .field("select_system_preferred", &self.select_system_preferred)
            .field("recover_provider", &self.recover_provider)
            .field("backoff", &self.backoff)
            .finish()
    }
}

/// Builder for [`Options`]
#[derive(Default)]
pub struct OptionsBuilder {
    providers: Vec<Arc<dyn PushProvider>>,
    select_system_preferred: bool,
    recover_provider: bool,
    backoff: Option<Arc<dyn Backoff>>,
}

impl OptionsBuilder {
    /// Append a provider; insertion order is fallback priority
    pub fn provider(mut self, provider: Arc<dyn PushProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Append several providers in order
    pub fn providers(mut self, providers: impl IntoIterator<Item = Arc<dyn PushProvider>>) -> Self {
        self.providers.extend(providers);
        self
    }

    /// Try providers hosted by system applications first
    pub fn select_system_preferred(mut self, enabled: bool) -> Self {
        self.select_system_preferred = enabled;
        self
    }

    /// Register again when the current provider becomes unavailable
    pub fn recover_provider(mut self, enabled: bool) -> Self {
        self.recover_provider = enabled;
        self
    }

    /// Retry transient failures with this policy
    pub fn backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Some(Arc::new(backoff));
        self
    }

    /// Finish, rejecting duplicate provider names
    pub fn build(self) -> Result<Options> {
        let mut seen = HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.name()) {
                return Err(Error::config(format!(
                    "Duplicate provider name: {}",
                    provider.name()
                )));
            }
        }

        Ok(Options {
            providers: self.providers,
            select_system_preferred: self.select_system_preferred,
            recover_provider: self.recover_provider,
            backoff: self.backoff,
        })
    }
}
