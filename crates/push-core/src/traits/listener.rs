// # Listener Traits
//
// Application-facing callbacks.
//
// - [`PushEventListener`]: registration lifecycle, delivered in order by the
//   listener dispatcher task
// - [`MessageListener`]: incoming messages, forwarded on the caller's task

use crate::traits::ProviderError;

/// Registration lifecycle events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// A provider registered successfully
    Registered {
        provider_name: String,
        registration_id: String,
    },

    /// A registration attempt failed
    RegistrationError {
        provider_name: String,
        error: ProviderError,
    },

    /// The registered provider was unregistered
    Unregistered {
        provider_name: String,
        registration_id: String,
    },

    /// Unregistration failed, the registration is kept
    UnregistrationError {
        provider_name: String,
        error: ProviderError,
    },

    /// Every configured provider was tried and none could register
    NoAvailableProvider,

    /// A provider stopped being usable on this device
    ProviderBecameUnavailable { provider_name: String },
}

/// Receives registration lifecycle events
///
/// All callbacks run on the dispatcher task, one at a time, in the order the
/// orchestrator produced them. Implementations should return quickly.
pub trait PushEventListener: Send + Sync {
    /// Entry point used by the dispatcher; routes to the typed callbacks
    fn on_event(&self, event: &PushEvent) {
        match event {
            PushEvent::Registered {
                provider_name,
                registration_id,
            } => self.on_registered(provider_name, registration_id),
            PushEvent::RegistrationError {
                provider_name,
                error,
            } => self.on_registration_error(provider_name, *error),
            PushEvent::Unregistered {
                provider_name,
                registration_id,
            } => self.on_unregistered(provider_name, registration_id),
            PushEvent::UnregistrationError {
                provider_name,
                error,
            } => self.on_unregistration_error(provider_name, *error),
            PushEvent::NoAvailableProvider => self.on_no_available_provider(),
            PushEvent::ProviderBecameUnavailable { provider_name } => {
                self.on_provider_became_unavailable(provider_name)
            }
        }
    }

    fn on_registered(&self, _provider_name: &str, _registration_id: &str) {}

    fn on_registration_error(&self, _provider_name: &str, _error: ProviderError) {}

    fn on_unregistered(&self, _provider_name: &str, _last_registration_id: &str) {}

    fn on_unregistration_error(&self, _provider_name: &str, _error: ProviderError) {}

    fn on_no_available_provider(&self) {}

    fn on_provider_became_unavailable(&self, _provider_name: &str) {}
}

/// Receives messages from the registered provider
pub trait MessageListener: Send + Sync {
    /// A message arrived
    fn on_message(&self, provider_name: &str, payload: &serde_json::Value);

    /// The server dropped pending messages; `count` is `None` when unknown
    fn on_deleted_messages(&self, _provider_name: &str, _count: Option<u32>) {}
}
