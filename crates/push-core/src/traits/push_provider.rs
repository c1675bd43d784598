// # Push Provider Trait
//
// Defines the interface every notification back-end implements.
//
// ## Implementations
//
// Concrete providers wrap a vendor SDK and live outside this crate. The
// orchestrator only consumes this trait.
//
// ## Usage
//
// ```rust,ignore
// use push_core::{PushProvider, PushResult};
//
// struct MyProvider { callback: push_core::ProviderCallback }
//
// impl PushProvider for MyProvider {
//     fn register(&self) {
//         let callback = self.callback.clone();
//         tokio::spawn(async move {
//             let id = vendor_sdk::register().await;
//             let _ = callback.on_result(PushResult::registered("my", id)).await;
//         });
//     }
//     // ...
// }
// ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Which operation a [`PushResult`] reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    /// Result of a `register()` call
    Registration,
    /// Result of an `unregister()` call
    Unregistration,
    /// The provider cannot tell; routed by the current state
    Unknown,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultKind::Registration => "registration",
            ResultKind::Unregistration => "unregistration",
            ResultKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Failure kinds a provider can report
///
/// Provider-specific failures are normalized into one of these before they
/// reach the orchestrator. Only [`ProviderError::ServiceNotAvailable`] is
/// considered transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum ProviderError {
    /// The back-end service cannot be reached right now
    #[error("service not available")]
    ServiceNotAvailable,
    /// The back-end rejected the application's credentials
    #[error("authentication failed")]
    AuthenticationFailed,
    /// The configured sender id is not accepted
    #[error("invalid sender")]
    InvalidSender,
    /// The request was malformed
    #[error("invalid parameters")]
    InvalidParameters,
    /// Anything the provider could not classify
    #[error("unknown error")]
    Unknown,
}

impl ProviderError {
    /// Whether the failure may go away on its own and is worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::ServiceNotAvailable)
    }
}

/// Outcome carried by a [`PushResult`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The operation succeeded with this registration id
    Success {
        /// Registration id issued (or released) by the provider
        registration_id: String,
    },
    /// The operation failed
    Failure {
        /// Normalized failure kind
        error: ProviderError,
    },
}

/// Asynchronous result reported by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResult {
    /// Operation the result belongs to
    pub kind: ResultKind,
    /// Name of the reporting provider
    pub provider_name: String,
    /// Success with a registration id, or failure with an error kind
    pub outcome: Outcome,
}

impl PushResult {
    /// Create a successful result of the given kind
    pub fn success(
        kind: ResultKind,
        provider_name: impl Into<String>,
        registration_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            provider_name: provider_name.into(),
            outcome: Outcome::Success {
                registration_id: registration_id.into(),
            },
        }
    }

    /// Create a failed result of the given kind
    pub fn failure(kind: ResultKind, provider_name: impl Into<String>, error: ProviderError) -> Self {
        Self {
            kind,
            provider_name: provider_name.into(),
            outcome: Outcome::Failure { error },
        }
    }

    /// Successful registration
    pub fn registered(provider_name: impl Into<String>, registration_id: impl Into<String>) -> Self {
        Self::success(ResultKind::Registration, provider_name, registration_id)
    }

    /// Failed registration
    pub fn registration_failed(provider_name: impl Into<String>, error: ProviderError) -> Self {
        Self::failure(ResultKind::Registration, provider_name, error)
    }

    /// Successful unregistration, carrying the released registration id
    pub fn unregistered(provider_name: impl Into<String>, registration_id: impl Into<String>) -> Self {
        Self::success(ResultKind::Unregistration, provider_name, registration_id)
    }

    /// Failed unregistration
    pub fn unregistration_failed(provider_name: impl Into<String>, error: ProviderError) -> Self {
        Self::failure(ResultKind::Unregistration, provider_name, error)
    }

    /// Whether the operation succeeded
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    /// Registration id, present iff the result is a success
    pub fn registration_id(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { registration_id } => Some(registration_id),
            Outcome::Failure { .. } => None,
        }
    }

    /// Error kind, present iff the result is a failure
    pub fn error(&self) -> Option<ProviderError> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { error } => Some(*error),
        }
    }
}

/// Outbound message handed to a provider that can talk back to its server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Message id, unique per sender
    pub id: String,
    /// Free-form payload
    pub data: serde_json::Value,
    /// How long the server should keep the message, in seconds
    pub time_to_live_secs: Option<u64>,
}

impl OutboundMessage {
    /// Create a message with the given id and payload
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            data,
            time_to_live_secs: None,
        }
    }
}

/// Optional capability of providers that can send upstream messages
pub trait MessageSender: Send + Sync {
    /// Send a message to the provider's server. Fire-and-forget.
    fn send(&self, message: OutboundMessage);
}

/// Trait for push provider implementations
///
/// `register()` and `unregister()` must return immediately. Completion is
/// reported later through the [`crate::ProviderCallback`] handle, from any
/// task or thread.
///
/// # Thread Safety
///
/// Implementations are shared between the orchestrator, its retry scheduler
/// and the provider's own callbacks, so they must be `Send + Sync`.
///
/// # Responsibilities
///
/// Providers must not retry on their own, pick fallbacks or touch the state
/// store. They report a single outcome per call and the orchestrator decides
/// what happens next.
pub trait PushProvider: Send + Sync {
    /// Unique, stable provider name
    fn name(&self) -> &str;

    /// Package identifier of the application hosting the provider's service
    fn host_app_package(&self) -> &str;

    /// Whether the provider can be used on this device right now
    fn is_available(&self) -> bool;

    /// Start registration. Fire-and-forget.
    fn register(&self);

    /// Start unregistration. Fire-and-forget.
    fn unregister(&self);

    /// Whether the provider holds a valid registration
    fn is_registered(&self) -> bool;

    /// Current registration id, if registered
    fn registration_id(&self) -> Option<String>;

    /// The stored registration is no longer valid and will be redone
    fn on_registration_invalid(&self) {}

    /// The provider was reported unavailable and is being dropped
    fn on_unavailable(&self) {}

    /// Sender capability, if the provider supports upstream messages
    fn sender(&self) -> Option<&dyn MessageSender> {
        None
    }
}

impl fmt::Debug for dyn PushProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushProvider")
            .field("name", &self.name())
            .field("host_app_package", &self.host_app_package())
            .finish()
    }
}

/// Helper trait for constructing providers from configuration
pub trait PushProviderFactory: Send + Sync {
    /// Create a provider instance
    ///
    /// # Parameters
    ///
    /// - `config`: Provider-specific configuration
    /// - `callback`: Handle the provider reports its results through
    fn create(
        &self,
        config: &serde_json::Value,
        callback: crate::ProviderCallback,
    ) -> Result<Arc<dyn PushProvider>, crate::Error>;
}
