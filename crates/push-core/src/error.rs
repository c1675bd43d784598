//! Error types for the push registration system
//!
//! Protocol misuse (calling an operation in a state that does not allow it)
//! is reported through tagged variants so callers can match on the cause.
//! Failures reported by providers are not errors of this crate; they travel
//! as [`crate::ProviderError`] inside results and listener events.

use thiserror::Error;

use crate::traits::{RegistrationState, ResultKind};

/// Result type alias for push operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the push registration system
#[derive(Error, Debug)]
pub enum Error {
    /// An operation was called before `init()`
    #[error("Orchestrator is not initialized, call init() first")]
    NotInitialized,

    /// `init()` was called a second time
    #[error("Orchestrator can be initialized only once")]
    AlreadyInitialized,

    /// The operation is not allowed in the current registration state
    #[error("Cannot {operation} while {state}")]
    InvalidStateTransition {
        /// Rejected operation
        operation: &'static str,
        /// State at the time of the call
        state: RegistrationState,
    },

    /// A provider delivered a result that the current state cannot accept
    #[error("Result of kind {kind} cannot be handled while {state}")]
    UnhandleableResult {
        /// Kind of the rejected result
        kind: ResultKind,
        /// State at the time of delivery
        state: RegistrationState,
    },

    /// No configured provider has the given name
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    /// A message arrived from a provider that is not the registered one
    #[error("Message from provider '{reported}' but current provider is '{current}'")]
    UnexpectedProvider {
        /// Name of the registered provider
        current: String,
        /// Name reported by the caller
        reported: String,
    },

    /// Messages can only be handled or sent while registered
    #[error("No provider is registered")]
    NotRegistered,

    /// The registered provider cannot send outbound messages
    #[error("Provider '{0}' does not support sending messages")]
    SendNotSupported(String),

    /// The backoff policy has no tries left
    #[error("Backoff exhausted after {max_tries} tries")]
    BackoffExhausted {
        /// Configured maximum try count
        max_tries: u32,
    },

    /// The orchestrator behind a callback or retry handle was dropped
    #[error("Orchestrator has been dropped")]
    OrchestratorDropped,

    /// State store-related errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid state transition error
    pub fn invalid_state(operation: &'static str, state: RegistrationState) -> Self {
        Self::InvalidStateTransition { operation, state }
    }

    /// Create a "provider not found" error
    pub fn provider_not_found(name: impl Into<String>) -> Self {
        Self::ProviderNotFound(name.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error signals a bug in the calling code rather than a
    /// runtime condition
    pub fn is_protocol_misuse(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized
                | Self::AlreadyInitialized
                | Self::InvalidStateTransition { .. }
                | Self::UnhandleableResult { .. }
                | Self::ProviderNotFound(_)
                | Self::UnexpectedProvider { .. }
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
