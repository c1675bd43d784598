//! Result funnel
//!
//! Every asynchronous provider result passes through here. A result is
//! first checked against the registration state; a result the state cannot
//! accept (a late registration success after `unregister()` started, for
//! instance) is rejected with [`Error::UnhandleableResult`] and changes
//! nothing. Accepted results are routed into transitions.
//!
//! | kind           | accepted while                |
//! |----------------|-------------------------------|
//! | Registration   | Registering                   |
//! | Unregistration | Unregistering                 |
//! | Unknown        | Registering or Unregistering  |

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{Inner, RegistrationCore};
use crate::config::Options;
use crate::error::{Error, Result};
use crate::traits::{
    PersistedState, ProviderError, PushEvent, PushResult, RegistrationState, ResultKind,
};

/// Whether a result of `kind` may be handled in `state`
pub fn can_handle(kind: ResultKind, state: RegistrationState) -> bool {
    route(kind, state).is_some()
}

/// Resolve the operation a result belongs to, `None` if it is not acceptable
fn route(kind: ResultKind, state: RegistrationState) -> Option<ResultKind> {
    match (kind, state) {
        (ResultKind::Registration, RegistrationState::Registering) => Some(kind),
        (ResultKind::Unregistration, RegistrationState::Unregistering) => Some(kind),
        (ResultKind::Unknown, RegistrationState::Registering) => Some(ResultKind::Registration),
        (ResultKind::Unknown, RegistrationState::Unregistering) => {
            Some(ResultKind::Unregistration)
        }
        _ => None,
    }
}

impl Inner {
    pub(super) async fn handle_result(
        &self,
        core: &mut RegistrationCore,
        options: &Options,
        result: PushResult,
    ) -> Result<()> {
        let state = core.state();
        let Some(kind) = route(result.kind, state) else {
            warn!(
                "Rejecting {} result from '{}' while {}",
                result.kind, result.provider_name, state
            );
            return Err(Error::UnhandleableResult {
                kind: result.kind,
                state,
            });
        };

        debug!("Handling {} result from '{}'", kind, result.provider_name);
        match (kind, result.error()) {
            (ResultKind::Registration, None) => {
                self.on_registration_success(core, options, &result).await
            }
            (ResultKind::Registration, Some(error)) => {
                self.on_registration_failure(core, options, &result.provider_name, error)
                    .await
            }
            (_, None) => self.on_unregistration_success(core, options, &result).await,
            (_, Some(error)) => self.on_unregistration_failure(core, error).await,
        }
    }

    async fn on_registration_success(
        &self,
        core: &mut RegistrationCore,
        options: &Options,
        result: &PushResult,
    ) -> Result<()> {
        let (_, provider) = options
            .provider(&result.provider_name)
            .ok_or_else(|| Error::provider_not_found(&result.provider_name))?;
        let provider = Arc::clone(provider);
        let registration_id = result.registration_id().unwrap_or_default().to_string();

        self.reset_backoff(options);
        // A retry may still be pending if the provider answered late
        self.scheduler.cancel().await;

        core.persisted.last_provider_name = Some(provider.name().to_string());
        core.persisted.last_device_identity = self.platform.device_identity();
        core.persisted.pending_retry_at = None;
        core.enter(RegistrationState::Registered, Some(Arc::clone(&provider)));
        self.persist(core).await?;

        info!("Registered with provider '{}'", provider.name());
        self.dispatcher.dispatch(PushEvent::Registered {
            provider_name: provider.name().to_string(),
            registration_id,
        });
        self.platform
            .watch_provider(provider.name(), provider.host_app_package());
        Ok(())
    }

    async fn on_registration_failure(
        &self,
        core: &mut RegistrationCore,
        options: &Options,
        provider_name: &str,
        error: ProviderError,
    ) -> Result<()> {
        let (index, provider) = options
            .provider(provider_name)
            .ok_or_else(|| Error::provider_not_found(provider_name))?;

        warn!("Registration with '{}' failed: {}", provider.name(), error);
        self.dispatcher.dispatch(PushEvent::RegistrationError {
            provider_name: provider.name().to_string(),
            error,
        });

        if error.is_transient() && self.retry_later(core, options, provider.name()).await {
            return Ok(());
        }

        self.reset_backoff(options);
        self.select_from(core, options, index + 1, &[]).await
    }

    async fn on_unregistration_success(
        &self,
        core: &mut RegistrationCore,
        options: &Options,
        result: &PushResult,
    ) -> Result<()> {
        let provider_name = match &core.current {
            Some(current) => current.name().to_string(),
            None => result.provider_name.clone(),
        };
        let registration_id = result.registration_id().unwrap_or_default().to_string();

        core.enter(RegistrationState::Unregistered, None);
        core.persisted = PersistedState::new();
        self.store.clear().await?;
        self.reset_backoff(options);

        info!("Unregistered from provider '{}'", provider_name);
        self.dispatcher.dispatch(PushEvent::Unregistered {
            provider_name,
            registration_id,
        });
        Ok(())
    }

    async fn on_unregistration_failure(
        &self,
        core: &mut RegistrationCore,
        error: ProviderError,
    ) -> Result<()> {
        let provider = core.current.clone().ok_or(Error::NotRegistered)?;

        warn!(
            "Unregistration from '{}' failed: {}, keeping registration",
            provider.name(),
            error
        );
        core.enter(RegistrationState::Registered, Some(Arc::clone(&provider)));
        self.persist(core).await?;

        self.dispatcher.dispatch(PushEvent::UnregistrationError {
            provider_name: provider.name().to_string(),
            error,
        });
        self.platform
            .watch_provider(provider.name(), provider.host_app_package());
        Ok(())
    }
}
