//! Registration orchestrator
//!
//! The orchestrator owns the registration state machine. It selects a
//! provider, drives registration and unregistration, applies the backoff
//! policy, persists every transition and restores the state on `init()`.
//!
//! ## Architecture
//!
//! ```text
//!  application ──register()/unregister()──┐
//!                                         ▼
//!                              ┌─────────────────────┐
//!  provider ──ProviderCallback──▶ PushOrchestrator   │──▶ StateStore (save)
//!  scheduler ──RetryHandle─────▶  (registration lock)│──▶ RetryScheduler
//!  platform ──on_provider_*────▶                     │──▶ ListenerDispatcher
//!                              └─────────────────────┘
//!                                         │
//!                                         ▼
//!                           PushProvider::register()/unregister()
//! ```
//!
//! ## State Machine
//!
//! | From          | Event                              | To            |
//! |---------------|------------------------------------|---------------|
//! | Unregistered  | `register()`                       | Registering   |
//! | Registering   | provider success                   | Registered    |
//! | Registering   | transient error, tries left        | Registering   |
//! | Registering   | error, no retry                    | Registering (next) / Unregistered |
//! | Registered    | `unregister()`                     | Unregistering |
//! | Registered    | provider becomes unavailable       | Unregistered  |
//! | Unregistering | unregistration success             | Unregistered  |
//! | Unregistering | unregistration error               | Registered    |
//!
//! ## Locking
//!
//! `init()` sets the options once through a `OnceLock`. Everything else that
//! reads or changes the state runs under one async mutex, the registration
//! lock. Provider calls are fire-and-forget, so the lock is only held for the
//! bookkeeping around them.

mod funnel;

pub use funnel::can_handle;

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::Options;
use crate::dispatch::ListenerDispatcher;
use crate::error::{Error, Result};
use crate::scheduler::TokioRetryScheduler;
use crate::traits::{
    DefaultPlatform, MessageListener, OutboundMessage, PersistedState, Platform, ProviderError,
    PushEvent, PushEventListener, PushProvider, PushResult, RegistrationState, RetryScheduler,
    ScheduledRetry, StateStore,
};

/// Outcome of trying a single provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    /// `register()` was called; the result arrives through the callback
    Started,
    /// The provider cannot be used on this device
    Unavailable,
    /// The attempt failed right away and a delayed retry is scheduled
    Deferred,
    /// The attempt failed right away and will not be retried
    Failed,
}

/// Everything an operation must put back when it fails halfway
type Snapshot = (PersistedState, Option<Arc<dyn PushProvider>>);

/// State guarded by the registration lock
struct RegistrationCore {
    persisted: PersistedState,
    current: Option<Arc<dyn PushProvider>>,
}

impl RegistrationCore {
    fn state(&self) -> RegistrationState {
        self.persisted.state
    }

    /// Move to `next`, setting the current provider in the same step
    fn enter(&mut self, next: RegistrationState, current: Option<Arc<dyn PushProvider>>) {
        let previous = self.persisted.state;
        debug_assert!(
            previous.can_transition_to(next),
            "illegal transition {} -> {}",
            previous,
            next
        );
        debug_assert_eq!(next.has_current_provider(), current.is_some());

        if previous != next {
            info!("Registration state: {} -> {}", previous, next);
        }

        self.persisted.state = next;
        self.current = current;
        self.persisted.touch();
    }

    /// Set the state loaded at startup; no transition is taking place
    fn restore(&mut self, state: RegistrationState, current: Option<Arc<dyn PushProvider>>) {
        info!("Registration state restored: {}", state);
        self.persisted.state = state;
        self.current = current;
        self.persisted.touch();
    }

    fn snapshot(&self) -> Snapshot {
        (self.persisted.clone(), self.current.clone())
    }

    fn rollback(&mut self, (persisted, current): Snapshot) {
        warn!("Reverting registration state to {}", persisted.state);
        self.persisted = persisted;
        self.current = current;
    }

    fn is_current(&self, provider_name: &str) -> bool {
        self.current
            .as_ref()
            .is_some_and(|p| p.name().eq_ignore_ascii_case(provider_name))
    }
}

struct Inner {
    this: Weak<Inner>,
    options: OnceLock<Options>,
    registration: Mutex<RegistrationCore>,
    store: Arc<dyn StateStore>,
    scheduler: Arc<dyn RetryScheduler>,
    platform: Arc<dyn Platform>,
    dispatcher: ListenerDispatcher,
    message_listener: Option<Arc<dyn MessageListener>>,
}

impl Inner {
    fn options(&self) -> Result<&Options> {
        self.options.get().ok_or(Error::NotInitialized)
    }

    async fn persist(&self, core: &mut RegistrationCore) -> Result<()> {
        core.persisted.touch();
        self.store.save(&core.persisted).await.inspect_err(|e| {
            error!("Failed to persist registration state: {}", e);
        })
    }

    fn reset_backoff(&self, options: &Options) {
        if let Some(backoff) = options.backoff() {
            backoff.reset();
        }
    }

    async fn init(&self, options: Options) -> Result<()> {
        let mut core = self.registration.lock().await;
        if self.options.get().is_some() {
            return Err(Error::AlreadyInitialized);
        }

        let persisted = self.store.load().await?;
        self.options
            .set(options)
            .map_err(|_| Error::AlreadyInitialized)?;
        let options = self.options()?;

        info!(
            "Initializing push orchestrator with {} provider(s), stored state {}",
            options.providers().len(),
            persisted.state
        );

        core.persisted = persisted;
        core.current = None;
        self.restore_locked(&mut core, options).await
    }

    async fn restore_locked(&self, core: &mut RegistrationCore, options: &Options) -> Result<()> {
        let stored = core.state();
        let last = core.persisted.last_provider_name.clone();

        let Some((index, provider)) = last.as_deref().and_then(|name| options.provider(name))
        else {
            if let Some(name) = &last {
                warn!("Stored provider '{}' is not configured, clearing state", name);
            }
            if !core.persisted.is_cleared() {
                core.persisted = PersistedState::new();
                self.store.clear().await?;
            }
            return Ok(());
        };
        let provider = Arc::clone(provider);

        if !provider.is_available() {
            info!(
                "Stored provider '{}' is no longer available, state {} dropped",
                provider.name(),
                stored
            );
            core.persisted = PersistedState::new();
            self.store.clear().await?;
            return self.provider_gone_locked(core, options, &provider).await;
        }

        let identity_changed = match (
            core.persisted.last_device_identity.as_deref(),
            self.platform.device_identity(),
        ) {
            (Some(stored), Some(current)) => stored != current,
            _ => false,
        };

        if provider.is_registered() && !identity_changed {
            core.persisted.pending_retry_at = None;
            core.restore(RegistrationState::Registered, Some(Arc::clone(&provider)));
            self.persist(core).await?;
            self.platform
                .watch_provider(provider.name(), provider.host_app_package());

            // The result of an interrupted registration was lost with the old process
            if stored == RegistrationState::Registering {
                self.dispatcher.dispatch(PushEvent::Registered {
                    provider_name: provider.name().to_string(),
                    registration_id: provider.registration_id().unwrap_or_default(),
                });
            }
            return Ok(());
        }

        if identity_changed {
            warn!(
                "Device identity changed since registration with '{}', registering again",
                provider.name()
            );
            provider.on_registration_invalid();
            core.persisted.last_device_identity = None;
        }

        core.restore(RegistrationState::Registering, None);

        if let Some(deadline) = core.persisted.pending_retry_at {
            info!(
                "Re-arming retry of provider '{}' at {}",
                provider.name(),
                deadline
            );
            self.persist(core).await?;
            self.scheduler
                .schedule(
                    ScheduledRetry::new(provider.name(), deadline),
                    self.retry_handle(provider.name()),
                )
                .await;
            return Ok(());
        }

        info!("Resuming registration with provider '{}'", provider.name());
        match self.try_provider(core, options, &provider).await? {
            Attempt::Started | Attempt::Deferred => Ok(()),
            Attempt::Unavailable | Attempt::Failed => {
                self.select_from(core, options, index + 1, &[]).await
            }
        }
    }

    async fn register_locked(&self, core: &mut RegistrationCore, options: &Options) -> Result<()> {
        match core.state() {
            RegistrationState::Registering => {
                debug!("Registration already in progress");
                Ok(())
            }
            state @ (RegistrationState::Registered | RegistrationState::Unregistering) => {
                Err(Error::invalid_state("register", state))
            }
            RegistrationState::Unregistered => {
                // A failed save must not leave Registering behind with nothing in flight
                let snapshot = core.snapshot();
                let result = self.start_registration(core, options).await;
                if result.is_err() {
                    core.rollback(snapshot);
                }
                result
            }
        }
    }

    async fn start_registration(&self, core: &mut RegistrationCore, options: &Options) -> Result<()> {
        core.enter(RegistrationState::Registering, None);
        self.persist(core).await?;

        // Providers hosted by system applications go first, each at most once
        let mut tried = Vec::new();
        if options.is_select_system_preferred() {
            for (index, provider) in options.providers().iter().enumerate() {
                if !self.platform.is_system_package(provider.host_app_package()) {
                    continue;
                }

                debug!("Trying system preferred provider '{}'", provider.name());
                match self.try_provider(core, options, provider).await? {
                    Attempt::Started | Attempt::Deferred => return Ok(()),
                    Attempt::Unavailable | Attempt::Failed => tried.push(index),
                }
            }
        }

        self.select_from(core, options, 0, &tried).await
    }

    /// Walk the provider list from `start` until one attempt is under way
    ///
    /// Indices in `skip` were already tried by this scan. Reaching the end of
    /// the list is exhaustion: there is no wrap-around.
    async fn select_from(
        &self,
        core: &mut RegistrationCore,
        options: &Options,
        start: usize,
        skip: &[usize],
    ) -> Result<()> {
        for (index, provider) in options.providers().iter().enumerate().skip(start) {
            if skip.contains(&index) {
                continue;
            }
            match self.try_provider(core, options, provider).await? {
                Attempt::Started | Attempt::Deferred => return Ok(()),
                Attempt::Unavailable | Attempt::Failed => continue,
            }
        }

        warn!("No available provider to register with");
        core.persisted.last_provider_name = None;
        core.persisted.pending_retry_at = None;
        core.enter(RegistrationState::Unregistered, None);
        self.persist(core).await?;
        self.dispatcher.dispatch(PushEvent::NoAvailableProvider);
        Ok(())
    }

    async fn try_provider(
        &self,
        core: &mut RegistrationCore,
        options: &Options,
        provider: &Arc<dyn PushProvider>,
    ) -> Result<Attempt> {
        if !provider.is_available() {
            debug!("Provider '{}' is not available, skipping", provider.name());
            return Ok(Attempt::Unavailable);
        }

        core.persisted.last_provider_name = Some(provider.name().to_string());
        core.persisted.pending_retry_at = None;

        if !self.platform.is_network_connected() {
            warn!(
                "No network connectivity, registration with '{}' not attempted",
                provider.name()
            );
            self.dispatcher.dispatch(PushEvent::RegistrationError {
                provider_name: provider.name().to_string(),
                error: ProviderError::ServiceNotAvailable,
            });

            if self.retry_later(core, options, provider.name()).await {
                return Ok(Attempt::Deferred);
            }
            self.reset_backoff(options);
            return Ok(Attempt::Failed);
        }

        self.persist(core).await?;
        debug!("Registering with provider '{}'", provider.name());
        provider.register();
        Ok(Attempt::Started)
    }

    /// Schedule a delayed retry of `provider_name` if the backoff allows one
    ///
    /// The attempt is counted before its delay is read, so the first retry
    /// after a reset waits two seconds. On a failed save the persisted retry
    /// fields are put back and nothing is scheduled.
    async fn schedule_retry(
        &self,
        core: &mut RegistrationCore,
        options: &Options,
        provider_name: &str,
    ) -> Result<bool> {
        let Some(backoff) = options.backoff() else {
            return Ok(false);
        };

        if !backoff.has_tries() {
            info!("Backoff exhausted for provider '{}'", provider_name);
            return Ok(false);
        }

        let delay = backoff.try_delay()?;
        let deadline = Utc::now()
            + chrono::Duration::from_std(delay)
                .map_err(|e| Error::Other(format!("Retry delay out of range: {}", e)))?;

        let previous = (
            core.persisted.last_provider_name.clone(),
            core.persisted.pending_retry_at,
        );
        core.persisted.last_provider_name = Some(provider_name.to_string());
        core.persisted.pending_retry_at = Some(deadline);
        if let Err(e) = self.persist(core).await {
            (
                core.persisted.last_provider_name,
                core.persisted.pending_retry_at,
            ) = previous;
            return Err(e);
        }

        info!("Retrying provider '{}' in {:?}", provider_name, delay);
        self.scheduler
            .schedule(
                ScheduledRetry::new(provider_name, deadline),
                self.retry_handle(provider_name),
            )
            .await;
        Ok(true)
    }

    /// Schedule a retry, treating a failed save as "no retry"
    ///
    /// The caller then moves on to the next provider instead of waiting for a
    /// retry nothing would fire.
    async fn retry_later(
        &self,
        core: &mut RegistrationCore,
        options: &Options,
        provider_name: &str,
    ) -> bool {
        self.schedule_retry(core, options, provider_name)
            .await
            .unwrap_or_else(|e| {
                warn!("Retry of provider '{}' not scheduled: {}", provider_name, e);
                false
            })
    }

    async fn retry_register(&self, provider_name: &str) -> Result<()> {
        let options = self.options()?;
        let mut core = self.registration.lock().await;

        let expected = core.state() == RegistrationState::Registering
            && core.persisted.pending_retry_at.is_some()
            && core.persisted.last_provider_name.as_deref() == Some(provider_name);
        if !expected {
            warn!(
                "Ignoring stale retry of provider '{}' while {}",
                provider_name,
                core.state()
            );
            return Ok(());
        }

        let (index, provider) = options
            .provider(provider_name)
            .ok_or_else(|| Error::provider_not_found(provider_name))?;
        let provider = Arc::clone(provider);

        debug!("Retry deadline reached for provider '{}'", provider_name);
        match self.try_provider(&mut core, options, &provider).await? {
            Attempt::Started | Attempt::Deferred => Ok(()),
            Attempt::Unavailable | Attempt::Failed => {
                self.reset_backoff(options);
                self.select_from(&mut core, options, index + 1, &[]).await
            }
        }
    }

    async fn unregister(&self) -> Result<()> {
        let options = self.options()?;
        let mut core = self.registration.lock().await;

        match core.state() {
            RegistrationState::Unregistering => {
                debug!("Unregistration already in progress");
                Ok(())
            }
            state @ (RegistrationState::Registering | RegistrationState::Unregistered) => {
                Err(Error::invalid_state("unregister", state))
            }
            RegistrationState::Registered => {
                let provider = core.current.clone().ok_or(Error::NotRegistered)?;
                core.enter(RegistrationState::Unregistering, Some(Arc::clone(&provider)));
                self.persist(&mut core).await?;

                self.platform.unwatch_provider();
                self.reset_backoff(options);
                debug!("Unregistering from provider '{}'", provider.name());
                provider.unregister();
                Ok(())
            }
        }
    }

    async fn on_provider_unavailable(&self, provider_name: &str) -> Result<()> {
        let options = self.options()?;
        let provider = options
            .provider(provider_name)
            .map(|(_, p)| Arc::clone(p))
            .ok_or_else(|| Error::provider_not_found(provider_name))?;

        let mut core = self.registration.lock().await;
        self.provider_gone_locked(&mut core, options, &provider).await
    }

    async fn provider_gone_locked(
        &self,
        core: &mut RegistrationCore,
        options: &Options,
        provider: &Arc<dyn PushProvider>,
    ) -> Result<()> {
        if core.is_current(provider.name()) {
            info!("Current provider '{}' became unavailable", provider.name());
            self.platform.unwatch_provider();
            core.persisted.last_provider_name = None;
            core.persisted.pending_retry_at = None;
            core.enter(RegistrationState::Unregistered, None);
            self.persist(core).await?;
        }

        provider.on_unavailable();
        self.dispatcher.dispatch(PushEvent::ProviderBecameUnavailable {
            provider_name: provider.name().to_string(),
        });

        if options.is_recover_provider() {
            if core.state() == RegistrationState::Unregistered {
                info!("Recovering registration after '{}' went away", provider.name());
                return self.register_locked(core, options).await;
            }
            debug!("Not recovering while {}", core.state());
        }
        Ok(())
    }

    async fn on_registration_invalid(&self) -> Result<()> {
        let options = self.options()?;
        let mut core = self.registration.lock().await;

        let provider = core
            .current
            .clone()
            .ok_or_else(|| Error::invalid_state("revalidate registration", core.state()))?;
        let index = options
            .provider(provider.name())
            .map(|(i, _)| i)
            .ok_or_else(|| Error::provider_not_found(provider.name()))?;

        info!("Registration with '{}' is no longer valid", provider.name());
        self.platform.unwatch_provider();
        core.enter(RegistrationState::Unregistered, None);
        core.persisted = PersistedState::new();
        self.store.clear().await?;

        provider.on_registration_invalid();
        self.reset_backoff(options);

        core.enter(RegistrationState::Registering, None);
        self.persist(&mut core).await?;

        match self.try_provider(&mut core, options, &provider).await? {
            Attempt::Started | Attempt::Deferred => Ok(()),
            Attempt::Unavailable => {
                warn!(
                    "Provider '{}' is no longer available, staying unregistered",
                    provider.name()
                );
                core.persisted.last_provider_name = None;
                core.enter(RegistrationState::Unregistered, None);
                self.persist(&mut core).await
            }
            Attempt::Failed => self.select_from(&mut core, options, index + 1, &[]).await,
        }
    }

    async fn restart_registration(&self) -> Result<()> {
        let options = self.options()?;
        let mut core = self.registration.lock().await;

        info!("Restarting registration from a cleared state");
        self.scheduler.cancel().await;
        if core.current.is_some() {
            self.platform.unwatch_provider();
        }
        if core.state() != RegistrationState::Unregistered {
            core.enter(RegistrationState::Unregistered, None);
        }
        core.persisted = PersistedState::new();
        self.store.clear().await?;
        self.reset_backoff(options);

        self.register_locked(&mut core, options).await
    }

    /// Check that a message really comes from the registered provider
    async fn check_message_source(&self, provider_name: &str) -> Result<()> {
        self.options()?;
        let core = self.registration.lock().await;

        let current = match &core.current {
            Some(current) if core.state().has_current_provider() => current,
            _ => return Err(Error::NotRegistered),
        };

        if !core.is_current(provider_name) {
            return Err(Error::UnexpectedProvider {
                current: current.name().to_string(),
                reported: provider_name.to_string(),
            });
        }
        Ok(())
    }

    async fn on_message(&self, provider_name: &str, payload: &serde_json::Value) -> Result<()> {
        self.check_message_source(provider_name).await?;
        match &self.message_listener {
            Some(listener) => listener.on_message(provider_name, payload),
            None => debug!("Message from '{}' dropped, no listener", provider_name),
        }
        Ok(())
    }

    async fn on_deleted_messages(&self, provider_name: &str, count: Option<u32>) -> Result<()> {
        self.check_message_source(provider_name).await?;
        if let Some(listener) = &self.message_listener {
            listener.on_deleted_messages(provider_name, count);
        }
        Ok(())
    }

    async fn on_result(&self, result: PushResult) -> Result<()> {
        let options = self.options()?;
        let mut core = self.registration.lock().await;
        self.handle_result(&mut core, options, result).await
    }

    fn retry_handle(&self, provider_name: &str) -> RetryHandle {
        RetryHandle {
            inner: self.this.clone(),
            provider_name: provider_name.to_string(),
        }
    }
}

/// Handle the retry scheduler fires when a retry deadline passes
#[derive(Debug, Clone)]
pub struct RetryHandle {
    inner: Weak<Inner>,
    provider_name: String,
}

impl RetryHandle {
    /// Provider the retry is for
    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    /// Run the retry
    ///
    /// Ignored when the orchestrator has moved on since the retry was
    /// scheduled.
    pub async fn fire(self) -> Result<()> {
        let inner = self.inner.upgrade().ok_or(Error::OrchestratorDropped)?;
        inner.retry_register(&self.provider_name).await
    }
}

/// Handle providers report results and messages through
///
/// Cheap to clone and safe to use from any task. It does not keep the
/// orchestrator alive.
#[derive(Debug, Clone)]
pub struct ProviderCallback {
    inner: Weak<Inner>,
}

impl ProviderCallback {
    fn upgrade(&self) -> Result<Arc<Inner>> {
        self.inner.upgrade().ok_or(Error::OrchestratorDropped)
    }

    /// Report the result of a `register()` or `unregister()` call
    pub async fn on_result(&self, result: PushResult) -> Result<()> {
        self.upgrade()?.on_result(result).await
    }

    /// Forward an incoming message
    pub async fn on_message(&self, provider_name: &str, payload: &serde_json::Value) -> Result<()> {
        self.upgrade()?.on_message(provider_name, payload).await
    }

    /// Report that the server dropped pending messages
    pub async fn on_deleted_messages(&self, provider_name: &str, count: Option<u32>) -> Result<()> {
        self.upgrade()?
            .on_deleted_messages(provider_name, count)
            .await
    }
}

/// Push registration orchestrator
///
/// One instance per application, shared by cloning. Build it with
/// [`PushOrchestrator::builder`], hand [`PushOrchestrator::provider_callback`]
/// to the providers, then call [`PushOrchestrator::init`] once.
///
/// # Example
///
/// ```rust,ignore
/// let orchestrator = PushOrchestrator::builder(Arc::new(MemoryStateStore::new()))
///     .listener(Arc::new(MyListener))
///     .build();
///
/// let callback = orchestrator.provider_callback();
/// let options = Options::builder()
///     .provider(Arc::new(MyProvider::new(callback)))
///     .build()?;
///
/// orchestrator.init(options).await?;
/// orchestrator.register().await?;
/// ```
#[derive(Clone)]
pub struct PushOrchestrator {
    inner: Arc<Inner>,
}

impl PushOrchestrator {
    /// Start building an orchestrator persisting into `store`
    pub fn builder(store: Arc<dyn StateStore>) -> PushOrchestratorBuilder {
        PushOrchestratorBuilder {
            store,
            scheduler: None,
            platform: None,
            listener: None,
            message_listener: None,
        }
    }

    /// Set the options and restore the persisted state
    ///
    /// Fails with [`Error::AlreadyInitialized`] on the second call.
    pub async fn init(&self, options: Options) -> Result<()> {
        self.inner.init(options).await
    }

    /// Whether `init()` has completed
    pub fn is_init_done(&self) -> bool {
        self.inner.options.get().is_some()
    }

    /// Options set by `init()`
    pub fn options(&self) -> Option<&Options> {
        self.inner.options.get()
    }

    /// Start registration with the first usable provider
    pub async fn register(&self) -> Result<()> {
        let options = self.inner.options()?;
        let mut core = self.inner.registration.lock().await;
        self.inner.register_locked(&mut core, options).await
    }

    /// Unregister from the current provider
    pub async fn unregister(&self) -> Result<()> {
        self.inner.unregister().await
    }

    /// Result funnel entry point
    pub async fn on_result(&self, result: PushResult) -> Result<()> {
        self.inner.on_result(result).await
    }

    /// A provider can no longer be used on this device
    pub async fn on_provider_unavailable(&self, provider_name: &str) -> Result<()> {
        self.inner.on_provider_unavailable(provider_name).await
    }

    /// Retry registration with `provider_name` after a backoff delay
    ///
    /// Called by the retry scheduler. Ignored unless a retry of that provider
    /// is pending.
    pub async fn retry_register(&self, provider_name: &str) -> Result<()> {
        self.inner.retry_register(provider_name).await
    }

    /// The current registration was invalidated and must be redone
    pub async fn on_registration_invalid(&self) -> Result<()> {
        self.inner.on_registration_invalid().await
    }

    /// Drop all persisted state and register from scratch
    pub async fn restart_registration(&self) -> Result<()> {
        self.inner.restart_registration().await
    }

    /// Forward an incoming message from `provider_name`
    pub async fn on_message(&self, provider_name: &str, payload: &serde_json::Value) -> Result<()> {
        self.inner.on_message(provider_name, payload).await
    }

    /// The server dropped pending messages for `provider_name`
    pub async fn on_deleted_messages(&self, provider_name: &str, count: Option<u32>) -> Result<()> {
        self.inner.on_deleted_messages(provider_name, count).await
    }

    /// Whether the current provider can send upstream messages
    pub async fn can_send_messages(&self) -> bool {
        let core = self.inner.registration.lock().await;
        core.current.as_ref().is_some_and(|p| p.sender().is_some())
    }

    /// Send an upstream message through the current provider
    pub async fn send_message(&self, message: OutboundMessage) -> Result<()> {
        let core = self.inner.registration.lock().await;
        let provider = core.current.as_ref().ok_or(Error::NotRegistered)?;
        let sender = provider
            .sender()
            .ok_or_else(|| Error::SendNotSupported(provider.name().to_string()))?;

        debug!("Sending message '{}' via '{}'", message.id, provider.name());
        sender.send(message);
        Ok(())
    }

    /// Handle providers report through
    pub fn provider_callback(&self) -> ProviderCallback {
        ProviderCallback {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Current registration state
    pub async fn state(&self) -> RegistrationState {
        self.inner.registration.lock().await.state()
    }

    /// Registered or unregistering, i.e. a current provider is set
    pub async fn is_registered(&self) -> bool {
        self.state().await.has_current_provider()
    }

    /// Whether a registration is in progress
    pub async fn is_registering(&self) -> bool {
        self.state().await == RegistrationState::Registering
    }

    /// Whether an unregistration is in progress
    pub async fn is_unregistering(&self) -> bool {
        self.state().await == RegistrationState::Unregistering
    }

    /// Whether no provider is registered or being registered
    pub async fn is_unregistered(&self) -> bool {
        self.state().await == RegistrationState::Unregistered
    }

    /// Provider the application is registered with
    pub async fn current_provider(&self) -> Option<Arc<dyn PushProvider>> {
        self.inner.registration.lock().await.current.clone()
    }

    /// Registration id issued by the current provider
    pub async fn registration_id(&self) -> Option<String> {
        self.current_provider()
            .await
            .and_then(|p| p.registration_id())
    }

    /// Whether any configured provider is usable right now
    pub fn has_available_provider(&self) -> bool {
        self.inner
            .options
            .get()
            .is_some_and(|o| o.providers().iter().any(|p| p.is_available()))
    }

    /// Snapshot of the state as last persisted
    pub async fn persisted_state(&self) -> PersistedState {
        self.inner.registration.lock().await.persisted.clone()
    }

    /// Stop timers, flush the store and deliver the queued events
    ///
    /// A pending retry deadline stays persisted and is re-armed by the next
    /// `init()`.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down push orchestrator");
        {
            let _core = self.inner.registration.lock().await;
            self.inner.scheduler.cancel().await;
            self.inner.store.flush().await?;
        }
        self.inner.dispatcher.shutdown().await;
        Ok(())
    }
}

impl fmt::Debug for PushOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushOrchestrator")
            .field("options", &self.inner.options.get())
            .finish_non_exhaustive()
    }
}

/// Builder for [`PushOrchestrator`]
pub struct PushOrchestratorBuilder {
    store: Arc<dyn StateStore>,
    scheduler: Option<Arc<dyn RetryScheduler>>,
    platform: Option<Arc<dyn Platform>>,
    listener: Option<Arc<dyn PushEventListener>>,
    message_listener: Option<Arc<dyn MessageListener>>,
}

impl PushOrchestratorBuilder {
    /// Use a custom retry scheduler instead of tokio timers
    pub fn scheduler(mut self, scheduler: Arc<dyn RetryScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Use platform services other than [`DefaultPlatform`]
    pub fn platform(mut self, platform: Arc<dyn Platform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Receive registration lifecycle events
    pub fn listener(mut self, listener: Arc<dyn PushEventListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Receive incoming messages
    pub fn message_listener(mut self, listener: Arc<dyn MessageListener>) -> Self {
        self.message_listener = Some(listener);
        self
    }

    /// Build the orchestrator and start its dispatcher task
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> PushOrchestrator {
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(TokioRetryScheduler::new()));
        let platform = self.platform.unwrap_or_else(|| Arc::new(DefaultPlatform));
        let dispatcher = ListenerDispatcher::spawn(self.listener);

        let inner = Arc::new_cyclic(|this| Inner {
            this: this.clone(),
            options: OnceLock::new(),
            registration: Mutex::new(RegistrationCore {
                persisted: PersistedState::new(),
                current: None,
            }),
            store: self.store,
            scheduler,
            platform,
            dispatcher,
            message_listener: self.message_listener,
        });

        PushOrchestrator { inner }
    }
}
