//! Test doubles and common utilities for orchestrator contract tests
//!
//! The doubles record every call the orchestrator makes so tests can check
//! what happened without a real provider, timer or device.

#![allow(dead_code)]

use async_trait::async_trait;
use push_core::state::MemoryStateStore;
use push_core::traits::{
    MessageListener, MessageSender, OutboundMessage, Platform, PersistedState, PushEvent,
    PushProvider, RetryScheduler, ScheduledRetry, StateStore,
};
use push_core::{ChannelListener, Error, Options, PushOrchestrator, RetryHandle};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// How long to wait for an event before failing a test
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// A provider whose availability and registration status tests control
pub struct MockProvider {
    name: String,
    host_app_package: String,
    available: AtomicBool,
    registered: AtomicBool,
    can_send: bool,
    registration_id: Mutex<Option<String>>,
    register_calls: AtomicUsize,
    unregister_calls: AtomicUsize,
    invalid_calls: AtomicUsize,
    unavailable_calls: AtomicUsize,
    sent: Mutex<Vec<OutboundMessage>>,
}

impl MockProvider {
    /// Available, unregistered provider hosted by `com.example.<name>`
    pub fn new(name: &str) -> Arc<Self> {
        Self::build(name, &format!("com.example.{}", name), true, false)
    }

    /// Provider whose host application is `host_app_package`
    pub fn hosted_by(name: &str, host_app_package: &str) -> Arc<Self> {
        Self::build(name, host_app_package, true, false)
    }

    /// Provider that is not available on this device
    pub fn unavailable(name: &str) -> Arc<Self> {
        let provider = Self::new(name);
        provider.set_available(false);
        provider
    }

    /// Provider exposing the sender capability
    pub fn with_sender(name: &str) -> Arc<Self> {
        Self::build(name, &format!("com.example.{}", name), true, true)
    }

    fn build(name: &str, host_app_package: &str, available: bool, can_send: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            host_app_package: host_app_package.to_string(),
            available: AtomicBool::new(available),
            registered: AtomicBool::new(false),
            can_send,
            registration_id: Mutex::new(None),
            register_calls: AtomicUsize::new(0),
            unregister_calls: AtomicUsize::new(0),
            invalid_calls: AtomicUsize::new(0),
            unavailable_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Pretend the provider already holds `registration_id`
    pub fn set_registered(&self, registration_id: &str) {
        self.registered.store(true, Ordering::SeqCst);
        *self.registration_id.lock().unwrap() = Some(registration_id.to_string());
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn unregister_calls(&self) -> usize {
        self.unregister_calls.load(Ordering::SeqCst)
    }

    pub fn invalid_calls(&self) -> usize {
        self.invalid_calls.load(Ordering::SeqCst)
    }

    pub fn unavailable_calls(&self) -> usize {
        self.unavailable_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

impl PushProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn host_app_package(&self) -> &str {
        &self.host_app_package
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn register(&self) {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn unregister(&self) {
        self.unregister_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    fn registration_id(&self) -> Option<String> {
        self.registration_id.lock().unwrap().clone()
    }

    fn on_registration_invalid(&self) {
        self.invalid_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn on_unavailable(&self) {
        self.unavailable_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn sender(&self) -> Option<&dyn MessageSender> {
        if self.can_send {
            Some(self as &dyn MessageSender)
        } else {
            None
        }
    }
}

impl MessageSender for MockProvider {
    fn send(&self, message: OutboundMessage) {
        self.sent.lock().unwrap().push(message);
    }
}

/// A retry scheduler that only fires when the test says so
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Option<(ScheduledRetry, RetryHandle)>>,
    schedule_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
}

impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The retry waiting to be fired
    pub fn pending(&self) -> Option<ScheduledRetry> {
        self.pending.lock().unwrap().as_ref().map(|(r, _)| r.clone())
    }

    pub fn schedule_calls(&self) -> usize {
        self.schedule_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    /// Take the pending retry's handle without firing it
    pub fn take_handle(&self) -> Option<RetryHandle> {
        self.pending.lock().unwrap().take().map(|(_, h)| h)
    }

    /// Fire the pending retry as if its deadline had passed
    pub async fn fire(&self) -> push_core::Result<()> {
        let handle = self.take_handle().expect("a retry should be pending");
        handle.fire().await
    }
}

#[async_trait]
impl RetryScheduler for ManualScheduler {
    async fn schedule(&self, retry: ScheduledRetry, handle: RetryHandle) {
        self.schedule_calls.fetch_add(1, Ordering::SeqCst);
        *self.pending.lock().unwrap() = Some((retry, handle));
    }

    async fn cancel(&self) {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().unwrap().take();
    }
}

/// Platform whose facts tests can change
pub struct TestPlatform {
    system_packages: Mutex<HashSet<String>>,
    connected: AtomicBool,
    identity: Mutex<Option<String>>,
    watched: Mutex<Option<String>>,
    watch_calls: AtomicUsize,
    unwatch_calls: AtomicUsize,
}

impl TestPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            system_packages: Mutex::new(HashSet::new()),
            connected: AtomicBool::new(true),
            identity: Mutex::new(Some("device-1".to_string())),
            watched: Mutex::new(None),
            watch_calls: AtomicUsize::new(0),
            unwatch_calls: AtomicUsize::new(0),
        })
    }

    pub fn add_system_package(&self, package: &str) {
        self.system_packages
            .lock()
            .unwrap()
            .insert(package.to_string());
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_identity(&self, identity: Option<&str>) {
        *self.identity.lock().unwrap() = identity.map(str::to_string);
    }

    /// Provider currently watched for removal
    pub fn watched(&self) -> Option<String> {
        self.watched.lock().unwrap().clone()
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    pub fn unwatch_calls(&self) -> usize {
        self.unwatch_calls.load(Ordering::SeqCst)
    }
}

impl Platform for TestPlatform {
    fn is_system_package(&self, package: &str) -> bool {
        self.system_packages.lock().unwrap().contains(package)
    }

    fn is_network_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn device_identity(&self) -> Option<String> {
        self.identity.lock().unwrap().clone()
    }

    fn watch_provider(&self, provider_name: &str, _host_app_package: &str) {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        *self.watched.lock().unwrap() = Some(provider_name.to_string());
    }

    fn unwatch_provider(&self) {
        self.unwatch_calls.fetch_add(1, Ordering::SeqCst);
        self.watched.lock().unwrap().take();
    }
}

/// Message listener that records what it receives
#[derive(Default)]
pub struct RecordingMessageListener {
    pub messages: Mutex<Vec<(String, serde_json::Value)>>,
    pub deleted: Mutex<Vec<(String, Option<u32>)>>,
}

impl MessageListener for RecordingMessageListener {
    fn on_message(&self, provider_name: &str, payload: &serde_json::Value) {
        self.messages
            .lock()
            .unwrap()
            .push((provider_name.to_string(), payload.clone()));
    }

    fn on_deleted_messages(&self, provider_name: &str, count: Option<u32>) {
        self.deleted
            .lock()
            .unwrap()
            .push((provider_name.to_string(), count));
    }
}

/// An orchestrator wired to test doubles
/// A memory store whose next saves can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStateStore,
    failing_saves: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `count` calls to `save`
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    /// The backing store, holding whatever the last successful save wrote
    pub fn memory(&self) -> MemoryStateStore {
        self.inner.clone()
    }
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn load(&self) -> Result<PersistedState, Error> {
        self.inner.load().await
    }

    async fn save(&self, state: &PersistedState) -> Result<(), Error> {
        let failing = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::state_store("disk full"));
        }
        self.inner.save(state).await
    }

    async fn clear(&self) -> Result<(), Error> {
        self.inner.clear().await
    }

    async fn flush(&self) -> Result<(), Error> {
        self.inner.flush().await
    }
}

pub struct Harness {
    pub orchestrator: PushOrchestrator,
    pub events: mpsc::UnboundedReceiver<PushEvent>,
    pub store: MemoryStateStore,
    pub scheduler: Arc<ManualScheduler>,
    pub platform: Arc<TestPlatform>,
    pub messages: Arc<RecordingMessageListener>,
}

impl Harness {
    /// Fresh harness with an empty memory store
    pub fn new() -> Self {
        Self::with_store(MemoryStateStore::new())
    }

    /// Harness over an existing store, e.g. to simulate a restart
    pub fn with_store(store: MemoryStateStore) -> Self {
        Self::with_parts(store, TestPlatform::new())
    }

    pub fn with_parts(store: MemoryStateStore, platform: Arc<TestPlatform>) -> Self {
        Self::build(Arc::new(store.clone()), store, platform)
    }

    /// Harness whose store can be told to fail
    pub fn with_flaky_store() -> (Self, Arc<FlakyStore>) {
        let flaky = FlakyStore::new();
        let harness = Self::build(flaky.clone(), flaky.memory(), TestPlatform::new());
        (harness, flaky)
    }

    fn build(
        backing: Arc<dyn StateStore>,
        store: MemoryStateStore,
        platform: Arc<TestPlatform>,
    ) -> Self {
        let (listener, events) = ChannelListener::new();
        let scheduler = ManualScheduler::new();
        let messages = Arc::new(RecordingMessageListener::default());

        let orchestrator = PushOrchestrator::builder(backing)
            .scheduler(scheduler.clone())
            .platform(platform.clone())
            .listener(Arc::new(listener))
            .message_listener(messages.clone())
            .build();

        Self {
            orchestrator,
            events,
            store,
            scheduler,
            platform,
            messages,
        }
    }

    /// Wait for the next lifecycle event
    pub async fn next_event(&mut self) -> PushEvent {
        tokio::time::timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    /// Assert that no further event arrives within a short window
    pub async fn assert_no_event(&mut self) {
        let result = tokio::time::timeout(Duration::from_millis(50), self.events.recv()).await;
        assert!(result.is_err(), "unexpected event: {:?}", result);
    }
}

/// Options with `providers` in order and nothing else set
pub fn options(providers: &[&Arc<MockProvider>]) -> Options {
    options_builder(providers)
        .build()
        .expect("provider names are unique")
}

/// Builder pre-loaded with `providers` in order
pub fn options_builder(providers: &[&Arc<MockProvider>]) -> push_core::OptionsBuilder {
    providers.iter().fold(Options::builder(), |builder, p| {
        builder.provider(Arc::clone(*p) as Arc<dyn PushProvider>)
    })
}
