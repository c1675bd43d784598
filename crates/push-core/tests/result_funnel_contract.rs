//! Contract Test: Result Funnel
//!
//! This test verifies that asynchronous provider results and messages are
//! validated against the registration state before they change anything.
//!
//! Constraints verified:
//! - Results of the wrong kind for the current state are rejected
//! - UNKNOWN results are routed by the current state
//! - Messages are only accepted from the registered provider
//! - Callback handles do not keep the orchestrator alive
//!
//! If this test fails, late or misrouted results can corrupt the state.

mod common;

use common::*;
use push_core::state::MemoryStateStore;
use push_core::{
    Error, OutboundMessage, ProviderError, PushOrchestrator, PushProvider, PushResult,
    RegistrationState, ResultKind,
};
use serde_json::json;
use std::sync::Arc;

async fn registered_harness(provider: &Arc<MockProvider>) -> Harness {
    let harness = Harness::new();
    harness.orchestrator.init(options(&[provider])).await.unwrap();
    harness.orchestrator.register().await.unwrap();
    harness
        .orchestrator
        .on_result(PushResult::registered(provider.name(), "reg-1"))
        .await
        .unwrap();
    harness
}

#[tokio::test]
async fn registration_result_while_unregistered_is_rejected() {
    let a = MockProvider::new("a");
    let mut harness = Harness::new();
    harness.orchestrator.init(options(&[&a])).await.unwrap();

    let err = harness
        .orchestrator
        .on_result(PushResult::registered("a", "reg-1"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::UnhandleableResult {
            kind: ResultKind::Registration,
            state: RegistrationState::Unregistered,
        }
    ));
    assert!(err.is_protocol_misuse());
    assert!(harness.orchestrator.is_unregistered().await);
    harness.assert_no_event().await;
}

#[tokio::test]
async fn unregistration_result_while_registering_is_rejected() {
    let a = MockProvider::new("a");
    let harness = Harness::new();
    harness.orchestrator.init(options(&[&a])).await.unwrap();
    harness.orchestrator.register().await.unwrap();

    let result = harness
        .orchestrator
        .on_result(PushResult::unregistered("a", "reg-1"))
        .await;

    assert!(matches!(
        result,
        Err(Error::UnhandleableResult {
            kind: ResultKind::Unregistration,
            state: RegistrationState::Registering,
        })
    ));
    assert!(harness.orchestrator.is_registering().await);
}

#[tokio::test]
async fn late_registration_result_after_success_is_rejected() {
    let a = MockProvider::new("a");
    let harness = registered_harness(&a).await;

    let result = harness
        .orchestrator
        .on_result(PushResult::registration_failed(
            "a",
            ProviderError::ServiceNotAvailable,
        ))
        .await;

    assert!(matches!(result, Err(Error::UnhandleableResult { .. })));
    assert_eq!(harness.orchestrator.state().await, RegistrationState::Registered);
    assert_eq!(harness.scheduler.schedule_calls(), 0);
}

#[tokio::test]
async fn unknown_result_routed_by_state() {
    let a = MockProvider::new("a");
    let harness = Harness::new();
    harness.orchestrator.init(options(&[&a])).await.unwrap();
    harness.orchestrator.register().await.unwrap();

    harness
        .orchestrator
        .on_result(PushResult::success(ResultKind::Unknown, "a", "reg-1"))
        .await
        .unwrap();
    assert_eq!(harness.orchestrator.state().await, RegistrationState::Registered);

    // Unknown while registered has nowhere to go
    assert!(matches!(
        harness
            .orchestrator
            .on_result(PushResult::success(ResultKind::Unknown, "a", "reg-1"))
            .await,
        Err(Error::UnhandleableResult { .. })
    ));

    harness.orchestrator.unregister().await.unwrap();
    harness
        .orchestrator
        .on_result(PushResult::success(ResultKind::Unknown, "a", "reg-1"))
        .await
        .unwrap();
    assert!(harness.orchestrator.is_unregistered().await);
}

#[tokio::test]
async fn result_from_unknown_provider_is_rejected() {
    let a = MockProvider::new("a");
    let harness = Harness::new();
    harness.orchestrator.init(options(&[&a])).await.unwrap();
    harness.orchestrator.register().await.unwrap();

    let result = harness
        .orchestrator
        .on_result(PushResult::registered("nope", "reg-1"))
        .await;

    assert!(matches!(result, Err(Error::ProviderNotFound(name)) if name == "nope"));
    assert!(harness.orchestrator.is_registering().await);
}

#[tokio::test]
async fn messages_require_registration() {
    let a = MockProvider::new("a");
    let harness = Harness::new();
    harness.orchestrator.init(options(&[&a])).await.unwrap();

    let result = harness
        .orchestrator
        .on_message("a", &json!({"text": "hello"}))
        .await;
    assert!(matches!(result, Err(Error::NotRegistered)));
    assert!(harness.messages.messages.lock().unwrap().is_empty());
}

#[tokio::test]
async fn messages_from_other_provider_are_rejected() {
    let a = MockProvider::new("a");
    let harness = registered_harness(&a).await;

    let result = harness
        .orchestrator
        .on_deleted_messages("b", Some(3))
        .await;

    assert!(matches!(
        result,
        Err(Error::UnexpectedProvider { ref current, ref reported })
            if current == "a" && reported == "b"
    ));
    assert!(harness.messages.deleted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn messages_forwarded_verbatim() {
    let a = MockProvider::new("gcm");
    let harness = registered_harness(&a).await;
    let callback = harness.orchestrator.provider_callback();

    // Provider names are compared case-insensitively
    callback
        .on_message("GCM", &json!({"text": "hello", "n": 1}))
        .await
        .unwrap();
    callback.on_deleted_messages("gcm", None).await.unwrap();

    assert_eq!(
        *harness.messages.messages.lock().unwrap(),
        vec![("GCM".to_string(), json!({"text": "hello", "n": 1}))]
    );
    assert_eq!(
        *harness.messages.deleted.lock().unwrap(),
        vec![("gcm".to_string(), None)]
    );
}

#[tokio::test]
async fn messages_accepted_while_unregistering() {
    let a = MockProvider::new("a");
    let harness = registered_harness(&a).await;
    harness.orchestrator.unregister().await.unwrap();

    harness
        .orchestrator
        .on_deleted_messages("a", Some(2))
        .await
        .unwrap();
    assert_eq!(
        *harness.messages.deleted.lock().unwrap(),
        vec![("a".to_string(), Some(2))]
    );
}

#[tokio::test]
async fn send_message_uses_sender_capability() {
    let plain = MockProvider::new("plain");
    let harness = Harness::new();
    harness.orchestrator.init(options(&[&plain])).await.unwrap();

    let message = OutboundMessage::new("m-1", json!({"ping": true}));
    assert!(matches!(
        harness.orchestrator.send_message(message.clone()).await,
        Err(Error::NotRegistered)
    ));

    harness.orchestrator.register().await.unwrap();
    harness
        .orchestrator
        .on_result(PushResult::registered("plain", "reg-1"))
        .await
        .unwrap();
    assert!(!harness.orchestrator.can_send_messages().await);
    assert!(matches!(
        harness.orchestrator.send_message(message.clone()).await,
        Err(Error::SendNotSupported(name)) if name == "plain"
    ));

    let sender = MockProvider::with_sender("sender");
    let harness = registered_harness(&sender).await;
    assert!(harness.orchestrator.can_send_messages().await);
    harness.orchestrator.send_message(message.clone()).await.unwrap();
    assert_eq!(sender.sent(), vec![message]);
}

#[tokio::test]
async fn callback_outliving_orchestrator_fails() {
    let orchestrator = PushOrchestrator::builder(Arc::new(MemoryStateStore::new())).build();
    let callback = orchestrator.provider_callback();
    drop(orchestrator);

    let result = callback.on_result(PushResult::registered("a", "reg-1")).await;
    assert!(matches!(result, Err(Error::OrchestratorDropped)));
}

#[tokio::test]
async fn registration_id_comes_from_current_provider() {
    let a = MockProvider::new("a");
    let harness = registered_harness(&a).await;
    assert_eq!(harness.orchestrator.registration_id().await, None);

    a.set_registered("reg-1");
    assert_eq!(
        harness.orchestrator.registration_id().await.as_deref(),
        Some("reg-1")
    );
}
