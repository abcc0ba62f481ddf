// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios against the controller and an in-memory store,
//! exercising the pieces a real WebSocket connection would drive.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use devicecontrol::codec::Message;
use devicecontrol::config::GatewayConfig;
use devicecontrol::controller::Controller;
use devicecontrol::correlator::{CallOutcome, Correlator};
use devicecontrol::error::GatewayError;
use devicecontrol::session;
use devicecontrol::session::{Session, SessionCore};
use devicecontrol::store::memory::MemoryStore;
use devicecontrol::store::{now_rounded, Device, Store};
use devicecontrol::transport::TransportHandle;
use tokio_util::sync::CancellationToken;

fn controller_with_store() -> (Arc<Controller>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let controller = Controller::new(
        store.clone() as Arc<dyn Store>,
        None,
        Duration::from_secs(16),
        Duration::from_secs(16),
    );
    (controller, store)
}

async fn seed_device(store: &MemoryStore, device_id: &str) {
    store
        .devices()
        .create(Device {
            id: 0,
            namespace: "default".into(),
            device_id: device_id.into(),
            device_uri: "coap://x".into(),
            session_timeout: 0,
            ping_interval: 0,
            pong_timeout: 0,
            events_topic: String::new(),
            created_at: now_rounded(),
            updated_at: now_rounded(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn successful_handshake_yields_welcome_details() {
    let (controller, store) = controller_with_store();
    seed_device(&store, "dev-1").await;

    let (transport, _outbound, _cancel) = TransportHandle::test_pair();
    let outcome = controller
        .register_session("default", "dev-1@coap://x", transport, Arc::new(Correlator::new()), CancellationToken::new())
        .await
        .unwrap();

    let welcome = Message::Welcome {
        session_id: outcome.session_id,
        details: serde_json::json!({
            "session_timeout": outcome.session_timeout,
            "ping_interval": outcome.ping_interval,
            "pong_max_wait_time": outcome.pong_tolerance,
            "events_topic": outcome.events_topic,
        }),
    };
    assert_eq!(Message::decode(&welcome.encode()).unwrap(), welcome);
}

#[tokio::test]
async fn hello_with_malformed_realm_is_no_such_realm() {
    let (controller, _store) = controller_with_store();
    let (transport, ..) = TransportHandle::test_pair();
    let err = controller
        .register_session("default", "not-a-realm", transport, Arc::new(Correlator::new()), CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::NoSuchRealm);
}

#[tokio::test]
async fn duplicate_registration_is_rejected_while_live() {
    let (controller, store) = controller_with_store();
    seed_device(&store, "dev-1").await;

    let (t1, ..) = TransportHandle::test_pair();
    controller.register_session("default", "dev-1@coap://x", t1, Arc::new(Correlator::new()), CancellationToken::new()).await.unwrap();

    let (t2, ..) = TransportHandle::test_pair();
    let err = controller
        .register_session("default", "dev-1@coap://x", t2, Arc::new(Correlator::new()), CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::SessionExists);
}

#[tokio::test]
async fn call_round_trip_delivers_result_from_the_device() {
    let (transport, mut outbound, _cancel) = TransportHandle::test_pair();
    let correlator = Arc::new(Correlator::new());

    let awaiter = correlator.clone();
    let call_task = tokio::spawn(async move {
        session::issue_call(&transport, &awaiter, "reboot", serde_json::json!({}), Duration::from_secs(5)).await
    });

    // The device's side of the connection: decode the CALL the controller
    // just wrote to the outbox and answer it as a RESULT frame would.
    let submission = outbound.recv().await.unwrap();
    let frame = Message::decode(submission.payload.as_deref().unwrap()).unwrap();
    let Message::Call { request_id, operation, .. } = frame else { panic!("expected CALL frame") };
    assert_eq!(operation, "reboot");

    let delivered = correlator.resolve(request_id, CallOutcome::Success { results: serde_json::json!({"ok": true}) });
    assert!(delivered);

    let outcome = call_task.await.unwrap().unwrap();
    assert!(matches!(outcome, CallOutcome::Success { results } if results == serde_json::json!({"ok": true})));
}

#[tokio::test(start_paused = true)]
async fn call_with_no_reply_times_out_and_later_reply_is_ignored() {
    let (transport, _outbound, _cancel) = TransportHandle::test_pair();
    let correlator = Correlator::new();

    let result =
        session::issue_call(&transport, &correlator, "reboot", serde_json::json!({}), Duration::from_secs(16)).await;
    assert_eq!(result.unwrap_err(), GatewayError::ResultTimeout);

    // A late RESULT for the same (now-removed) request id must not resolve.
    let delivered = correlator.resolve(1, CallOutcome::Success { results: serde_json::Value::Null });
    assert!(!delivered, "a late reply after timeout must be rejected, not silently accepted");
}

#[tokio::test]
async fn device_publish_persists_and_returns_publication_id() {
    let (controller, _store) = controller_with_store();
    let id = controller
        .publish_device_event("default", "dev-1", "temperature", serde_json::json!({"c": 21.3}))
        .await
        .unwrap();
    assert_ne!(id, 0);

    let second = controller
        .publish_device_event("default", "dev-1", "temperature", serde_json::json!({"c": 21.5}))
        .await
        .unwrap();
    assert_ne!(second, id);
}

#[tokio::test]
async fn registered_session_acknowledges_publish_and_tears_down_on_disconnect() {
    let (controller, store) = controller_with_store();
    seed_device(&store, "dev-1").await;

    let (transport, mut outbound, _cancel) = TransportHandle::test_pair();
    let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel::<String>(8);
    let core = SessionCore::new(transport, "default".to_owned(), controller.clone(), Arc::new(GatewayConfig::default()));
    let run_task = tokio::spawn(Session::new(core).run(inbound_rx));

    let hello = Message::Hello { realm: "dev-1@coap://x".to_owned(), details: serde_json::json!({}) };
    inbound_tx.send(hello.encode()).await.unwrap();

    let welcome = outbound.recv().await.unwrap();
    assert!(matches!(Message::decode(welcome.payload.as_deref().unwrap()).unwrap(), Message::Welcome { .. }));

    // A registered session's own PUBLISH must be persisted and acknowledged,
    // not mistaken for an unregistered session and disconnected.
    let publish =
        Message::Publish { request_id: 1, topic: "temperature".to_owned(), arguments: serde_json::json!({"c": 21.0}) };
    inbound_tx.send(publish.encode()).await.unwrap();

    let reply = outbound.recv().await.unwrap();
    let frame = Message::decode(reply.payload.as_deref().unwrap()).unwrap();
    assert!(matches!(frame, Message::Published { request_id: 1, .. }));

    drop(inbound_tx);
    run_task.await.unwrap();

    // Disconnect must free the realm: re-registering the same device succeeds
    // immediately rather than hitting a lingering `SessionExists`.
    let (t2, ..) = TransportHandle::test_pair();
    controller
        .register_session("default", "dev-1@coap://x", t2, Arc::new(Correlator::new()), CancellationToken::new())
        .await
        .expect("teardown on disconnect should have unregistered the session");
}

#[tokio::test]
async fn unregister_is_idempotent_and_frees_the_realm_for_reregistration() {
    let (controller, store) = controller_with_store();
    seed_device(&store, "dev-1").await;

    let (t1, ..) = TransportHandle::test_pair();
    let outcome = controller
        .register_session("default", "dev-1@coap://x", t1, Arc::new(Correlator::new()), CancellationToken::new())
        .await
        .unwrap();

    controller.unregister_session(outcome.session_id).await;
    controller.unregister_session(outcome.session_id).await;

    let (t2, ..) = TransportHandle::test_pair();
    controller
        .register_session("default", "dev-1@coap://x", t2, Arc::new(Correlator::new()), CancellationToken::new())
        .await
        .expect("realm should be free again after unregister");
}
