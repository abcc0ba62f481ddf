// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn device_create_applies_defaults() {
    let store = MemoryDeviceStore::new();
    let device = store
        .create(Device {
            id: 0,
            namespace: "default".into(),
            device_id: "dev-1".into(),
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

    assert_ne!(device.id, 0);
    assert_eq!(device.session_timeout, DEFAULT_SESSION_TIMEOUT);
    assert_eq!(device.ping_interval, DEFAULT_PING_INTERVAL);
    assert_eq!(device.pong_timeout, DEFAULT_PONG_TOLERANCE);
    assert_eq!(device.events_topic, DEFAULT_EVENTS_TOPIC);
}

#[tokio::test]
async fn session_update_preserves_created_at() {
    let store = MemorySessionStore::new();
    let created = store
        .create(Session {
            id: 0,
            namespace: "default".into(),
            device_id: "dev-1".into(),
            device_uri: "coap://x".into(),
            session_timeout: 120,
            last_message_at: now_rounded(),
            created_at: now_rounded(),
            updated_at: now_rounded(),
        })
        .await
        .unwrap();

    let mut updated = created.clone();
    updated.last_message_at = now_rounded() + std::time::Duration::from_secs(5);
    let updated = store.update(updated).await.unwrap();

    assert_eq!(updated.created_at, created.created_at);
}

#[tokio::test]
async fn delete_missing_session_is_not_found() {
    let store = MemorySessionStore::new();
    assert_eq!(store.delete(999).await.unwrap_err(), GatewayError::StoreNotFound);
}
