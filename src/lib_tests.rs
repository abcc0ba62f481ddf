// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::store::memory::MemoryStore;
use crate::store::Device;

#[tokio::test]
async fn run_with_store_binds_and_shuts_down_on_drop() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    store
        .devices()
        .create(Device {
            id: 0,
            namespace: "default".into(),
            device_id: "dev-1".into(),
            device_uri: "coap://x".into(),
            session_timeout: 0,
            ping_interval: 0,
            pong_timeout: 0,
            events_topic: String::new(),
            created_at: crate::store::now_rounded(),
            updated_at: crate::store::now_rounded(),
        })
        .await
        .unwrap();

    let config = GatewayConfig { port: 0, ..GatewayConfig::default() };

    // Bus connect is expected to fail in the test environment (no NATS
    // server); the gateway degrades to bus-less mode rather than erroring.
    let result = tokio::time::timeout(std::time::Duration::from_millis(200), run_with_store(config, store)).await;
    assert!(result.is_err(), "server should still be serving when the timeout fires");
}
