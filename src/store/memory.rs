// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory session store, used for tests and standalone deployments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{GatewayError, Result};
use crate::store::{
    now_rounded, Device, DeviceStore, Event, EventStore, Session, SessionStore, Store,
    DEFAULT_EVENTS_TOPIC, DEFAULT_PING_INTERVAL, DEFAULT_PONG_TOLERANCE, DEFAULT_SESSION_TIMEOUT,
};

struct IdSequence(AtomicI32);

impl IdSequence {
    fn new() -> Self {
        Self(AtomicI32::new(1))
    }

    fn next(&self) -> i32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// In-memory `DeviceStore`.
pub struct MemoryDeviceStore {
    rows: RwLock<HashMap<i32, Device>>,
    ids: IdSequence,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self { rows: RwLock::new(HashMap::new()), ids: IdSequence::new() }
    }
}

impl Default for MemoryDeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn fetch_all(&self) -> Result<HashMap<i32, Device>> {
        Ok(self.rows.read().await.clone())
    }

    async fn find_by_id(&self, id: i32) -> Result<Device> {
        self.rows.read().await.get(&id).cloned().ok_or(GatewayError::StoreNotFound)
    }

    async fn find_by_namespace_and_device_id(&self, namespace: &str, device_id: &str) -> Result<Device> {
        self.rows
            .read()
            .await
            .values()
            .find(|d| d.namespace == namespace && d.device_id == device_id)
            .cloned()
            .ok_or(GatewayError::StoreNotFound)
    }

    async fn create(&self, mut device: Device) -> Result<Device> {
        if device.session_timeout == 0 {
            device.session_timeout = DEFAULT_SESSION_TIMEOUT;
        }
        if device.ping_interval == 0 {
            device.ping_interval = DEFAULT_PING_INTERVAL;
        }
        if device.pong_timeout == 0 {
            device.pong_timeout = DEFAULT_PONG_TOLERANCE;
        }
        if device.events_topic.is_empty() {
            device.events_topic = DEFAULT_EVENTS_TOPIC.to_owned();
        }

        device.id = self.ids.next();
        let now = now_rounded();
        device.created_at = now;
        device.updated_at = now;

        self.rows.write().await.insert(device.id, device.clone());
        Ok(device)
    }

    async fn delete(&self, id: i32) -> Result<()> {
        self.rows.write().await.remove(&id).map(|_| ()).ok_or(GatewayError::StoreNotFound)
    }
}

/// In-memory `SessionStore`.
pub struct MemorySessionStore {
    rows: RwLock<HashMap<i32, Session>>,
    ids: IdSequence,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self { rows: RwLock::new(HashMap::new()), ids: IdSequence::new() }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn fetch_all(&self) -> Result<HashMap<i32, Session>> {
        Ok(self.rows.read().await.clone())
    }

    async fn find_by_id(&self, id: i32) -> Result<Session> {
        self.rows.read().await.get(&id).cloned().ok_or(GatewayError::StoreNotFound)
    }

    async fn find_by_namespace_and_device_id(&self, namespace: &str, device_id: &str) -> Result<Session> {
        self.rows
            .read()
            .await
            .values()
            .find(|s| s.namespace == namespace && s.device_id == device_id)
            .cloned()
            .ok_or(GatewayError::StoreNotFound)
    }

    async fn create(&self, mut session: Session) -> Result<Session> {
        session.id = self.ids.next();
        let now = now_rounded();
        session.created_at = now;
        session.updated_at = now;
        self.rows.write().await.insert(session.id, session.clone());
        Ok(session)
    }

    async fn update(&self, mut session: Session) -> Result<Session> {
        let mut rows = self.rows.write().await;
        let existing = rows.get(&session.id).ok_or(GatewayError::StoreNotFound)?;
        session.created_at = existing.created_at;
        session.updated_at = now_rounded();
        rows.insert(session.id, session.clone());
        Ok(session)
    }

    async fn delete(&self, id: i32) -> Result<()> {
        self.rows.write().await.remove(&id).map(|_| ()).ok_or(GatewayError::StoreNotFound)
    }
}

/// In-memory `EventStore`.
pub struct MemoryEventStore {
    rows: RwLock<HashMap<i32, Event>>,
    ids: IdSequence,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self { rows: RwLock::new(HashMap::new()), ids: IdSequence::new() }
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn fetch_all(&self) -> Result<HashMap<i32, Event>> {
        Ok(self.rows.read().await.clone())
    }

    async fn find_by_id(&self, id: i32) -> Result<Event> {
        self.rows.read().await.get(&id).cloned().ok_or(GatewayError::StoreNotFound)
    }

    async fn create(&self, mut event: Event) -> Result<Event> {
        event.id = self.ids.next();
        self.rows.write().await.insert(event.id, event.clone());
        Ok(event)
    }
}

/// Aggregate in-memory store conforming to [`Store`].
pub struct MemoryStore {
    devices: MemoryDeviceStore,
    sessions: MemorySessionStore,
    events: MemoryEventStore,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            devices: MemoryDeviceStore::new(),
            sessions: MemorySessionStore::new(),
            events: MemoryEventStore::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn devices(&self) -> &dyn DeviceStore {
        &self.devices
    }

    fn sessions(&self) -> &dyn SessionStore {
        &self.sessions
    }

    fn events(&self) -> &dyn EventStore {
        &self.events
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
