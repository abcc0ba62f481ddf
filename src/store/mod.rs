// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session store adapter: the abstract persistence contract consumed by the
//! controller, plus an in-memory implementation sufficient to exercise it.
//!
//! A relational implementation is an external collaborator and is not
//! provided here; the trait boundary is what the controller depends on.

pub mod memory;

use std::collections::HashMap;
use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Round a timestamp down to whole seconds, matching the wire protocol's
/// second-precision timestamps.
pub fn now_rounded() -> SystemTime {
    let dur = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
    SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(dur.as_secs())
}

/// A device's configuration record.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: i32,
    pub namespace: String,
    pub device_id: String,
    pub device_uri: String,
    pub session_timeout: i32,
    pub ping_interval: i32,
    pub pong_timeout: i32,
    pub events_topic: String,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Defaults applied by the store on device creation, matching the original
/// implementation's memory store.
pub const DEFAULT_SESSION_TIMEOUT: i32 = 120;
pub const DEFAULT_PING_INTERVAL: i32 = 104;
pub const DEFAULT_PONG_TOLERANCE: i32 = 16;
pub const DEFAULT_EVENTS_TOPIC: &str = "deviceevent";

/// An active session binding between a device and its connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: i32,
    pub namespace: String,
    pub device_id: String,
    pub device_uri: String,
    pub session_timeout: i32,
    pub last_message_at: SystemTime,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Where an event or CALL target originated from / is directed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    System,
    Device,
}

/// A persisted, immutable event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: i32,
    pub namespace: String,
    pub source_type: EntityType,
    pub source_id: String,
    pub topic: String,
    pub timestamp: SystemTime,
    pub details: serde_json::Value,
}

/// Session store contract (spec.md §4.7).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn fetch_all(&self) -> Result<HashMap<i32, Session>>;
    async fn find_by_id(&self, id: i32) -> Result<Session>;
    async fn find_by_namespace_and_device_id(&self, namespace: &str, device_id: &str) -> Result<Session>;
    /// Assigns an id and timestamps; the returned session's id is never 0.
    async fn create(&self, session: Session) -> Result<Session>;
    /// Updates `last_message_at` and `updated_at`, leaving `created_at` intact.
    async fn update(&self, session: Session) -> Result<Session>;
    async fn delete(&self, id: i32) -> Result<()>;
}

/// Device store contract (spec.md §4.7).
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn fetch_all(&self) -> Result<HashMap<i32, Device>>;
    async fn find_by_id(&self, id: i32) -> Result<Device>;
    async fn find_by_namespace_and_device_id(&self, namespace: &str, device_id: &str) -> Result<Device>;
    async fn create(&self, device: Device) -> Result<Device>;
    async fn delete(&self, id: i32) -> Result<()>;
}

/// Event store contract (spec.md §4.7).
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn fetch_all(&self) -> Result<HashMap<i32, Event>>;
    async fn find_by_id(&self, id: i32) -> Result<Event>;
    async fn create(&self, event: Event) -> Result<Event>;
}

/// Aggregate handle over the three stores, mirroring the original
/// `storage.Interface`.
pub trait Store: Send + Sync {
    fn devices(&self) -> &dyn DeviceStore;
    fn sessions(&self) -> &dyn SessionStore;
    fn events(&self) -> &dyn EventStore;
}

/// Shorthand used throughout the controller.
pub fn not_found() -> GatewayError {
    GatewayError::StoreNotFound
}
