// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller / session registry (spec.md §4.5): the single process-wide
//! coordinator between sessions, the store, and the bus.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::bus::{BusGateway, CallReply, ControlChannelCallRequest};
use crate::correlator::{CallOutcome, Correlator};
use crate::error::{GatewayError, Result};
use crate::session;
use crate::store::{now_rounded, EntityType, Event, Session as SessionRow, Store};
use crate::transport::TransportHandle;

/// Registration details returned to a newly admitted session, becoming the
/// WELCOME frame's `details` object.
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    pub session_id: i32,
    pub device_id: String,
    pub session_timeout: i32,
    pub ping_interval: i32,
    pub pong_tolerance: i32,
    pub events_topic: String,
}

struct SessionEntry {
    namespace: String,
    device_id: String,
    cancel: CancellationToken,
}

/// Process-wide session table plus the registration, publish, and
/// bus-routing logic that acts on it.
pub struct Controller {
    store: Arc<dyn Store>,
    bus: Option<Arc<BusGateway>>,
    call_deadline: Duration,
    bus_request_timeout: Duration,
    sessions: tokio::sync::RwLock<HashMap<i32, SessionEntry>>,
    by_device: tokio::sync::RwLock<HashMap<(String, String), i32>>,
}

impl Controller {
    pub fn new(
        store: Arc<dyn Store>,
        bus: Option<Arc<BusGateway>>,
        call_deadline: Duration,
        bus_request_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            bus,
            call_deadline,
            bus_request_timeout,
            sessions: tokio::sync::RwLock::new(HashMap::new()),
            by_device: tokio::sync::RwLock::new(HashMap::new()),
        })
    }

    /// Parse `<device-id>@<device-uri>`, admit the session, and spawn its
    /// bus-held CALL subscriber. Mirrors `RegisterSession` in spec.md §4.5.
    pub async fn register_session(
        &self,
        namespace: &str,
        realm: &str,
        transport: TransportHandle,
        correlator: Arc<Correlator>,
        cancel: CancellationToken,
    ) -> Result<RegistrationOutcome> {
        let (device_id, device_uri) = parse_realm(realm)?;
        let namespace = namespace.to_owned();

        let device = self
            .store
            .devices()
            .find_by_namespace_and_device_id(&namespace, device_id)
            .await
            .map_err(|_| GatewayError::NoSuchRealm)?;

        if let Ok(existing) =
            self.store.sessions().find_by_namespace_and_device_id(&namespace, device_id).await
        {
            let expires_at = existing.last_message_at
                + Duration::from_secs(existing.session_timeout.max(0) as u64);
            if expires_at > now_rounded() {
                return Err(GatewayError::SessionExists);
            }
            let _ = self.store.sessions().delete(existing.id).await;
            if let Some(stale) = self.by_device.write().await.remove(&(namespace.clone(), device_id.to_owned())) {
                if let Some(entry) = self.sessions.write().await.remove(&stale) {
                    entry.cancel.cancel();
                }
            }
        }

        let now = now_rounded();
        let created = self
            .store
            .sessions()
            .create(SessionRow {
                id: 0,
                namespace: namespace.clone(),
                device_id: device_id.to_owned(),
                device_uri: device_uri.to_owned(),
                session_timeout: device.session_timeout,
                last_message_at: now,
                created_at: now,
                updated_at: now,
            })
            .await
            .map_err(|_| GatewayError::TechnicalException)?;

        self.publish_device_status(&namespace, device_id, created.id, "CONNECTED", now).await;

        self.sessions.write().await.insert(
            created.id,
            SessionEntry { namespace: namespace.clone(), device_id: device_id.to_owned(), cancel: cancel.clone() },
        );
        self.by_device.write().await.insert((namespace.clone(), device_id.to_owned()), created.id);

        if let Some(bus) = self.bus.clone() {
            let ns = namespace.clone();
            let dev = device_id.to_owned();
            let deadline = self.call_deadline;
            tokio::spawn(run_controlchannel_call_subscriber(
                bus, ns, dev, transport, correlator, cancel, deadline,
            ));
        }

        Ok(RegistrationOutcome {
            session_id: created.id,
            device_id: device_id.to_owned(),
            session_timeout: device.session_timeout,
            ping_interval: device.ping_interval,
            pong_tolerance: device.pong_timeout,
            events_topic: device.events_topic,
        })
    }

    /// Idempotent: unregistering an id that is no longer present is a no-op.
    pub async fn unregister_session(&self, session_id: i32) {
        let Some(entry) = self.sessions.write().await.remove(&session_id) else { return };
        self.by_device.write().await.remove(&(entry.namespace.clone(), entry.device_id.clone()));
        let _ = self.store.sessions().delete(session_id).await;
        self.publish_device_status(&entry.namespace, &entry.device_id, session_id, "DISCONNECTED", now_rounded())
            .await;
    }

    /// Best-effort write-through; failures are logged, never fatal.
    pub async fn update_last_message_at(&self, session_id: i32, at: SystemTime) {
        let Ok(existing) = self.store.sessions().find_by_id(session_id).await else { return };
        let mut updated = existing;
        updated.last_message_at = at;
        if let Err(e) = self.store.sessions().update(updated).await {
            tracing::warn!(session_id, err = %e, "failed to persist last-message-at");
        }
    }

    /// Device-originated PUBLISH (session state machine, spec.md §4.3/§4.5):
    /// persist an event row, fan out to `events.<topic>`, return its id as
    /// the publication id.
    pub async fn publish_device_event(
        &self,
        namespace: &str,
        device_id: &str,
        topic: &str,
        arguments: Value,
    ) -> Result<i32> {
        self.persist_and_publish_event(namespace, EntityType::Device, device_id, topic, arguments).await
    }

    async fn persist_and_publish_event(
        &self,
        namespace: &str,
        source_type: EntityType,
        source_id: &str,
        topic: &str,
        arguments: Value,
    ) -> Result<i32> {
        let event = self
            .store
            .events()
            .create(Event {
                id: 0,
                namespace: namespace.to_owned(),
                source_type,
                source_id: source_id.to_owned(),
                topic: topic.to_owned(),
                timestamp: now_rounded(),
                details: arguments,
            })
            .await
            .map_err(|_| GatewayError::PublishFailed)?;

        if let Some(bus) = &self.bus {
            if let Err(e) = bus.publish_event(namespace, topic, &event.details).await {
                tracing::warn!(namespace, topic, err = %e, "failed to fan out event");
            }
        }

        Ok(event.id)
    }

    async fn publish_device_status(
        &self,
        namespace: &str,
        device_id: &str,
        session_id: i32,
        status: &str,
        last_message_at: SystemTime,
    ) {
        let Some(bus) = &self.bus else { return };
        let epoch = last_message_at.duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().as_secs();
        let payload = serde_json::json!({
            "status": status,
            "session_id": session_id,
            "last_message_at": epoch,
        });
        if let Err(e) = bus.publish_device_status(namespace, &payload).await {
            tracing::warn!(namespace, device_id, status, err = %e, "failed to publish device status");
        }
    }

    /// Bus-originated CALL (spec.md §4.5 `handleCallRequest`). Routes to the
    /// device's own per-session subject, which the registered session's
    /// subscriber answers via [`session::issue_call`].
    pub async fn handle_bus_call(
        &self,
        namespace: &str,
        target_type: EntityType,
        target_id: &str,
        command: &str,
        arguments: Value,
    ) -> Result<Value> {
        if target_type == EntityType::System {
            return Err(GatewayError::BadRequest);
        }
        if target_id.is_empty() {
            return Err(GatewayError::BadRequest);
        }

        if !self.by_device.read().await.contains_key(&(namespace.to_owned(), target_id.to_owned())) {
            return Err(GatewayError::InvalidSession);
        }

        let Some(bus) = &self.bus else { return Err(GatewayError::TechnicalException) };
        let request = ControlChannelCallRequest { command: command.to_owned(), arguments };
        let reply: CallReply = bus
            .request_json(
                &BusGateway::subject_controlchannel_call(namespace, target_id),
                &request,
                self.bus_request_timeout,
            )
            .await?;

        if reply.status == 0 {
            Ok(reply.results.unwrap_or(Value::Null))
        } else {
            Err(reason_to_error(reply.error_reason.as_deref().unwrap_or("")))
        }
    }

    /// Bus-originated PUBLISH (spec.md §4.5 `handlePublishRequest`) with
    /// `target_type == SYSTEM`; routing any other target type is a caller
    /// error (spec.md §9 Open Question 2).
    pub async fn handle_bus_publish(
        &self,
        namespace: &str,
        source_type: EntityType,
        source_id: &str,
        target_type: EntityType,
        topic: &str,
        arguments: Value,
    ) -> Result<i32> {
        if target_type != EntityType::System {
            return Err(GatewayError::BadRequest);
        }
        self.persist_and_publish_event(namespace, source_type, source_id, topic, arguments).await
    }
}

fn reason_to_error(reason: &str) -> GatewayError {
    match reason {
        "ERR_RESULT_TIMEOUT" => GatewayError::ResultTimeout,
        "ERR_INVALID_SESSION" => GatewayError::InvalidSession,
        "ERR_BAD_REQUEST" => GatewayError::BadRequest,
        _ => GatewayError::TechnicalException,
    }
}

fn parse_realm(realm: &str) -> Result<(&str, &str)> {
    let mut parts = realm.splitn(2, '@');
    let device_id = parts.next().unwrap_or_default();
    let device_uri = parts.next().ok_or(GatewayError::NoSuchRealm)?;
    if device_id.is_empty() || device_uri.is_empty() {
        return Err(GatewayError::NoSuchRealm);
    }
    Ok((device_id, device_uri))
}

/// Answers inbound bus CALL requests addressed to this device's per-session
/// subject by issuing an outbound CALL over the live connection.
async fn run_controlchannel_call_subscriber(
    bus: Arc<BusGateway>,
    namespace: String,
    device_id: String,
    transport: TransportHandle,
    correlator: Arc<Correlator>,
    cancel: CancellationToken,
    deadline: Duration,
) {
    let subject = BusGateway::subject_controlchannel_call(&namespace, &device_id);
    let mut subscriber = match bus.subscribe(&subject).await {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(namespace, device_id, err = %e, "failed to subscribe to controlchannel call subject");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = futures_util::StreamExt::next(&mut subscriber) => {
                let Some(msg) = msg else { break };
                let request: ControlChannelCallRequest = match serde_json::from_slice(&msg.payload) {
                    Ok(r) => r,
                    Err(_) => continue,
                };

                let outcome = session::issue_call(&transport, &correlator, &request.command, request.arguments, deadline).await;
                let reply = match outcome {
                    Ok(CallOutcome::Success { results }) => CallReply::success(results),
                    Ok(CallOutcome::Failure { reason, details }) => CallReply::error(reason, details),
                    Err(e) => CallReply::error(e.reason_code().to_owned(), Value::Null),
                };

                if let Err(e) = bus.reply_json(&msg, &reply).await {
                    tracing::warn!(namespace, device_id, err = %e, "failed to reply to controlchannel call");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
