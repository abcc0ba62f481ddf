// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus gateway (spec.md §4.6): subject naming, JSON request/reply framing,
//! and the two queue-grouped subscriber loops that hand inbound CALL/PUBLISH
//! traffic to the [`Controller`](crate::controller::Controller).
//!
//! Device-scoped CALL subjects are deliberately *not* queue-grouped — the
//! session that owns the device is the only subscriber, so every gateway
//! instance that has that device connected would otherwise receive (and
//! race to answer) the same request.

use std::time::Duration;

use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::controller::Controller;
use crate::error::{GatewayError, Result};
use crate::store::EntityType;

const SUBJECT_PREFIX: &str = "iotcore.devicecontrol.v1";
const QUEUE_CALL: &str = "iotcore.devicecontrol.v1.queue.call";
const QUEUE_PUBLISH: &str = "iotcore.devicecontrol.v1.queue.publish";

/// Thin wrapper over an `async-nats` client, naming subjects the way spec.md
/// §6 lists them and framing JSON request/reply traffic.
pub struct BusGateway {
    client: async_nats::Client,
}

impl BusGateway {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = async_nats::connect(url).await.map_err(|e| {
            tracing::error!(err = %e, "failed to connect to bus");
            GatewayError::TechnicalException
        })?;
        Ok(Self { client })
    }

    pub fn subject_call(namespace: &str) -> String {
        format!("{SUBJECT_PREFIX}.{namespace}.call")
    }

    pub fn subject_publish(namespace: &str) -> String {
        format!("{SUBJECT_PREFIX}.{namespace}.publish")
    }

    pub fn subject_controlchannel_call(namespace: &str, device_id: &str) -> String {
        format!("{SUBJECT_PREFIX}.{namespace}.controlchannel.{device_id}.call")
    }

    pub fn subject_events(namespace: &str, topic: &str) -> String {
        format!("{SUBJECT_PREFIX}.{namespace}.events.{topic}")
    }

    pub fn subject_device_status(namespace: &str) -> String {
        format!("{SUBJECT_PREFIX}.{namespace}.events.devicestatus")
    }

    pub async fn subscribe(&self, subject: &str) -> Result<async_nats::Subscriber> {
        self.client.subscribe(subject.to_owned()).await.map_err(|_| GatewayError::TechnicalException)
    }

    pub async fn subscribe_queue(&self, subject: &str, queue: &str) -> Result<async_nats::Subscriber> {
        self.client
            .queue_subscribe(subject.to_owned(), queue.to_owned())
            .await
            .map_err(|_| GatewayError::TechnicalException)
    }

    async fn publish_json<T: Serialize>(&self, subject: String, value: &T) -> Result<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|_| GatewayError::TechnicalException)?;
        self.client.publish(subject, bytes.into()).await.map_err(|_| GatewayError::TechnicalException)
    }

    pub async fn publish_event(&self, namespace: &str, topic: &str, value: &Value) -> Result<()> {
        self.publish_json(Self::subject_events(namespace, topic), value).await
    }

    pub async fn publish_device_status(&self, namespace: &str, value: &Value) -> Result<()> {
        self.publish_json(Self::subject_device_status(namespace), value).await
    }

    pub async fn reply_json<T: Serialize>(&self, msg: &async_nats::Message, value: &T) -> Result<()> {
        let Some(reply_to) = msg.reply.clone() else { return Ok(()) };
        self.publish_json(reply_to.to_string(), value).await
    }

    pub async fn request_json<Req: Serialize, Rep: DeserializeOwned>(
        &self,
        subject: &str,
        request: &Req,
        timeout: Duration,
    ) -> Result<Rep> {
        let bytes = serde_json::to_vec(request).map_err(|_| GatewayError::TechnicalException)?;
        let reply = tokio::time::timeout(timeout, self.client.request(subject.to_owned(), bytes.into()))
            .await
            .map_err(|_| GatewayError::ResultTimeout)?
            .map_err(|_| GatewayError::TechnicalException)?;
        serde_json::from_slice(&reply.payload).map_err(|_| GatewayError::TechnicalException)
    }
}

/// Inbound CALL request, exchanged on `<ns>.call` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRequest {
    pub target_type: EntityType,
    pub target_id: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Device-scoped CALL request, exchanged on `<ns>.controlchannel.<id>.call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlChannelCallRequest {
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Reply to either CALL shape: `status` is `0=Success, 1=Error`, the
/// remaining fields are populated accordingly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallReply {
    pub status: i32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub results: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_details: Option<Value>,
}

impl CallReply {
    pub fn success(results: Value) -> Self {
        Self { status: 0, results: Some(results), error_reason: None, error_details: None }
    }

    pub fn error(reason: String, details: Value) -> Self {
        Self { status: 1, results: None, error_reason: Some(reason), error_details: Some(details) }
    }
}

/// `ControlChannelCallReply` has the same wire shape as [`CallReply`].
pub type ControlChannelCallReply = CallReply;

/// Inbound PUBLISH request, exchanged on `<ns>.publish` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub source_type: EntityType,
    pub source_id: String,
    pub target_type: EntityType,
    pub target_id: String,
    pub topic: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReply {
    pub status: i32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub publication_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_details: Option<Value>,
}

impl PublishReply {
    pub fn success(publication_id: i32) -> Self {
        Self { status: 0, publication_id: Some(publication_id), error_reason: None, error_details: None }
    }

    pub fn error(reason: String, details: Value) -> Self {
        Self { status: 1, publication_id: None, error_reason: Some(reason), error_details: Some(details) }
    }
}

/// Run the queue-grouped CALL subscriber until `cancel` fires.
pub async fn run_call_queue_subscriber(bus: std::sync::Arc<BusGateway>, controller: std::sync::Arc<Controller>, cancel: CancellationToken) {
    let mut subscriber = match bus.subscribe_queue(&format!("{SUBJECT_PREFIX}.*.call"), QUEUE_CALL).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(err = %e, "failed to subscribe to call queue, shutting down");
            cancel.cancel();
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = subscriber.next() => {
                let Some(msg) = msg else {
                    tracing::warn!("call queue subscription ended, shutting down");
                    cancel.cancel();
                    break;
                };
                let namespace = namespace_from_subject(&msg.subject, ".call");
                let request: CallRequest = match serde_json::from_slice(&msg.payload) {
                    Ok(r) => r,
                    Err(_) => {
                        let _ = bus.reply_json(&msg, &CallReply::error(
                            GatewayError::TechnicalException.reason_code().to_owned(), Value::Null,
                        )).await;
                        continue;
                    }
                };

                let outcome = controller
                    .handle_bus_call(&namespace, request.target_type, &request.target_id, &request.command, request.arguments)
                    .await;
                let reply = match outcome {
                    Ok(results) => CallReply::success(results),
                    Err(e) => CallReply::error(e.reason_code().to_owned(), Value::Null),
                };
                let _ = bus.reply_json(&msg, &reply).await;
            }
        }
    }
}

/// Run the queue-grouped PUBLISH subscriber until `cancel` fires.
pub async fn run_publish_queue_subscriber(bus: std::sync::Arc<BusGateway>, controller: std::sync::Arc<Controller>, cancel: CancellationToken) {
    let mut subscriber = match bus.subscribe_queue(&format!("{SUBJECT_PREFIX}.*.publish"), QUEUE_PUBLISH).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(err = %e, "failed to subscribe to publish queue, shutting down");
            cancel.cancel();
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = subscriber.next() => {
                let Some(msg) = msg else {
                    tracing::warn!("publish queue subscription ended, shutting down");
                    cancel.cancel();
                    break;
                };
                let namespace = namespace_from_subject(&msg.subject, ".publish");
                let request: PublishRequest = match serde_json::from_slice(&msg.payload) {
                    Ok(r) => r,
                    Err(_) => {
                        let _ = bus.reply_json(&msg, &PublishReply::error(
                            GatewayError::TechnicalException.reason_code().to_owned(), Value::Null,
                        )).await;
                        continue;
                    }
                };

                let outcome = controller
                    .handle_bus_publish(&namespace, request.source_type, &request.source_id, request.target_type, &request.topic, request.arguments)
                    .await;
                let reply = match outcome {
                    Ok(publication_id) => PublishReply::success(publication_id),
                    Err(e) => PublishReply::error(e.reason_code().to_owned(), Value::Null),
                };
                let _ = bus.reply_json(&msg, &reply).await;
            }
        }
    }
}

/// Pull the namespace segment out of a concrete subject matched by a `*`
/// queue subscription, e.g. `iotcore.devicecontrol.v1.default.call` → `default`.
fn namespace_from_subject(subject: &async_nats::Subject, suffix: &str) -> String {
    let subject = subject.as_str();
    let prefix = format!("{SUBJECT_PREFIX}.");
    subject
        .strip_prefix(&prefix)
        .and_then(|rest| rest.strip_suffix(suffix))
        .unwrap_or(subject)
        .to_owned()
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
