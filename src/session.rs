// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session state machine (spec.md §4.3).
//!
//! One [`Session`] drives one connection end to end: `Established` while
//! waiting for HELLO, `Registered` once the controller has admitted it,
//! `Terminated` once its cancellation token fires. Frame handling runs
//! single-threaded inside [`Session::run`] — there is no lock around state or
//! registration because nothing else mutates them concurrently. Everything a
//! *different* task needs (the bus-held CALL subscriber, the watchdogs) only
//! touches the immutable [`SessionCore`] handle: transport, correlator,
//! cancellation token.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, Notify, RwLock};
use tokio_util::sync::CancellationToken;

use crate::codec::{Message, MessageType};
use crate::config::GatewayConfig;
use crate::controller::Controller;
use crate::correlator::{CallOutcome, Correlator};
use crate::error::GatewayError;
use crate::store::now_rounded;
use crate::transport::{Submission, TransportHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Established,
    Registered,
    Terminated,
}

/// What a session knows about itself once the controller has admitted it.
#[derive(Debug, Clone)]
pub struct Registration {
    pub id: i32,
    pub namespace: String,
    pub device_id: String,
    pub session_timeout: i32,
}

/// The part of a session shared across its run loop, watchdogs, and the
/// bus-held CALL subscriber spawned by the controller on registration.
pub struct SessionCore {
    pub transport: TransportHandle,
    pub correlator: Arc<Correlator>,
    pub cancel: CancellationToken,
    pub registration: RwLock<Option<Registration>>,
    /// Namespace carried by the connection itself (e.g. a URI path segment),
    /// not assumed from the realm — spec.md §9 warns against hard-coding it.
    namespace: String,
    /// Signals the ping watchdog to restart its deadline; fired on every
    /// successfully handled inbound frame.
    activity: Notify,
    controller: Arc<Controller>,
    config: Arc<GatewayConfig>,
}

impl SessionCore {
    pub fn new(
        transport: TransportHandle,
        namespace: String,
        controller: Arc<Controller>,
        config: Arc<GatewayConfig>,
    ) -> Arc<Self> {
        let cancel = transport.cancel_token();
        Arc::new(Self {
            transport,
            correlator: Arc::new(Correlator::new()),
            cancel,
            registration: RwLock::new(None),
            namespace,
            activity: Notify::new(),
            controller,
            config,
        })
    }

    pub async fn registration(&self) -> Option<Registration> {
        self.registration.read().await.clone()
    }

    fn abort(&self, reason: GatewayError, message: impl Into<String>) {
        let details = serde_json::json!({ "message": message.into() });
        let frame = Message::Abort { reason: reason.reason_code().to_owned(), details };
        let _ = self.transport.submit(Submission::close_gracefully(Some(frame.encode())));
    }

    fn terminate(&self) {
        let _ = self.transport.submit(Submission::terminate());
        self.cancel.cancel();
    }
}

/// One connection's state machine.
pub struct Session {
    core: Arc<SessionCore>,
    state: SessionState,
}

impl Session {
    pub fn new(core: Arc<SessionCore>) -> Self {
        Self { core, state: SessionState::Established }
    }

    /// Drive the session to completion: process inbound frames until the
    /// peer disconnects, the connection is cancelled, or a fatal error is
    /// hit. Spawns the registration watchdog immediately; the ping watchdog
    /// is spawned once registration succeeds.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<String>) {
        let registration_deadline = self.core.config.registration_timeout;
        tokio::spawn(registration_watchdog(self.core.clone(), registration_deadline));

        loop {
            tokio::select! {
                _ = self.core.cancel.cancelled() => break,
                frame = inbound.recv() => {
                    let Some(text) = frame else { break };
                    if self.handle_text(&text).await {
                        break;
                    }
                }
            }
        }

        self.teardown().await;
    }

    async fn teardown(&mut self) {
        self.state = SessionState::Terminated;
        self.core.cancel.cancel();
        self.core.correlator.drain();
        if let Some(reg) = self.core.registration().await {
            self.core.controller.unregister_session(reg.id).await;
        }
    }

    /// Handle one inbound frame. Returns `true` if the session loop should
    /// stop.
    async fn handle_text(&mut self, text: &str) -> bool {
        let message = match Message::decode(text) {
            Ok(m) => m,
            Err(_) => {
                self.core.abort(GatewayError::ProtocolDecodeError, "frame could not be decoded");
                return true;
            }
        };

        let stop = match (self.state, message) {
            (SessionState::Established, Message::Hello { realm, .. }) => {
                self.handle_hello(realm).await
            }
            (SessionState::Established, _) => {
                self.core.terminate();
                true
            }
            (SessionState::Registered, Message::Ping { .. }) => {
                self.touch().await;
                let _ = self.core.transport.submit(Submission::continue_with(
                    Message::Pong { details: Value::Object(Default::default()) }.encode(),
                ));
                false
            }
            (SessionState::Registered, Message::Publish { request_id, topic, arguments }) => {
                self.handle_publish(request_id, topic, arguments).await
            }
            (SessionState::Registered, Message::Result { request_id, results }) => {
                self.handle_call_reply(request_id, CallOutcome::Success { results }).await
            }
            (SessionState::Registered, Message::Error { request_id, reason, details, .. }) => {
                self.handle_call_reply(request_id, CallOutcome::Failure { reason, details }).await
            }
            (SessionState::Registered, Message::Abort { .. }) => {
                self.core.terminate();
                true
            }
            (SessionState::Registered, _) => {
                self.core.abort(GatewayError::ProtocolViolation, "unexpected message type for a registered session");
                true
            }
            (SessionState::Terminated, _) => true,
        };

        if !stop {
            self.touch().await;
        }
        stop
    }

    async fn handle_hello(&mut self, realm: String) -> bool {
        let outcome = self
            .core
            .controller
            .register_session(
                &self.core.namespace,
                &realm,
                self.core.transport.clone(),
                self.core.correlator.clone(),
                self.core.cancel.clone(),
            )
            .await;

        match outcome {
            Ok(reg) => {
                let details = serde_json::json!({
                    "session_timeout": reg.session_timeout,
                    "ping_interval": reg.ping_interval,
                    "pong_max_wait_time": reg.pong_tolerance,
                    "events_topic": reg.events_topic,
                });
                let welcome = Message::Welcome { session_id: reg.session_id, details };
                if self.core.transport.submit(Submission::continue_with(welcome.encode())).is_err() {
                    self.core.terminate();
                    return true;
                }
                *self.core.registration.write().await = Some(Registration {
                    id: reg.session_id,
                    namespace: self.core.namespace.clone(),
                    device_id: reg.device_id.clone(),
                    session_timeout: reg.session_timeout,
                });
                self.state = SessionState::Registered;
                tokio::spawn(ping_watchdog(self.core.clone(), reg.session_timeout));
                false
            }
            Err(GatewayError::NoSuchRealm) => {
                self.core.abort(GatewayError::NoSuchRealm, format!("realm '{realm}' is not registered"));
                true
            }
            Err(GatewayError::SessionExists) => {
                self.core.abort(GatewayError::SessionExists, format!("realm '{realm}' is already registered"));
                true
            }
            Err(_) => {
                self.core.terminate();
                true
            }
        }
    }

    async fn handle_publish(&mut self, request_id: i32, topic: String, arguments: Value) -> bool {
        let Some(reg) = self.core.registration().await else {
            self.core.terminate();
            return true;
        };

        let outcome = self
            .core
            .controller
            .publish_device_event(&reg.namespace, &reg.device_id, &topic, arguments)
            .await;

        let reply = match outcome {
            Ok(publication_id) => Message::Published { request_id, publication_id },
            Err(e) => Message::Error {
                message_type: MessageType::Publish,
                request_id,
                reason: e.reason_code().to_owned(),
                details: Value::Object(Default::default()),
            },
        };
        let _ = self.core.transport.submit(Submission::continue_with(reply.encode()));
        false
    }

    async fn handle_call_reply(&mut self, request_id: i32, outcome: CallOutcome) -> bool {
        if self.core.correlator.resolve(request_id, outcome) {
            false
        } else {
            self.core.abort(GatewayError::ProtocolViolation, format!("no pending request for id {request_id}"));
            true
        }
    }

    async fn touch(&self) {
        if let Some(reg) = self.core.registration().await {
            self.core.controller.update_last_message_at(reg.id, now_rounded()).await;
            self.core.activity.notify_one();
        }
    }
}

async fn registration_watchdog(core: Arc<SessionCore>, deadline: Duration) {
    tokio::select! {
        _ = core.cancel.cancelled() => {}
        _ = tokio::time::sleep(deadline) => {
            if core.registration().await.is_none() {
                tracing::debug!("registration watchdog fired, terminating");
                core.terminate();
            }
        }
    }
}

/// Terminates the session once `session_timeout` passes with no inbound
/// frame. Every successfully handled frame notifies `core.activity`, which
/// restarts the deadline for another full period.
async fn ping_watchdog(core: Arc<SessionCore>, session_timeout: i32) {
    let timeout = Duration::from_secs(session_timeout.max(0) as u64);
    loop {
        tokio::select! {
            _ = core.cancel.cancelled() => break,
            _ = core.activity.notified() => continue,
            _ = tokio::time::sleep(timeout) => {
                tracing::debug!("ping watchdog fired, terminating");
                core.terminate();
                break;
            }
        }
    }
}

/// Issue an outbound CALL over `transport` and await its result via
/// `correlator`.
///
/// Used by the controller's bus-held CALL subscriber on behalf of an inbound
/// bus request — the session's own frame loop never originates a CALL.
pub async fn issue_call(
    transport: &TransportHandle,
    correlator: &Correlator,
    operation: &str,
    arguments: Value,
    deadline: Duration,
) -> Result<CallOutcome, GatewayError> {
    let (request_id, rx) = correlator.install();
    let frame = Message::Call { request_id, operation: operation.to_owned(), arguments };
    transport.submit(Submission::continue_with(frame.encode()))?;

    match tokio::time::timeout(deadline, rx).await {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(_)) => Err(GatewayError::TechnicalException),
        Err(_) => {
            correlator.remove(request_id);
            Err(GatewayError::ResultTimeout)
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
