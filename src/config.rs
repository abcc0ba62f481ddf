// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway configuration.
//!
//! This is a plain struct, not a CLI parser: loading it from flags/env is an
//! external collaborator's job. It exists so the rest of the stack has a
//! single place to read timing constants and bus/bind settings from.

use std::time::Duration;

/// Configuration for the device control channel gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Host to bind the downstream WebSocket listener on.
    pub host: String,
    /// Port to bind the downstream WebSocket listener on.
    pub port: u16,
    /// Namespace used when none is carried by the connection (e.g. no
    /// upgrade header or path segment supplied it).
    pub default_namespace: String,
    /// NATS bus URL.
    pub nats_url: String,
    /// How long an `Established` session has to complete HELLO before it is
    /// terminated.
    pub registration_timeout: Duration,
    /// Deadline for an outbound CALL awaiting RESULT/ERROR.
    pub call_deadline: Duration,
    /// Timeout for a bus request/reply round trip.
    pub bus_request_timeout: Duration,
    /// Bounded capacity of a transport driver's outbound submission queue.
    pub outbox_capacity: usize,
    /// Grace period allotted to drain the transport driver on shutdown.
    pub shutdown_drain_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
            default_namespace: "default".to_owned(),
            nats_url: "nats://127.0.0.1:4222".to_owned(),
            registration_timeout: Duration::from_secs(10),
            call_deadline: Duration::from_secs(16),
            bus_request_timeout: Duration::from_secs(16),
            outbox_capacity: 100,
            shutdown_drain_timeout: Duration::from_secs(10),
        }
    }
}
