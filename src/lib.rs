// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device control channel gateway: mediates remote command-and-control of
//! embedded devices over a framed session protocol, bridging a per-device
//! WebSocket connection to a NATS-backed control bus.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod bus;
pub mod codec;
pub mod config;
pub mod controller;
pub mod correlator;
pub mod error;
pub mod session;
pub mod store;
pub mod transport;

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::bus::{run_call_queue_subscriber, run_publish_queue_subscriber, BusGateway};
use crate::config::GatewayConfig;
use crate::controller::Controller;
use crate::session::{Session, SessionCore};
use crate::store::memory::MemoryStore;
use crate::store::Store;

struct AppState {
    controller: Arc<Controller>,
    config: Arc<GatewayConfig>,
}

/// Run the gateway until its root cancellation token fires (Ctrl-C).
///
/// Wires an in-memory [`Store`]; a relational store is a named external
/// collaborator and is not constructed here.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    run_with_store(config, Arc::new(MemoryStore::new())).await
}

async fn run_with_store(config: GatewayConfig, store: Arc<dyn Store>) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let config = Arc::new(config);

    let bus = match BusGateway::connect(&config.nats_url).await {
        Ok(bus) => Some(Arc::new(bus)),
        Err(e) => {
            tracing::warn!(err = %e, "bus unavailable, running without bus gateway");
            None
        }
    };

    let controller = Controller::new(store, bus.clone(), config.call_deadline, config.bus_request_timeout);

    if let Some(bus) = bus.clone() {
        tokio::spawn(run_call_queue_subscriber(bus.clone(), controller.clone(), shutdown.clone()));
        tokio::spawn(run_publish_queue_subscriber(bus, controller.clone(), shutdown.clone()));
    }

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState { controller, config: config.clone() });
    let router = build_router(state);

    tracing::info!(%addr, "device control channel gateway listening");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}

/// Namespace is carried by the connection itself: `/ws/{namespace}` names it
/// explicitly, while the bare `/ws` falls back to the configured default
/// (spec.md §9 warns against hard-coding a single namespace throughout).
fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler_default))
        .route("/ws/{namespace}", get(ws_handler_namespaced))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_handler_default(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let namespace = state.config.default_namespace.clone();
    ws.on_upgrade(move |socket| handle_connection(socket, state, namespace))
}

async fn ws_handler_namespaced(
    State(state): State<Arc<AppState>>,
    Path(namespace): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, namespace))
}

async fn handle_connection(socket: axum::extract::ws::WebSocket, state: Arc<AppState>, namespace: String) {
    let (inbound, transport) = crate::transport::spawn(socket, state.config.outbox_capacity);
    let core = SessionCore::new(transport, namespace, state.controller.clone(), state.config.clone());
    Session::new(core).run(inbound).await;
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
