// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport driver: owns one full-duplex framed connection (spec.md §4.2).
//!
//! Spins a reader task that produces a lazy sequence of inbound data frames
//! and a writer task that consumes a bounded outbound submission queue. The
//! reader hides WebSocket-level control frames (it replies to protocol pings
//! itself and exits cleanly on close) — this is distinct from the control
//! channel protocol's own application-level PING/PONG tags, which the session
//! state machine handles as ordinary data frames.

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;

/// Submission intent accompanying an outbound write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Write the payload and remain open.
    Continue,
    /// Write the payload (if any), then emit a close control frame and await
    /// peer close.
    CloseGracefully,
    /// Hard-abort the connection; drop any queued writes.
    Terminate,
}

/// An outbound submission: a payload paired with what the writer should do
/// after sending it.
#[derive(Debug, Clone)]
pub struct Submission {
    pub intent: Intent,
    pub payload: Option<String>,
}

impl Submission {
    pub fn continue_with(payload: String) -> Self {
        Self { intent: Intent::Continue, payload: Some(payload) }
    }

    pub fn close_gracefully(payload: Option<String>) -> Self {
        Self { intent: Intent::CloseGracefully, payload }
    }

    pub fn terminate() -> Self {
        Self { intent: Intent::Terminate, payload: None }
    }
}

/// A handle to a running transport driver.
///
/// Cloning is cheap; many components (session, watchdogs) hold a handle to
/// the same driver.
#[derive(Clone)]
pub struct TransportHandle {
    outbound_tx: mpsc::Sender<Submission>,
    cancel: CancellationToken,
}

impl TransportHandle {
    /// Enqueue an outbound submission.
    ///
    /// Fails with [`GatewayError::OutboxFull`] if the bounded outbox is full;
    /// the session interprets this as fatal and should escalate to
    /// `Terminate`.
    pub fn submit(&self, submission: Submission) -> Result<(), GatewayError> {
        self.outbound_tx.try_send(submission).map_err(|_| GatewayError::OutboxFull)
    }

    /// The cancellation token observed by this driver's tasks. Cancelling it
    /// stops the driver; cancellation is idempotent by construction.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the driver immediately. Safe to call more than once.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

/// Spawn the reader and writer tasks for one WebSocket connection.
///
/// Returns an inbound receiver yielding decoded-as-text data frames (ending
/// when the peer closes or the connection errors) and a handle for outbound
/// submissions and cancellation.
pub fn spawn(socket: WebSocket, outbox_capacity: usize) -> (mpsc::Receiver<String>, TransportHandle) {
    let (inbound_tx, inbound_rx) = mpsc::channel(outbox_capacity);
    let (outbound_tx, outbound_rx) = mpsc::channel(outbox_capacity);
    let cancel = CancellationToken::new();

    let (ws_tx, ws_rx) = socket.split();

    tokio::spawn(reader_loop(ws_rx, inbound_tx, cancel.clone()));
    tokio::spawn(writer_loop(ws_tx, outbound_rx, cancel.clone()));

    (inbound_rx, TransportHandle { outbound_tx, cancel })
}

async fn reader_loop(
    mut ws_rx: futures_util::stream::SplitStream<WebSocket>,
    inbound_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        if inbound_tx.send(text.to_string()).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        tracing::debug!("transport reader observed peer close");
                        break;
                    }
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {
                        // WS-level control frames are hidden from the session;
                        // axum's WebSocket already answers Ping with Pong.
                    }
                    Some(Ok(WsMessage::Binary(_))) => {
                        tracing::debug!("transport reader dropped unexpected binary frame");
                    }
                    Some(Err(e)) => {
                        tracing::debug!(err = %e, "transport reader error");
                        break;
                    }
                }
            }
        }
    }
    cancel.cancel();
}

async fn writer_loop(
    mut ws_tx: futures_util::stream::SplitSink<WebSocket, WsMessage>,
    mut outbound_rx: mpsc::Receiver<Submission>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            submission = outbound_rx.recv() => {
                let Some(submission) = submission else { break };

                if let Some(payload) = submission.payload {
                    if ws_tx.send(WsMessage::Text(payload.into())).await.is_err() {
                        tracing::debug!("transport writer failed to send, terminating");
                        break;
                    }
                }

                match submission.intent {
                    Intent::Continue => {}
                    Intent::CloseGracefully => {
                        let _ = ws_tx.send(WsMessage::Close(None)).await;
                        let _ = ws_tx.close().await;
                        break;
                    }
                    Intent::Terminate => break,
                }
            }
        }
    }
    cancel.cancel();
}

#[cfg(any(test, feature = "test-util"))]
impl TransportHandle {
    /// A detached handle for unit and integration tests that exercise
    /// submission/cancellation without a real socket.
    pub fn test_pair() -> (Self, mpsc::Receiver<Submission>, CancellationToken) {
        let (outbound_tx, outbound_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        (Self { outbound_tx, cancel: cancel.clone() }, outbound_rx, cancel)
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
