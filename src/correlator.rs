// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session request correlator (spec.md §4.4).
//!
//! Maps outbound request IDs to one-shot result sinks so that a
//! connection-oriented device transport can be bridged to a connectionless
//! request/reply caller. Modeled on the teacher's `upstream::bridge::WsBridge`
//! pending-request map: a stamped, monotonic id is the only key, removal is
//! the only delivery path, and a sink has capacity exactly one so a
//! late-arriving reply after timeout is naturally a no-op.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::oneshot;

/// The outcome of an outbound CALL, delivered to the awaiting caller.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    Success { results: Value },
    Failure { reason: String, details: Value },
}

/// A per-session map from in-flight request IDs to one-shot result sinks.
///
/// Request IDs are monotonic starting at 1 and unique within the session.
pub struct Correlator {
    next_id: AtomicI32,
    pending: Mutex<HashMap<i32, oneshot::Sender<CallOutcome>>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self { next_id: AtomicI32::new(1), pending: Mutex::new(HashMap::new()) }
    }

    /// Allocate the next request ID and install a fresh sink for it.
    ///
    /// Returns the assigned id and the receiver half the caller should await.
    pub fn install(&self) -> (i32, oneshot::Receiver<CallOutcome>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let mut pending =
            self.pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        pending.insert(id, tx);
        (id, rx)
    }

    /// Deliver a result to the sink installed under `id`, removing it.
    ///
    /// Returns `false` if no sink was installed under that id — a stale or
    /// duplicated reply the session must treat as a protocol violation.
    pub fn resolve(&self, id: i32, outcome: CallOutcome) -> bool {
        let sender = {
            let mut pending =
                self.pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            pending.remove(&id)
        };
        match sender {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Remove a sink without delivering to it, e.g. on deadline expiry. A
    /// subsequent `resolve` for the same id then hits the "unknown request
    /// id" path rather than silently succeeding.
    pub fn remove(&self, id: i32) {
        let mut pending = self.pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        pending.remove(&id);
    }

    /// Number of in-flight requests. Used by session shutdown to decide
    /// whether there is anything left to drain.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    /// Drain all pending sinks, dropping them. Dropping a `oneshot::Sender`
    /// causes the receiver to observe a closed channel, which callers treat
    /// as `SessionClosed`.
    pub fn drain(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        pending.clear();
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "correlator_tests.rs"]
mod tests;
