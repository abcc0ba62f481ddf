// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::store::memory::MemoryStore;

fn test_core() -> Arc<SessionCore> {
    let (transport, ..) = TransportHandle::test_pair();
    let controller =
        Controller::new(Arc::new(MemoryStore::new()), None, Duration::from_secs(16), Duration::from_secs(16));
    SessionCore::new(transport, "default".to_owned(), controller, Arc::new(GatewayConfig::default()))
}

#[tokio::test(start_paused = true)]
async fn ping_watchdog_terminates_after_silence() {
    let core = test_core();
    tokio::spawn(ping_watchdog(core.clone(), 5));
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(core.cancel.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn ping_watchdog_resets_on_activity() {
    let core = test_core();
    tokio::spawn(ping_watchdog(core.clone(), 5));
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_secs(3)).await;
        core.activity.notify_one();
    }
    assert!(!core.cancel.is_cancelled(), "activity before the deadline must restart the watchdog");
}

#[tokio::test(start_paused = true)]
async fn issue_call_times_out_and_clears_correlator() {
    let (transport, _outbound_rx, _cancel) = TransportHandle::test_pair();
    let correlator = Correlator::new();

    let result = issue_call(&transport, &correlator, "reboot", Value::Null, Duration::from_secs(1)).await;
    assert_eq!(result.unwrap_err(), GatewayError::ResultTimeout);
    assert_eq!(correlator.pending_count(), 0);
}

#[tokio::test]
async fn issue_call_delivers_result_before_deadline() {
    let (transport, _outbound_rx, _cancel) = TransportHandle::test_pair();
    let correlator = Arc::new(Correlator::new());

    let correlator_clone = correlator.clone();
    let resolver = tokio::spawn(async move {
        // The session's frame loop resolves request id 1 once the
        // RESULT frame arrives; here we simulate that directly.
        tokio::time::sleep(Duration::from_millis(10)).await;
        correlator_clone.resolve(1, CallOutcome::Success { results: Value::Bool(true) });
    });

    let outcome =
        issue_call(&transport, &correlator, "reboot", Value::Null, Duration::from_secs(1)).await.unwrap();
    assert!(matches!(outcome, CallOutcome::Success { results } if results == Value::Bool(true)));
    resolver.await.unwrap();
}
