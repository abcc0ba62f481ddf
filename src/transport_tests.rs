// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn submission_constructors_set_expected_intent() {
    assert_eq!(Submission::continue_with("x".into()).intent, Intent::Continue);
    assert_eq!(Submission::close_gracefully(None).intent, Intent::CloseGracefully);
    assert_eq!(Submission::terminate().intent, Intent::Terminate);
}

#[test]
fn submit_fails_once_outbox_is_full() {
    let (handle, _rx, _cancel) = TransportHandle::test_pair();
    // capacity is 8; try_send fails once the channel is full, independent
    // of whether a receiver is draining it.
    for _ in 0..8 {
        handle.submit(Submission::continue_with("x".into())).unwrap();
    }
    assert_eq!(
        handle.submit(Submission::continue_with("x".into())).unwrap_err(),
        GatewayError::OutboxFull
    );
}
