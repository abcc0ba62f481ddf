// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn subjects_match_spec_literal_forms() {
    assert_eq!(BusGateway::subject_call("default"), "iotcore.devicecontrol.v1.default.call");
    assert_eq!(BusGateway::subject_publish("default"), "iotcore.devicecontrol.v1.default.publish");
    assert_eq!(
        BusGateway::subject_controlchannel_call("default", "dev-1"),
        "iotcore.devicecontrol.v1.default.controlchannel.dev-1.call"
    );
    assert_eq!(
        BusGateway::subject_events("default", "temperature"),
        "iotcore.devicecontrol.v1.default.events.temperature"
    );
    assert_eq!(
        BusGateway::subject_device_status("default"),
        "iotcore.devicecontrol.v1.default.events.devicestatus"
    );
}

#[test]
fn call_reply_round_trips_through_json() {
    let reply = CallReply::success(serde_json::json!({"ok": true}));
    let encoded = serde_json::to_string(&reply).unwrap();
    assert!(!encoded.contains("error_reason"));
    let decoded: CallReply = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded.status, 0);
}

#[test]
fn call_reply_error_omits_results() {
    let reply = CallReply::error("ERR_BAD_REQUEST".into(), Value::Null);
    let encoded = serde_json::to_string(&reply).unwrap();
    assert!(!encoded.contains("\"results\""));
}
