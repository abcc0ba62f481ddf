// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire codec for the control channel protocol (spec.md §4.1).
//!
//! The on-wire envelope is a JSON array: element 0 is an integer message-type
//! tag, the rest are positional and type-specific. This is implemented as a
//! small hand-written union rather than a generic `#[derive(Serialize)]`
//! struct-of-enum, because a structural mapping would silently accept the
//! wrong number of elements instead of failing with a decode error.

use serde_json::{json, Map, Value};

use crate::error::GatewayError;

/// Integer message-type tags, as carried in envelope position 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Hello = 1,
    Welcome = 2,
    Abort = 3,
    Ping = 4,
    Pong = 5,
    Error = 9,
    Call = 10,
    Result = 11,
    Publish = 20,
    Published = 21,
}

impl MessageType {
    fn from_tag(tag: i64) -> Option<Self> {
        Some(match tag {
            1 => Self::Hello,
            2 => Self::Welcome,
            3 => Self::Abort,
            4 => Self::Ping,
            5 => Self::Pong,
            9 => Self::Error,
            10 => Self::Call,
            11 => Self::Result,
            20 => Self::Publish,
            21 => Self::Published,
            _ => return None,
        })
    }

    fn tag(self) -> i64 {
        self as i64
    }
}

/// A decoded control channel message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello { realm: String, details: Value },
    Welcome { session_id: i32, details: Value },
    Abort { reason: String, details: Value },
    Ping { details: Value },
    Pong { details: Value },
    Error { message_type: MessageType, request_id: i32, reason: String, details: Value },
    Call { request_id: i32, operation: String, arguments: Value },
    Result { request_id: i32, results: Value },
    Publish { request_id: i32, topic: String, arguments: Value },
    Published { request_id: i32, publication_id: i32 },
}

impl Message {
    /// Encode into the wire's JSON-array text form.
    pub fn encode(&self) -> String {
        self.encode_value().to_string()
    }

    fn encode_value(&self) -> Value {
        match self {
            Self::Hello { realm, details } => {
                json!([MessageType::Hello.tag(), realm, normalize(details)])
            }
            Self::Welcome { session_id, details } => {
                json!([MessageType::Welcome.tag(), session_id, normalize(details)])
            }
            Self::Abort { reason, details } => {
                json!([MessageType::Abort.tag(), reason, normalize(details)])
            }
            Self::Ping { details } => json!([MessageType::Ping.tag(), normalize(details)]),
            Self::Pong { details } => json!([MessageType::Pong.tag(), normalize(details)]),
            Self::Error { message_type, request_id, reason, details } => {
                json!([
                    MessageType::Error.tag(),
                    message_type.tag(),
                    request_id,
                    reason,
                    normalize(details)
                ])
            }
            Self::Call { request_id, operation, arguments } => {
                json!([MessageType::Call.tag(), request_id, operation, normalize(arguments)])
            }
            Self::Result { request_id, results } => {
                json!([MessageType::Result.tag(), request_id, results])
            }
            Self::Publish { request_id, topic, arguments } => {
                json!([MessageType::Publish.tag(), request_id, topic, normalize(arguments)])
            }
            Self::Published { request_id, publication_id } => {
                json!([MessageType::Published.tag(), request_id, publication_id])
            }
        }
    }

    /// Decode a frame's wire text into a typed message.
    ///
    /// Fails with [`GatewayError::ProtocolDecodeError`] on malformed JSON, an
    /// unknown tag, a missing required position, or a wrong-typed position.
    pub fn decode(text: &str) -> Result<Self, GatewayError> {
        let envelope: Vec<Value> =
            serde_json::from_str(text).map_err(|_| GatewayError::ProtocolDecodeError)?;

        let tag = envelope.first().and_then(Value::as_i64).ok_or(GatewayError::ProtocolDecodeError)?;
        let msg_type = MessageType::from_tag(tag).ok_or(GatewayError::ProtocolDecodeError)?;

        match msg_type {
            MessageType::Hello => {
                let realm = string_at(&envelope, 1)?;
                Ok(Self::Hello { realm, details: detail_at(&envelope, 2) })
            }
            MessageType::Welcome => {
                let session_id = i32_at(&envelope, 1)?;
                Ok(Self::Welcome { session_id, details: detail_at(&envelope, 2) })
            }
            MessageType::Abort => {
                let reason = string_at(&envelope, 1)?;
                Ok(Self::Abort { reason, details: detail_at(&envelope, 2) })
            }
            MessageType::Ping => Ok(Self::Ping { details: detail_at(&envelope, 1) }),
            MessageType::Pong => Ok(Self::Pong { details: detail_at(&envelope, 1) }),
            MessageType::Error => {
                let inner_tag = envelope.get(1).and_then(Value::as_i64).ok_or(GatewayError::ProtocolDecodeError)?;
                let message_type =
                    MessageType::from_tag(inner_tag).ok_or(GatewayError::ProtocolDecodeError)?;
                let request_id = i32_at(&envelope, 2)?;
                let reason = string_at(&envelope, 3)?;
                Ok(Self::Error { message_type, request_id, reason, details: detail_at(&envelope, 4) })
            }
            MessageType::Call => {
                let request_id = i32_at(&envelope, 1)?;
                let operation = string_at(&envelope, 2)?;
                Ok(Self::Call { request_id, operation, arguments: detail_at(&envelope, 3) })
            }
            MessageType::Result => {
                let request_id = i32_at(&envelope, 1)?;
                let results = envelope.get(2).cloned().ok_or(GatewayError::ProtocolDecodeError)?;
                Ok(Self::Result { request_id, results })
            }
            MessageType::Publish => {
                let request_id = i32_at(&envelope, 1)?;
                let topic = string_at(&envelope, 2)?;
                Ok(Self::Publish { request_id, topic, arguments: detail_at(&envelope, 3) })
            }
            MessageType::Published => {
                let request_id = i32_at(&envelope, 1)?;
                let publication_id = i32_at(&envelope, 2)?;
                Ok(Self::Published { request_id, publication_id })
            }
        }
    }
}

/// A missing `details`/`arguments` slot must encode as `{}`, never `null`.
fn normalize(value: &Value) -> Value {
    if value.is_null() {
        Value::Object(Map::new())
    } else {
        value.clone()
    }
}

fn string_at(envelope: &[Value], pos: usize) -> Result<String, GatewayError> {
    envelope.get(pos).and_then(Value::as_str).map(str::to_owned).ok_or(GatewayError::ProtocolDecodeError)
}

/// Narrow a JSON number to `i32` with a range check; out-of-range or
/// non-numeric values are decode errors.
fn i32_at(envelope: &[Value], pos: usize) -> Result<i32, GatewayError> {
    let n = envelope.get(pos).and_then(Value::as_f64).ok_or(GatewayError::ProtocolDecodeError)?;
    if n.fract() != 0.0 || n < i32::MIN as f64 || n > i32::MAX as f64 {
        return Err(GatewayError::ProtocolDecodeError);
    }
    Ok(n as i32)
}

/// An optional trailing `details`/`arguments` position, defaulted to `{}`.
fn detail_at(envelope: &[Value], pos: usize) -> Value {
    envelope.get(pos).cloned().unwrap_or_else(|| Value::Object(Map::new()))
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
