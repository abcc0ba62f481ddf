// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error catalogue for the device control channel gateway.

use std::fmt;

/// Stable wire-visible reason code, as named in the protocol's error catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayError {
    ProtocolDecodeError,
    ProtocolViolation,
    NoSuchRealm,
    SessionExists,
    InvalidSession,
    ResultTimeout,
    OutboxFull,
    TechnicalException,
    BadRequest,
    StoreNotFound,
    PublishFailed,
}

impl GatewayError {
    /// The stable string literal sent on the wire or over the bus.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::ProtocolDecodeError | Self::ProtocolViolation => "ERR_PROTOCOL_VIOLATION",
            Self::NoSuchRealm => "ERR_NO_SUCH_REALM",
            Self::SessionExists => "ERR_SESSION_EXISTS",
            Self::InvalidSession => "ERR_INVALID_SESSION",
            Self::ResultTimeout => "ERR_RESULT_TIMEOUT",
            Self::OutboxFull => "ERR_TECHNICAL_EXCEPTION",
            Self::TechnicalException => "ERR_TECHNICAL_EXCEPTION",
            Self::BadRequest => "ERR_BAD_REQUEST",
            Self::StoreNotFound => "ERR_TECHNICAL_EXCEPTION",
            Self::PublishFailed => "ERR_PUBLISH_FAILED",
        }
    }

    /// Whether this error, raised while handling an inbound frame, should
    /// close the session gracefully (ABORT) rather than terminate it hard.
    pub fn is_abortable(&self) -> bool {
        matches!(
            self,
            Self::ProtocolDecodeError
                | Self::ProtocolViolation
                | Self::NoSuchRealm
                | Self::SessionExists
        )
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason_code())
    }
}

impl std::error::Error for GatewayError {}

pub type Result<T> = std::result::Result<T, GatewayError>;
