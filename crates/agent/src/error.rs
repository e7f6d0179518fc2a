// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error codes surfaced over the control-plane session and the
/// local HTTP facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidArguments,
    UnknownMethod,
    UnknownTool,
    CapabilityUnavailable,
    LicenseExpired,
    LicenseBlocked,
    AwaitingActivation,
    PolicyBlocked,
    Timeout,
    QueuedTimeout,
    Cancelled,
    Busy,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArguments => "invalid_arguments",
            Self::UnknownMethod => "unknown_method",
            Self::UnknownTool => "unknown_tool",
            Self::CapabilityUnavailable => "capability_unavailable",
            Self::LicenseExpired => "license_expired",
            Self::LicenseBlocked => "license_blocked",
            Self::AwaitingActivation => "awaiting_activation",
            Self::PolicyBlocked => "policy_blocked",
            Self::Timeout => "timeout",
            Self::QueuedTimeout => "queued_timeout",
            Self::Cancelled => "cancelled",
            Self::Busy => "busy",
            Self::Internal => "internal",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidArguments => 400,
            Self::UnknownMethod => 404,
            Self::UnknownTool => 404,
            Self::CapabilityUnavailable => 501,
            Self::LicenseExpired => 403,
            Self::LicenseBlocked => 403,
            Self::AwaitingActivation => 403,
            Self::PolicyBlocked => 403,
            Self::Timeout => 408,
            Self::QueuedTimeout => 408,
            Self::Cancelled => 499,
            Self::Busy => 429,
            Self::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maximum diagnostic length carried over the wire. Handler faults are
/// truncated to this; stack traces never leave the process.
const MAX_DETAIL_LEN: usize = 512;

/// A dispatch failure: machine-readable code plus bounded human detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchError {
    pub code: ErrorCode,
    pub message: String,
}

impl DispatchError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.len() > MAX_DETAIL_LEN {
            let mut cut = MAX_DETAIL_LEN;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
        }
        Self { code, message }
    }

    /// Bare error with the code's own name as message.
    pub fn bare(code: ErrorCode) -> Self {
        Self { code, message: code.as_str().to_owned() }
    }

    pub fn internal(detail: impl fmt::Display) -> Self {
        Self::new(ErrorCode::Internal, detail.to_string())
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for DispatchError {}

impl From<ErrorCode> for DispatchError {
    fn from(code: ErrorCode) -> Self {
        Self::bare(code)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
