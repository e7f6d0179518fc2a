// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane wire frames: UTF-8 JSON objects tagged by `type`, with
//! camelCase field names. The set below is exhaustive; unknown inbound
//! frames are logged and dropped without closing the session.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorCode;
use crate::license::{AgentState, DefaultBrowser, LicenseStatus, Permissions};
use crate::power::PowerState;

/// Registration refusal reason for a bad stored secret. The agent reacts
/// with a long backoff instead of hammering the endpoint.
pub const INVALID_AGENT_SECRET: &str = "INVALID_AGENT_SECRET";

/// Close reason used when the server replaces this session with a newer
/// connection from the same machine id.
pub const CLOSE_REPLACED: &str = "replaced";

/// Hashed hardware fingerprint as carried in the register frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub hash: String,
}

/// Server-pushed session tuning. Appears inside `register_ack` and as the
/// body of standalone `config` frames; absent fields leave the current
/// value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_state: Option<PowerState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Permissions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_browser: Option<DefaultBrowser>,
    /// Update trigger: 0 = nothing, 1 = check, 2 = forced install.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_flag: Option<u8>,
}

/// A control-plane frame, either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// out — initial frame after connect.
    #[serde(rename_all = "camelCase")]
    Register {
        machine_id: String,
        fingerprint: Fingerprint,
        os: String,
        arch: String,
        version: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_secret: Option<String>,
    },
    /// in — registration outcome.
    #[serde(rename_all = "camelCase")]
    RegisterAck {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        config: SessionConfig,
        #[serde(default)]
        license_status: Option<LicenseStatus>,
        /// Secret minted on first registration; persisted by the agent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_secret: Option<String>,
        /// Refusal reason (e.g. [`INVALID_AGENT_SECRET`]).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// out — periodic liveness and state report.
    #[serde(rename_all = "camelCase")]
    Heartbeat {
        power_state: PowerState,
        screen_locked: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_task: Option<String>,
        version: String,
        /// Monotonic per-session counter consumed by the update engine.
        counter: u64,
        queued_requests: usize,
    },
    /// in — server-pushed tuning update.
    Config {
        #[serde(flatten)]
        config: SessionConfig,
    },
    /// in — a command to execute.
    Request {
        id: String,
        method: String,
        #[serde(default)]
        params: Value,
    },
    /// out — success for a prior request.
    Response { id: String, result: Value },
    /// out — failure for a prior request.
    Error {
        id: String,
        code: ErrorCode,
        message: String,
    },
    /// in — force power state to ACTIVE and drain queued work.
    Wake {},
    /// in — license/agent lifecycle push.
    #[serde(rename_all = "camelCase")]
    LicenseStateChange {
        new_state: AgentState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        grace_period_ms: Option<u64>,
    },
    /// out — agent-initiated event.
    Notification {
        event: String,
        #[serde(default)]
        data: Value,
    },
}

impl Frame {
    pub fn encode(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> anyhow::Result<Frame> {
        Ok(serde_json::from_str(text)?)
    }

    /// Frame name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::RegisterAck { .. } => "register_ack",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Config { .. } => "config",
            Self::Request { .. } => "request",
            Self::Response { .. } => "response",
            Self::Error { .. } => "error",
            Self::Wake {} => "wake",
            Self::LicenseStateChange { .. } => "license_state_change",
            Self::Notification { .. } => "notification",
        }
    }
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
