// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! License and agent lifecycle state. The server is the source of truth;
//! the agent caches the last pushed state and gates command admission on it.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::ErrorCode;

/// License status as reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    Active,
    Pending,
    Expired,
    Blocked,
}

/// Agent lifecycle state derived from license status. Transitions are
/// server-authoritative; the agent never promotes itself out of Pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    Pending,
    Active,
    Expired,
    Blocked,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
            Self::Blocked => "BLOCKED",
        }
    }

    /// Map a server license status onto the lifecycle state.
    pub fn from_status(status: LicenseStatus) -> Self {
        match status {
            LicenseStatus::Active => Self::Active,
            LicenseStatus::Pending => Self::Pending,
            LicenseStatus::Expired => Self::Expired,
            LicenseStatus::Blocked => Self::Blocked,
        }
    }
}

/// Server-pushed permission flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Permissions {
    pub master_mode: bool,
    pub file_transfer: bool,
    pub local_settings_locked: bool,
}

/// Browser hint pushed by the server, consumed by browser-adjacent tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultBrowser {
    #[default]
    System,
    Chrome,
    Firefox,
    Safari,
    Edge,
}

/// Snapshot of the license-derived admission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LicenseSnapshot {
    pub status: LicenseStatus,
    pub state: AgentState,
    pub permissions: Permissions,
    pub default_browser: DefaultBrowser,
    /// Grace window for cancelling in-flight work after a revocation, ms.
    pub grace_period_ms: u64,
}

impl Default for LicenseSnapshot {
    fn default() -> Self {
        Self {
            status: LicenseStatus::Pending,
            state: AgentState::Pending,
            permissions: Permissions::default(),
            default_browser: DefaultBrowser::System,
            grace_period_ms: 0,
        }
    }
}

impl LicenseSnapshot {
    /// Whether a method is admissible in the current state.
    ///
    /// Pending admits read-only discovery; Expired/Blocked degrade to
    /// heartbeat-and-status only. Active admits everything.
    pub fn admits(&self, method: &str) -> bool {
        match self.state {
            AgentState::Active => true,
            AgentState::Pending => PENDING_ALLOWLIST.contains(&method),
            AgentState::Expired | AgentState::Blocked => DEGRADED_ALLOWLIST.contains(&method),
        }
    }

    /// The error surfaced when `admits` refuses a method.
    pub fn refusal(&self) -> ErrorCode {
        match self.state {
            AgentState::Pending => ErrorCode::AwaitingActivation,
            AgentState::Expired => ErrorCode::LicenseExpired,
            _ => ErrorCode::LicenseBlocked,
        }
    }
}

/// Methods admitted while awaiting activation. `emergency_stop` stays
/// admitted everywhere: it only ever cancels work.
pub const PENDING_ALLOWLIST: &[&str] =
    &["ping", "status", "capabilities/list", "tools/list", "emergency_stop"];

/// Methods admitted in the Expired/Blocked degraded mode.
pub const DEGRADED_ALLOWLIST: &[&str] = &["ping", "status", "capabilities/list", "emergency_stop"];

/// Shared license state: written by the session task on server pushes,
/// observed everywhere else through watch receivers.
pub struct LicenseGate {
    tx: watch::Sender<LicenseSnapshot>,
}

impl Default for LicenseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl LicenseGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LicenseSnapshot::default());
        Self { tx }
    }

    pub fn snapshot(&self) -> LicenseSnapshot {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LicenseSnapshot> {
        self.tx.subscribe()
    }

    /// Apply a server-pushed status (registration ack or config frame).
    pub fn apply_status(&self, status: LicenseStatus) {
        self.tx.send_modify(|snap| {
            snap.status = status;
            snap.state = AgentState::from_status(status);
        });
    }

    /// Apply a `license_state_change` frame.
    pub fn apply_state_change(&self, state: AgentState, grace_period_ms: Option<u64>) {
        self.tx.send_modify(|snap| {
            snap.state = state;
            snap.status = match state {
                AgentState::Active => LicenseStatus::Active,
                AgentState::Pending => LicenseStatus::Pending,
                AgentState::Expired => LicenseStatus::Expired,
                AgentState::Blocked => LicenseStatus::Blocked,
            };
            snap.grace_period_ms = grace_period_ms.unwrap_or(0);
        });
    }

    /// Apply server-pushed permission/browser updates.
    pub fn apply_config(&self, permissions: Option<Permissions>, browser: Option<DefaultBrowser>) {
        self.tx.send_modify(|snap| {
            if let Some(p) = permissions {
                snap.permissions = p;
            }
            if let Some(b) = browser {
                snap.default_browser = b;
            }
        });
    }
}

/// Resolve once the license stops admitting `method`, then wait out the
/// grace period. Used by in-flight request tasks as a cancellation source.
pub async fn revoked(mut rx: watch::Receiver<LicenseSnapshot>, method: String) {
    loop {
        let snap = *rx.borrow_and_update();
        if !snap.admits(&method) {
            let grace = std::time::Duration::from_millis(snap.grace_period_ms);
            if !grace.is_zero() {
                tokio::time::sleep(grace).await;
            }
            return;
        }
        if rx.changed().await.is_err() {
            // Gate dropped; never resolves.
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
#[path = "license_tests.rs"]
mod tests;
