// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Power state: controls heartbeat cadence and dispatch admission.
//! Written only by the session task in response to server `config`/`wake`
//! frames or a locally detected wake; everyone else reads snapshots.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Power state with its associated heartbeat cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerState {
    Active,
    Passive,
    Sleep,
}

impl PowerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Passive => "PASSIVE",
            Self::Sleep => "SLEEP",
        }
    }

    /// Heartbeat interval for this state.
    pub fn heartbeat_interval(&self) -> Duration {
        match self {
            Self::Active => Duration::from_secs(5),
            Self::Passive => Duration::from_secs(30),
            Self::Sleep => Duration::from_secs(300),
        }
    }
}

/// Heartbeat interval before any server `config` arrives.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);

/// Current cadence parameters: power state plus the effective heartbeat
/// interval (server-tunable independently of the state mapping).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerSnapshot {
    pub state: PowerState,
    pub heartbeat: Duration,
}

impl Default for PowerSnapshot {
    fn default() -> Self {
        Self { state: PowerState::Active, heartbeat: DEFAULT_HEARTBEAT }
    }
}

/// Single-writer handle over the shared power state.
pub struct PowerControl {
    tx: watch::Sender<PowerSnapshot>,
}

impl Default for PowerControl {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerControl {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(PowerSnapshot::default());
        Self { tx }
    }

    pub fn snapshot(&self) -> PowerSnapshot {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PowerSnapshot> {
        self.tx.subscribe()
    }

    /// Apply a server `config` frame: target state and/or explicit interval.
    pub fn apply_config(&self, state: Option<PowerState>, heartbeat_ms: Option<u64>) {
        self.tx.send_modify(|snap| {
            if let Some(state) = state {
                snap.state = state;
                snap.heartbeat = state.heartbeat_interval();
            }
            if let Some(ms) = heartbeat_ms {
                snap.heartbeat = Duration::from_millis(ms);
            }
        });
    }

    /// A `wake` frame (or local wake event) forces ACTIVE at the 5s cadence
    /// until a subsequent `config` overrides it.
    pub fn wake(&self) {
        self.tx.send_modify(|snap| {
            snap.state = PowerState::Active;
            snap.heartbeat = PowerState::Active.heartbeat_interval();
        });
    }
}

#[cfg(test)]
#[path = "power_tests.rs"]
mod tests;
