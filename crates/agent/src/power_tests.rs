// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use yare::parameterized;

use super::{PowerControl, PowerState, DEFAULT_HEARTBEAT};

#[parameterized(
    active = { PowerState::Active, 5 },
    passive = { PowerState::Passive, 30 },
    sleep = { PowerState::Sleep, 300 },
)]
fn heartbeat_cadence(state: PowerState, secs: u64) {
    assert_eq!(state.heartbeat_interval(), Duration::from_secs(secs));
}

#[test]
fn default_is_active_with_30s_heartbeat() {
    let control = PowerControl::new();
    let snap = control.snapshot();
    assert_eq!(snap.state, PowerState::Active);
    assert_eq!(snap.heartbeat, DEFAULT_HEARTBEAT);
}

#[test]
fn config_sets_state_and_cadence() {
    let control = PowerControl::new();
    control.apply_config(Some(PowerState::Sleep), None);
    let snap = control.snapshot();
    assert_eq!(snap.state, PowerState::Sleep);
    assert_eq!(snap.heartbeat, Duration::from_secs(300));
}

#[test]
fn explicit_interval_overrides_state_mapping() {
    let control = PowerControl::new();
    control.apply_config(Some(PowerState::Passive), Some(12_000));
    let snap = control.snapshot();
    assert_eq!(snap.state, PowerState::Passive);
    assert_eq!(snap.heartbeat, Duration::from_millis(12_000));
}

#[test]
fn wake_forces_active_at_5s() {
    let control = PowerControl::new();
    control.apply_config(Some(PowerState::Sleep), None);
    control.wake();
    let snap = control.snapshot();
    assert_eq!(snap.state, PowerState::Active);
    assert_eq!(snap.heartbeat, Duration::from_secs(5));
}

#[test]
fn wire_serialization() -> anyhow::Result<()> {
    assert_eq!(serde_json::to_string(&PowerState::Sleep)?, "\"SLEEP\"");
    let state: PowerState = serde_json::from_str("\"PASSIVE\"")?;
    assert_eq!(state, PowerState::Passive);
    Ok(())
}
