// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::{Fingerprint, Frame, SessionConfig};
use crate::error::ErrorCode;
use crate::license::{AgentState, LicenseStatus};
use crate::power::PowerState;

#[test]
fn register_frame_shape() -> anyhow::Result<()> {
    let frame = Frame::Register {
        machine_id: "m-001".to_owned(),
        fingerprint: Fingerprint { hash: "abcd".to_owned() },
        os: "linux".to_owned(),
        arch: "x86_64".to_owned(),
        version: "2.0.5".to_owned(),
        agent_name: None,
        agent_secret: None,
    };
    let value: serde_json::Value = serde_json::from_str(&frame.encode()?)?;
    assert_eq!(value["type"], "register");
    assert_eq!(value["machineId"], "m-001");
    assert_eq!(value["fingerprint"]["hash"], "abcd");
    assert_eq!(value["version"], "2.0.5");
    assert!(value.get("agentSecret").is_none(), "absent secret must not serialize");
    Ok(())
}

#[test]
fn register_ack_parses_scenario_a() -> anyhow::Result<()> {
    let text = r#"{"type":"register_ack","sessionId":"s1",
        "config":{"heartbeatInterval":5000,"powerState":"ACTIVE"},
        "licenseStatus":"pending","agentSecret":"sek-1"}"#;
    let frame = Frame::decode(text)?;
    match frame {
        Frame::RegisterAck { session_id, config, license_status, agent_secret, error } => {
            assert_eq!(session_id.as_deref(), Some("s1"));
            assert_eq!(config.heartbeat_interval, Some(5000));
            assert_eq!(config.power_state, Some(PowerState::Active));
            assert_eq!(license_status, Some(LicenseStatus::Pending));
            assert_eq!(agent_secret.as_deref(), Some("sek-1"));
            assert!(error.is_none());
        }
        other => anyhow::bail!("unexpected frame: {other:?}"),
    }
    Ok(())
}

#[test]
fn config_frame_flattens_fields() -> anyhow::Result<()> {
    let text = r#"{"type":"config","heartbeatInterval":30000,"powerState":"PASSIVE",
        "permissions":{"masterMode":false,"fileTransfer":true,"localSettingsLocked":false},
        "updateFlag":1}"#;
    match Frame::decode(text)? {
        Frame::Config { config } => {
            assert_eq!(config.heartbeat_interval, Some(30000));
            assert_eq!(config.power_state, Some(PowerState::Passive));
            assert_eq!(config.update_flag, Some(1));
            let perms = config.permissions.ok_or_else(|| anyhow::anyhow!("no permissions"))?;
            assert!(perms.file_transfer);
        }
        other => anyhow::bail!("unexpected frame: {other:?}"),
    }
    Ok(())
}

#[test]
fn request_with_missing_params_defaults_to_null() -> anyhow::Result<()> {
    match Frame::decode(r#"{"type":"request","id":"r1","method":"ping"}"#)? {
        Frame::Request { id, method, params } => {
            assert_eq!(id, "r1");
            assert_eq!(method, "ping");
            assert!(params.is_null());
        }
        other => anyhow::bail!("unexpected frame: {other:?}"),
    }
    Ok(())
}

#[test]
fn error_frame_uses_snake_case_codes() -> anyhow::Result<()> {
    let frame = Frame::Error {
        id: "r2".to_owned(),
        code: ErrorCode::Timeout,
        message: "deadline exceeded".to_owned(),
    };
    let value: serde_json::Value = serde_json::from_str(&frame.encode()?)?;
    assert_eq!(value, json!({
        "type": "error",
        "id": "r2",
        "code": "timeout",
        "message": "deadline exceeded",
    }));
    Ok(())
}

#[test]
fn heartbeat_omits_absent_task() -> anyhow::Result<()> {
    let frame = Frame::Heartbeat {
        power_state: PowerState::Active,
        screen_locked: false,
        current_task: None,
        version: "2.0.5".to_owned(),
        counter: 7,
        queued_requests: 0,
    };
    let value: serde_json::Value = serde_json::from_str(&frame.encode()?)?;
    assert_eq!(value["type"], "heartbeat");
    assert_eq!(value["powerState"], "ACTIVE");
    assert_eq!(value["counter"], 7);
    assert!(value.get("currentTask").is_none());
    Ok(())
}

#[test]
fn wake_and_license_change_parse() -> anyhow::Result<()> {
    assert_eq!(Frame::decode(r#"{"type":"wake"}"#)?, Frame::Wake {});
    match Frame::decode(r#"{"type":"license_state_change","newState":"BLOCKED","gracePeriodMs":0}"#)? {
        Frame::LicenseStateChange { new_state, grace_period_ms } => {
            assert_eq!(new_state, AgentState::Blocked);
            assert_eq!(grace_period_ms, Some(0));
        }
        other => anyhow::bail!("unexpected frame: {other:?}"),
    }
    Ok(())
}

#[test]
fn malformed_frames_fail_decode() {
    assert!(Frame::decode("not json").is_err());
    assert!(Frame::decode(r#"{"type":"mystery"}"#).is_err());
    assert!(Frame::decode(r#"{"id":"r1"}"#).is_err());
}

#[test]
fn session_config_default_is_empty() -> anyhow::Result<()> {
    let config: SessionConfig = serde_json::from_str("{}")?;
    assert_eq!(config, SessionConfig::default());
    Ok(())
}
