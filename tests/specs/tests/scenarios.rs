// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios: the real `outpost` binary against a fake control
//! plane.

use std::time::{Duration, Instant};

use outpost::error::ErrorCode;
use serde_json::json;

use outpost_specs::{AgentProcess, ControlPlane};

#[tokio::test]
async fn cold_start_registers_and_heartbeats() -> anyhow::Result<()> {
    let plane = ControlPlane::bind().await?;
    let _agent = AgentProcess::start(plane.port())?;
    let mut session = plane.accept().await?;

    let register = session.expect_register().await?;
    assert!(register["machineId"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(register["fingerprint"]["hash"].as_str().is_some());
    assert_eq!(register["os"], std::env::consts::OS);
    assert!(register["version"].as_str().is_some());

    session.ack(1000, "active").await?;

    // Heartbeats arrive on the configured cadence and carry state.
    let first = session.recv_until(|f| f["type"] == "heartbeat").await?;
    let first_at = Instant::now();
    assert_eq!(first["powerState"], "ACTIVE");
    assert_eq!(first["version"], register["version"]);
    assert!(first["counter"].as_u64().is_some());

    let _second = session.recv_until(|f| f["type"] == "heartbeat").await?;
    let gap = first_at.elapsed();
    assert!(gap >= Duration::from_millis(500), "heartbeat arrived too early: {gap:?}");
    assert!(gap <= Duration::from_millis(2500), "heartbeat arrived too late: {gap:?}");
    Ok(())
}

#[tokio::test]
async fn pending_license_admits_only_discovery() -> anyhow::Result<()> {
    let plane = ControlPlane::bind().await?;
    let _agent = AgentProcess::start(plane.port())?;
    let mut session = plane.accept().await?;

    session.expect_register().await?;
    session.ack(1000, "pending").await?;

    session
        .send(json!({
            "type": "request", "id": "r1", "method": "tools/call",
            "params": { "name": "shell_exec", "arguments": { "command": "echo hi" } }
        }))
        .await?;
    let refused = session.expect_outcome("r1").await?;
    assert_eq!(refused["type"], "error");
    assert_eq!(refused["code"], ErrorCode::AwaitingActivation.as_str());

    session
        .send(json!({ "type": "request", "id": "r2", "method": "tools/list" }))
        .await?;
    let listed = session.expect_outcome("r2").await?;
    assert_eq!(listed["type"], "response");
    assert!(listed["result"]["tools"].as_array().is_some_and(|t| !t.is_empty()));
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn dispatches_a_permitted_tool() -> anyhow::Result<()> {
    let plane = ControlPlane::bind().await?;
    let _agent = AgentProcess::start(plane.port())?;
    let mut session = plane.accept().await?;

    session.expect_register().await?;
    session.ack(2000, "active").await?;

    session
        .send(json!({
            "type": "request", "id": "r1", "method": "tools/call",
            "params": { "name": "shell_exec", "arguments": { "command": "echo wire-marker" } }
        }))
        .await?;

    let outcome = session.expect_outcome("r1").await?;
    assert_eq!(outcome["type"], "response");
    assert_eq!(outcome["result"]["exitCode"], 0);
    assert!(outcome["result"]["stdout"]
        .as_str()
        .is_some_and(|out| out.contains("wire-marker")));
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn deadline_fires_timeout_and_nothing_else() -> anyhow::Result<()> {
    let plane = ControlPlane::bind().await?;
    let _agent = AgentProcess::start(plane.port())?;
    let mut session = plane.accept().await?;

    session.expect_register().await?;
    session.ack(2000, "active").await?;

    session
        .send(json!({
            "type": "request", "id": "r2", "method": "tools/call",
            "params": { "name": "shell_exec",
                        "arguments": { "command": "sleep 600", "timeout": 1 } }
        }))
        .await?;

    let outcome = session.expect_outcome("r2").await?;
    assert_eq!(outcome["type"], "error");
    assert_eq!(outcome["code"], ErrorCode::Timeout.as_str());

    // No response{r2} ever follows; the next r2-tagged frame simply does
    // not exist. Exercise the session with another request to prove it.
    session
        .send(json!({
            "type": "request", "id": "r3", "method": "ping"
        }))
        .await?;
    let ping = session.expect_outcome("r3").await?;
    assert_eq!(ping["type"], "response");
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn license_revocation_cancels_and_degrades() -> anyhow::Result<()> {
    let plane = ControlPlane::bind().await?;
    let _agent = AgentProcess::start(plane.port())?;
    let mut session = plane.accept().await?;

    session.expect_register().await?;
    session.ack(1000, "active").await?;

    session
        .send(json!({
            "type": "request", "id": "long", "method": "tools/call",
            "params": { "name": "shell_exec", "arguments": { "command": "sleep 600" } }
        }))
        .await?;
    // Give the handler a moment to start.
    tokio::time::sleep(Duration::from_millis(500)).await;

    session
        .send(json!({ "type": "license_state_change", "newState": "BLOCKED", "gracePeriodMs": 0 }))
        .await?;

    let cancelled = session.expect_outcome("long").await?;
    assert_eq!(cancelled["type"], "error");
    assert_eq!(cancelled["code"], ErrorCode::Cancelled.as_str());

    session
        .send(json!({
            "type": "request", "id": "after", "method": "tools/call",
            "params": { "name": "shell_exec", "arguments": { "command": "echo hi" } }
        }))
        .await?;
    let refused = session.expect_outcome("after").await?;
    assert_eq!(refused["code"], ErrorCode::LicenseBlocked.as_str());

    // Heartbeats continue in degraded mode.
    let beat = session.recv_until(|f| f["type"] == "heartbeat").await?;
    assert_eq!(beat["type"], "heartbeat");
    Ok(())
}

#[tokio::test]
async fn replaced_session_reconnects_and_reregisters() -> anyhow::Result<()> {
    let plane = ControlPlane::bind().await?;
    let _agent = AgentProcess::start(plane.port())?;

    let mut session = plane.accept().await?;
    let first = session.expect_register().await?;
    session.ack(1000, "active").await?;
    session.close_replaced().await?;

    // The agent reconnects with backoff and registers again with the
    // same machine id.
    let mut replacement = plane.accept().await?;
    let second = replacement.expect_register().await?;
    assert_eq!(second["machineId"], first["machineId"]);
    Ok(())
}

#[tokio::test]
async fn wake_before_config_forces_active_cadence() -> anyhow::Result<()> {
    let plane = ControlPlane::bind().await?;
    let _agent = AgentProcess::start(plane.port())?;
    let mut session = plane.accept().await?;

    session.expect_register().await?;
    // Ack with no cadence fields at all: the 30s default applies.
    session
        .send(json!({ "type": "register_ack", "sessionId": "s1", "licenseStatus": "active" }))
        .await?;

    session.send(json!({ "type": "wake" })).await?;

    // Wake forces ACTIVE at the 5s default; a heartbeat must arrive well
    // inside the original 30s default.
    let started = Instant::now();
    let beat = session.recv_until(|f| f["type"] == "heartbeat").await?;
    assert_eq!(beat["powerState"], "ACTIVE");
    assert!(started.elapsed() < Duration::from_secs(10));
    Ok(())
}

#[tokio::test]
async fn facade_probe_answers_locally() -> anyhow::Result<()> {
    outpost_specs::ensure_crypto();
    let plane = ControlPlane::bind().await?;
    let agent = AgentProcess::start_with(plane.port(), true)?;
    let mut session = plane.accept().await?;
    session.expect_register().await?;
    session.ack(2000, "active").await?;

    let url = agent.facade_url().ok_or_else(|| anyhow::anyhow!("no facade port"))?;
    let client = reqwest::Client::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        match client.get(format!("{url}/api/v1/health")).send().await {
            Ok(response) => {
                let body: serde_json::Value = response.json().await?;
                assert_eq!(body["status"], "running");
                assert!(body["version"].as_str().is_some());
                break;
            }
            Err(_) if Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }

    let status: serde_json::Value =
        client.get(format!("{url}/api/v1/status")).send().await?.json().await?;
    assert_eq!(status["licenseStatus"], "active");
    Ok(())
}
