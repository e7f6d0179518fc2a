// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reserved control methods. These never enter the executor pool and stay
//! available in degraded license states (subject to the allowlist).

use serde_json::{json, Value};

use crate::error::DispatchError;
use crate::state::epoch_ms;

use super::Dispatcher;

const RESERVED: &[&str] = &[
    "ping",
    "status",
    "capabilities/list",
    "tools/list",
    "resources/list",
    "prompts/list",
    "emergency_stop",
];

pub fn is_reserved(method: &str) -> bool {
    RESERVED.contains(&method)
}

pub async fn handle(
    dispatcher: &Dispatcher,
    method: &str,
    _params: &Value,
) -> Result<Value, DispatchError> {
    let ctx = &dispatcher.ctx;
    match method {
        "ping" => Ok(json!({ "ok": true, "now": epoch_ms() })),
        "status" => {
            let license = ctx.license.snapshot();
            let power = ctx.power.snapshot();
            let capabilities: Vec<&str> =
                ctx.adapter.available().iter().map(|cap| cap.as_str()).collect();
            Ok(json!({
                "version": ctx.version,
                "platform": crate::identity::platform(),
                "arch": crate::identity::arch(),
                "machineId": ctx.machine_id,
                "licenseStatus": license.status,
                "agentState": license.state.as_str(),
                "capabilities": capabilities,
                "powerState": power.state.as_str(),
                "activeRequests": dispatcher.active(),
                "queuedRequests": dispatcher.queued(),
                "updateState": ctx.update_state.label(),
                "uptimeSecs": ctx.started_at.elapsed().as_secs(),
            }))
        }
        "capabilities/list" => {
            let capabilities: Vec<&str> =
                ctx.adapter.available().iter().map(|cap| cap.as_str()).collect();
            Ok(json!({ "capabilities": capabilities }))
        }
        "tools/list" => {
            let tools = ctx.registry.snapshot();
            Ok(json!({ "tools": tools }))
        }
        // Compatibility surface: always present, currently empty.
        "resources/list" => Ok(json!({ "resources": [] })),
        "prompts/list" => Ok(json!({ "prompts": [] })),
        "emergency_stop" => {
            let (cancelled, drained) = dispatcher.emergency_stop();
            Ok(json!({ "cancelledActive": cancelled, "drainedQueued": drained }))
        }
        other => Err(DispatchError::new(
            crate::error::ErrorCode::UnknownMethod,
            other,
        )),
    }
}
