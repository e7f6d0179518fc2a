// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in tool set. Cross-platform tools are always registered; the
//! GUI-family set is gated on capability availability at startup.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use super::{decode_args, handler, schema, tool, ToolCtx, ToolRegistry, ToolTags};
use crate::error::{DispatchError, ErrorCode};
use crate::platform::caps::{MouseButton, NoGuiSession, ShellCommand};
use crate::platform::{Capability, PlatformAdapter};

/// Register the builtin tools and freeze the registry.
pub fn install(registry: &ToolRegistry, adapter: &PlatformAdapter) -> anyhow::Result<()> {
    register_shell(registry)?;
    register_fs(registry)?;
    register_host(registry)?;
    register_credentials(registry)?;

    if adapter.has(Capability::Clipboard) {
        register_clipboard(registry)?;
    }
    if adapter.has(Capability::ScreenCapture) {
        register_screen(registry)?;
    }
    if adapter.has(Capability::InputInject) {
        register_input(registry)?;
    }
    if adapter.has(Capability::Window) {
        register_window(registry)?;
    }
    if adapter.has(Capability::Power) {
        register_power(registry)?;
    }

    registry.freeze();
    Ok(())
}

/// Map an adapter error: `NO_GUI_SESSION` keeps its contract name, anything
/// else becomes a bounded `internal`.
fn adapter_err(err: anyhow::Error) -> DispatchError {
    if err.is::<NoGuiSession>() {
        DispatchError::new(ErrorCode::CapabilityUnavailable, NoGuiSession.to_string())
    } else {
        DispatchError::internal(err)
    }
}

fn require<T: ?Sized>(slot: &Option<Arc<T>>, cap: Capability) -> Result<Arc<T>, DispatchError> {
    slot.as_ref().map(Arc::clone).ok_or_else(|| {
        DispatchError::new(ErrorCode::CapabilityUnavailable, cap.as_str())
    })
}

// -- shell --------------------------------------------------------------------

#[derive(Deserialize)]
struct ShellExecArgs {
    command: String,
    cwd: Option<String>,
    #[serde(default)]
    env: std::collections::HashMap<String, String>,
    /// Per-call deadline in seconds; consumed by the dispatcher.
    #[allow(dead_code)]
    timeout: Option<u64>,
}

impl ShellExecArgs {
    fn into_command(self) -> ShellCommand {
        let mut cmd = ShellCommand::new(self.command);
        cmd.cwd = self.cwd.map(std::path::PathBuf::from);
        cmd.env = self.env.into_iter().collect();
        cmd
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionIdArgs {
    session_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionWriteArgs {
    session_id: String,
    data: String,
}

fn shell_exec_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "command": {"type": "string", "minLength": 1},
            "cwd": {"type": "string"},
            "env": {"type": "object", "additionalProperties": {"type": "string"}},
            "timeout": {"type": "integer", "minimum": 1, "maximum": 120}
        },
        "required": ["command"],
        "additionalProperties": false
    })
}

fn register_shell(registry: &ToolRegistry) -> anyhow::Result<()> {
    registry.register(tool(
        "shell_exec",
        "Run a shell command to completion and return its output",
        shell_exec_schema(),
        vec![Capability::Shell],
        ToolTags { shell_like: true, ..Default::default() },
        Duration::from_secs(60),
        handler(|ctx: ToolCtx, args| async move {
            let shell = require(&ctx.adapter.shell, Capability::Shell)?;
            let args: ShellExecArgs = decode_args(args)?;
            let out = shell
                .exec(args.into_command(), ctx.cancel.clone())
                .await
                .map_err(adapter_err)?;
            Ok(json!({
                "exitCode": out.exit_code,
                "stdout": out.stdout,
                "stderr": out.stderr,
            }))
        }),
    )?)?;

    registry.register(tool(
        "shell_session_start",
        "Start a long-lived shell session",
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "minLength": 1},
                "cwd": {"type": "string"}
            },
            "required": ["command"],
            "additionalProperties": false
        }),
        vec![Capability::Shell],
        ToolTags { shell_like: true, ..Default::default() },
        Duration::from_secs(15),
        handler(|ctx: ToolCtx, args| async move {
            let shell = require(&ctx.adapter.shell, Capability::Shell)?;
            #[derive(Deserialize)]
            struct Args {
                command: String,
                cwd: Option<String>,
            }
            let args: Args = decode_args(args)?;
            let mut cmd = ShellCommand::new(args.command);
            cmd.cwd = args.cwd.map(std::path::PathBuf::from);
            let info = shell.session_start(cmd).await.map_err(adapter_err)?;
            serde_json::to_value(info).map_err(DispatchError::internal)
        }),
    )?)?;

    registry.register(tool(
        "shell_session_write",
        "Write to a shell session's stdin",
        json!({
            "type": "object",
            "properties": {
                "sessionId": {"type": "string", "minLength": 1},
                "data": {"type": "string"}
            },
            "required": ["sessionId", "data"],
            "additionalProperties": false
        }),
        vec![Capability::Shell],
        ToolTags::default(),
        Duration::from_secs(15),
        handler(|ctx: ToolCtx, args| async move {
            let shell = require(&ctx.adapter.shell, Capability::Shell)?;
            let args: SessionWriteArgs = decode_args(args)?;
            shell.session_write(&args.session_id, &args.data).await.map_err(adapter_err)?;
            Ok(json!({"ok": true}))
        }),
    )?)?;

    registry.register(tool(
        "shell_session_read",
        "Drain buffered output from a shell session",
        json!({
            "type": "object",
            "properties": {"sessionId": {"type": "string", "minLength": 1}},
            "required": ["sessionId"],
            "additionalProperties": false
        }),
        vec![Capability::Shell],
        ToolTags { read_only: true, ..Default::default() },
        Duration::from_secs(15),
        handler(|ctx: ToolCtx, args| async move {
            let shell = require(&ctx.adapter.shell, Capability::Shell)?;
            let args: SessionIdArgs = decode_args(args)?;
            let chunk = shell.session_read(&args.session_id).await.map_err(adapter_err)?;
            serde_json::to_value(chunk).map_err(DispatchError::internal)
        }),
    )?)?;

    registry.register(tool(
        "shell_session_stop",
        "Kill a shell session and drop it from the table",
        json!({
            "type": "object",
            "properties": {"sessionId": {"type": "string", "minLength": 1}},
            "required": ["sessionId"],
            "additionalProperties": false
        }),
        vec![Capability::Shell],
        ToolTags::default(),
        Duration::from_secs(15),
        handler(|ctx: ToolCtx, args| async move {
            let shell = require(&ctx.adapter.shell, Capability::Shell)?;
            let args: SessionIdArgs = decode_args(args)?;
            shell.session_stop(&args.session_id).await.map_err(adapter_err)?;
            Ok(json!({"ok": true}))
        }),
    )?)?;

    Ok(())
}

// -- fs -----------------------------------------------------------------------

fn register_fs(registry: &ToolRegistry) -> anyhow::Result<()> {
    registry.register(tool(
        "fs_read",
        "Read a file and return its contents",
        json!({
            "type": "object",
            "properties": {"path": {"type": "string", "minLength": 1}},
            "required": ["path"],
            "additionalProperties": false
        }),
        vec![Capability::Fs],
        ToolTags { read_only: true, ..Default::default() },
        Duration::from_secs(30),
        handler(|ctx: ToolCtx, args| async move {
            let fs = require(&ctx.adapter.fs, Capability::Fs)?;
            #[derive(Deserialize)]
            struct Args {
                path: String,
            }
            let args: Args = decode_args(args)?;
            let bytes = fs.read(&args.path).await.map_err(adapter_err)?;
            Ok(json!({
                "size": bytes.len(),
                "contents": String::from_utf8_lossy(&bytes),
            }))
        }),
    )?)?;

    registry.register(tool(
        "fs_write",
        "Write a file (requires the file-transfer permission)",
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "minLength": 1},
                "contents": {"type": "string"}
            },
            "required": ["path", "contents"],
            "additionalProperties": false
        }),
        vec![Capability::Fs],
        ToolTags::default(),
        Duration::from_secs(30),
        handler(|ctx: ToolCtx, args| async move {
            if !ctx.permissions.file_transfer {
                return Err(DispatchError::new(
                    ErrorCode::PolicyBlocked,
                    "file_transfer_disabled",
                ));
            }
            let fs = require(&ctx.adapter.fs, Capability::Fs)?;
            #[derive(Deserialize)]
            struct Args {
                path: String,
                contents: String,
            }
            let args: Args = decode_args(args)?;
            fs.write(&args.path, args.contents.as_bytes()).await.map_err(adapter_err)?;
            Ok(json!({"ok": true}))
        }),
    )?)?;

    registry.register(tool(
        "fs_list",
        "List a directory",
        json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"],
            "additionalProperties": false
        }),
        vec![Capability::Fs],
        ToolTags { read_only: true, ..Default::default() },
        Duration::from_secs(30),
        handler(|ctx: ToolCtx, args| async move {
            let fs = require(&ctx.adapter.fs, Capability::Fs)?;
            #[derive(Deserialize)]
            struct Args {
                path: String,
            }
            let args: Args = decode_args(args)?;
            let entries = fs.list(&args.path).await.map_err(adapter_err)?;
            serde_json::to_value(entries).map_err(DispatchError::internal)
        }),
    )?)?;

    Ok(())
}

// -- host / credentials -------------------------------------------------------

fn register_host(registry: &ToolRegistry) -> anyhow::Result<()> {
    registry.register(tool(
        "system_info",
        "Basic host facts: hostname, OS version, MAC addresses, uptime",
        schema::empty_object(),
        vec![Capability::Net],
        ToolTags { read_only: true, ..Default::default() },
        Duration::from_secs(15),
        handler(|ctx: ToolCtx, _args| async move {
            let host = require(&ctx.adapter.host, Capability::Net)?;
            let info = host.info().await.map_err(adapter_err)?;
            serde_json::to_value(info).map_err(DispatchError::internal)
        }),
    )?)?;
    Ok(())
}

fn register_credentials(registry: &ToolRegistry) -> anyhow::Result<()> {
    registry.register(tool(
        "credential_get",
        "Probe a credential entry; the value itself is never returned",
        json!({
            "type": "object",
            "properties": {"key": {"type": "string", "minLength": 1}},
            "required": ["key"],
            "additionalProperties": false
        }),
        vec![Capability::Credentials],
        ToolTags { serialized_globally: true, read_only: true, ..Default::default() },
        Duration::from_secs(15),
        handler(|ctx: ToolCtx, args| async move {
            let store = require(&ctx.adapter.credentials, Capability::Credentials)?;
            #[derive(Deserialize)]
            struct Args {
                key: String,
            }
            let args: Args = decode_args(args)?;
            let value = store.get(&args.key).await.map_err(adapter_err)?;
            Ok(json!({
                "present": value.is_some(),
                "length": value.map(|v| v.len()),
            }))
        }),
    )?)?;
    Ok(())
}

// -- GUI family ---------------------------------------------------------------

fn register_clipboard(registry: &ToolRegistry) -> anyhow::Result<()> {
    registry.register(tool(
        "clipboard_read",
        "Read the clipboard as text",
        schema::empty_object(),
        vec![Capability::Clipboard],
        ToolTags { gui_only: true, read_only: true, ..Default::default() },
        Duration::from_secs(10),
        handler(|ctx: ToolCtx, _args| async move {
            let clipboard = require(&ctx.adapter.clipboard, Capability::Clipboard)?;
            let text = clipboard.read().await.map_err(adapter_err)?;
            Ok(json!({"text": text}))
        }),
    )?)?;

    registry.register(tool(
        "clipboard_write",
        "Replace the clipboard with the given text",
        json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"],
            "additionalProperties": false
        }),
        vec![Capability::Clipboard],
        ToolTags { gui_only: true, ..Default::default() },
        Duration::from_secs(10),
        handler(|ctx: ToolCtx, args| async move {
            let clipboard = require(&ctx.adapter.clipboard, Capability::Clipboard)?;
            #[derive(Deserialize)]
            struct Args {
                text: String,
            }
            let args: Args = decode_args(args)?;
            clipboard.write(&args.text).await.map_err(adapter_err)?;
            Ok(json!({"ok": true}))
        }),
    )?)?;

    Ok(())
}

fn register_screen(registry: &ToolRegistry) -> anyhow::Result<()> {
    registry.register(tool(
        "screen_capture",
        "Capture a display as PNG",
        json!({
            "type": "object",
            "properties": {"display": {"type": "integer", "minimum": 0}},
            "additionalProperties": false
        }),
        vec![Capability::ScreenCapture],
        ToolTags { exclusive: true, gui_only: true, read_only: true, ..Default::default() },
        Duration::from_secs(30),
        handler(|ctx: ToolCtx, args| async move {
            let screen = require(&ctx.adapter.screen, Capability::ScreenCapture)?;
            #[derive(Deserialize)]
            struct Args {
                display: Option<u32>,
            }
            let args: Args = decode_args(args)?;
            let shot =
                screen.capture(args.display, ctx.cancel.clone()).await.map_err(adapter_err)?;
            Ok(json!({
                "width": shot.width,
                "height": shot.height,
                "pngBytes": shot.png.len(),
            }))
        }),
    )?)?;
    Ok(())
}

fn register_input(registry: &ToolRegistry) -> anyhow::Result<()> {
    registry.register(tool(
        "input_type",
        "Type text into the focused window",
        json!({
            "type": "object",
            "properties": {"text": {"type": "string", "minLength": 1}},
            "required": ["text"],
            "additionalProperties": false
        }),
        vec![Capability::InputInject],
        ToolTags { gui_only: true, ..Default::default() },
        Duration::from_secs(15),
        handler(|ctx: ToolCtx, args| async move {
            let input = require(&ctx.adapter.input, Capability::InputInject)?;
            #[derive(Deserialize)]
            struct Args {
                text: String,
            }
            let args: Args = decode_args(args)?;
            input.type_text(&args.text).await.map_err(adapter_err)?;
            Ok(json!({"ok": true}))
        }),
    )?)?;

    registry.register(tool(
        "input_click",
        "Click at screen coordinates",
        json!({
            "type": "object",
            "properties": {
                "x": {"type": "integer"},
                "y": {"type": "integer"},
                "button": {"type": "string", "enum": ["left", "right", "middle"]}
            },
            "required": ["x", "y"],
            "additionalProperties": false
        }),
        vec![Capability::InputInject],
        ToolTags { gui_only: true, ..Default::default() },
        Duration::from_secs(15),
        handler(|ctx: ToolCtx, args| async move {
            let input = require(&ctx.adapter.input, Capability::InputInject)?;
            #[derive(Deserialize)]
            struct Args {
                x: i32,
                y: i32,
                button: Option<MouseButton>,
            }
            let args: Args = decode_args(args)?;
            input
                .click(args.x, args.y, args.button.unwrap_or(MouseButton::Left))
                .await
                .map_err(adapter_err)?;
            Ok(json!({"ok": true}))
        }),
    )?)?;

    Ok(())
}

fn register_window(registry: &ToolRegistry) -> anyhow::Result<()> {
    registry.register(tool(
        "window_list",
        "List visible top-level windows",
        schema::empty_object(),
        vec![Capability::Window],
        ToolTags { gui_only: true, read_only: true, ..Default::default() },
        Duration::from_secs(15),
        handler(|ctx: ToolCtx, _args| async move {
            let window = require(&ctx.adapter.window, Capability::Window)?;
            let windows = window.list().await.map_err(adapter_err)?;
            serde_json::to_value(windows).map_err(DispatchError::internal)
        }),
    )?)?;
    Ok(())
}

fn register_power(registry: &ToolRegistry) -> anyhow::Result<()> {
    registry.register(tool(
        "power_info",
        "Host power facts: AC state and battery level",
        schema::empty_object(),
        vec![Capability::Power],
        ToolTags { read_only: true, ..Default::default() },
        Duration::from_secs(10),
        handler(|ctx: ToolCtx, _args| async move {
            let power = require(&ctx.adapter.power, Capability::Power)?;
            let info = power.info().await.map_err(adapter_err)?;
            serde_json::to_value(info).map_err(DispatchError::internal)
        }),
    )?)?;
    Ok(())
}

#[cfg(test)]
#[path = "builtin_tests.rs"]
mod tests;
