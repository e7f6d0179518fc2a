// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability traits implemented by platform backends. Each operation is
//! idempotent where possible and honours cooperative cancellation.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Returned by gui-only capabilities when no interactive desktop session
/// is available (headless host or locked screen without a helper).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoGuiSession;

impl fmt::Display for NoGuiSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NO_GUI_SESSION")
    }
}

impl std::error::Error for NoGuiSession {}

/// A captured screen image.
#[derive(Debug, Clone)]
pub struct ScreenShot {
    pub width: u32,
    pub height: u32,
    /// PNG-encoded image bytes.
    pub png: Vec<u8>,
}

#[async_trait]
pub trait ScreenOps: Send + Sync {
    /// Capture the given display (primary when `None`).
    async fn capture(&self, display: Option<u32>, cancel: CancellationToken)
        -> anyhow::Result<ScreenShot>;
    /// Whether the screen is currently locked.
    fn is_locked(&self) -> bool;
}

#[async_trait]
pub trait InputOps: Send + Sync {
    async fn type_text(&self, text: &str) -> anyhow::Result<()>;
    async fn click(&self, x: i32, y: i32, button: MouseButton) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

#[async_trait]
pub trait ClipboardOps: Send + Sync {
    async fn read(&self) -> anyhow::Result<String>;
    async fn write(&self, text: &str) -> anyhow::Result<()>;
}

/// Parameters for a one-shot shell execution.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl ShellCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into(), cwd: None, env: Vec::new() }
    }
}

/// Result of a completed one-shot shell execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// A live entry in the shell session table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellSessionInfo {
    pub session_id: String,
    pub pid: Option<u32>,
    pub is_pty: bool,
    pub exited: bool,
    pub exit_code: Option<i32>,
}

/// Output drained from a shell session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellChunk {
    pub data: String,
    pub exited: bool,
    pub exit_code: Option<i32>,
}

#[async_trait]
pub trait ShellOps: Send + Sync {
    /// Run a command to completion. Cancellation kills the child.
    async fn exec(&self, cmd: ShellCommand, cancel: CancellationToken)
        -> anyhow::Result<ShellOutput>;
    /// Start a long-lived session; returns its table entry.
    async fn session_start(&self, cmd: ShellCommand) -> anyhow::Result<ShellSessionInfo>;
    /// Write to a session's stdin.
    async fn session_write(&self, session_id: &str, data: &str) -> anyhow::Result<()>;
    /// Drain buffered output from a session.
    async fn session_read(&self, session_id: &str) -> anyhow::Result<ShellChunk>;
    /// Kill a session and drop its table entry.
    async fn session_stop(&self, session_id: &str) -> anyhow::Result<()>;
    /// Snapshot the session table.
    async fn sessions(&self) -> Vec<ShellSessionInfo>;
}

/// A directory listing entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FsEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

#[async_trait]
pub trait FsOps: Send + Sync {
    async fn read(&self, path: &str) -> anyhow::Result<Vec<u8>>;
    async fn write(&self, path: &str, contents: &[u8]) -> anyhow::Result<()>;
    async fn list(&self, path: &str) -> anyhow::Result<Vec<FsEntry>>;
}

#[async_trait]
pub trait CredentialOps: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// Basic host facts surfaced by the `system_info` tool and heartbeats.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInfo {
    pub hostname: Option<String>,
    pub os_version: Option<String>,
    pub mac_addresses: Vec<String>,
    pub uptime_secs: u64,
}

#[async_trait]
pub trait HostOps: Send + Sync {
    async fn info(&self) -> anyhow::Result<HostInfo>;
}

/// A top-level window visible to the window capability.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowInfo {
    pub id: u64,
    pub title: String,
    pub app: String,
    pub focused: bool,
}

#[async_trait]
pub trait WindowOps: Send + Sync {
    async fn list(&self) -> anyhow::Result<Vec<WindowInfo>>;
}

/// Host power facts (not to be confused with the session power state).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostPowerInfo {
    pub on_ac_power: bool,
    pub battery_percent: Option<u8>,
}

#[async_trait]
pub trait PowerOps: Send + Sync {
    async fn info(&self) -> anyhow::Result<HostPowerInfo>;
}
