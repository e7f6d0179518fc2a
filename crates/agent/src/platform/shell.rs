// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shell capability backed by `tokio::process`. One-shot executions are
//! killed on cancellation; long-lived sessions live in a table keyed by
//! session id and end on process exit or explicit stop.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::caps::{ShellChunk, ShellCommand, ShellOps, ShellOutput, ShellSessionInfo};

/// Checks whether a process with the given PID is alive.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(pid_i32) = i32::try_from(pid) else {
        return false;
    };
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid_i32), None).is_ok()
}

#[cfg(not(unix))]
pub fn is_process_alive(_pid: u32) -> bool {
    true
}

fn build_command(cmd: &ShellCommand) -> Command {
    #[cfg(unix)]
    let mut command = {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&cmd.command);
        c
    };
    #[cfg(windows)]
    let mut command = {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&cmd.command);
        c
    };
    if let Some(cwd) = &cmd.cwd {
        command.current_dir(cwd);
    }
    for (key, value) in &cmd.env {
        command.env(key, value);
    }
    command.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());
    command.kill_on_drop(true);
    command
}

/// Shared buffer a session's pump task appends output into.
#[derive(Default)]
struct SessionBuffer {
    data: Vec<u8>,
    exited: bool,
    exit_code: Option<i32>,
}

struct SessionEntry {
    pid: Option<u32>,
    is_pty: bool,
    stdin: Option<ChildStdin>,
    buffer: Arc<std::sync::Mutex<SessionBuffer>>,
    cancel: CancellationToken,
}

/// The local shell backend and its session table.
#[derive(Default)]
pub struct LocalShell {
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl LocalShell {
    /// Kill every live session. Called on emergency stop and shutdown.
    pub async fn kill_all(&self) {
        let mut sessions = self.sessions.lock().await;
        for (_, entry) in sessions.drain() {
            entry.cancel.cancel();
        }
    }
}

#[async_trait]
impl ShellOps for LocalShell {
    async fn exec(
        &self,
        cmd: ShellCommand,
        cancel: CancellationToken,
    ) -> anyhow::Result<ShellOutput> {
        let mut child = build_command(&cmd).spawn()?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        drop(child.stdin.take());

        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                anyhow::bail!("cancelled");
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        Ok(ShellOutput {
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    async fn session_start(&self, cmd: ShellCommand) -> anyhow::Result<ShellSessionInfo> {
        let mut child = build_command(&cmd).spawn()?;
        let session_id = uuid::Uuid::new_v4().to_string();
        let pid = child.id();
        let stdin = child.stdin.take();
        let buffer = Arc::new(std::sync::Mutex::new(SessionBuffer::default()));
        let cancel = CancellationToken::new();

        tokio::spawn(pump_session(child, Arc::clone(&buffer), cancel.clone()));

        let entry = SessionEntry { pid, is_pty: false, stdin, buffer, cancel };
        let info = ShellSessionInfo {
            session_id: session_id.clone(),
            pid,
            is_pty: entry.is_pty,
            exited: false,
            exit_code: None,
        };
        self.sessions.lock().await.insert(session_id, entry);
        Ok(info)
    }

    async fn session_write(&self, session_id: &str, data: &str) -> anyhow::Result<()> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| anyhow::anyhow!("unknown shell session: {session_id}"))?;
        let stdin =
            entry.stdin.as_mut().ok_or_else(|| anyhow::anyhow!("session stdin closed"))?;
        stdin.write_all(data.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn session_read(&self, session_id: &str) -> anyhow::Result<ShellChunk> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get(session_id)
            .ok_or_else(|| anyhow::anyhow!("unknown shell session: {session_id}"))?;

        let (data, exited, exit_code) = {
            let mut buffer = entry.buffer.lock().unwrap_or_else(|e| e.into_inner());
            let data = String::from_utf8_lossy(&buffer.data).into_owned();
            buffer.data.clear();
            (data, buffer.exited, buffer.exit_code)
        };

        // The table entry ends once the process exited and output is drained.
        if exited {
            sessions.remove(session_id);
        }
        Ok(ShellChunk { data, exited, exit_code })
    }

    async fn session_stop(&self, session_id: &str) -> anyhow::Result<()> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .remove(session_id)
            .ok_or_else(|| anyhow::anyhow!("unknown shell session: {session_id}"))?;
        entry.cancel.cancel();
        Ok(())
    }

    async fn sessions(&self) -> Vec<ShellSessionInfo> {
        let sessions = self.sessions.lock().await;
        sessions
            .iter()
            .map(|(id, entry)| {
                let buffer = entry.buffer.lock().unwrap_or_else(|e| e.into_inner());
                // The pump may not have observed a death yet; probe the pid.
                let exited = buffer.exited
                    || entry.pid.is_some_and(|pid| !is_process_alive(pid));
                ShellSessionInfo {
                    session_id: id.clone(),
                    pid: entry.pid,
                    is_pty: entry.is_pty,
                    exited,
                    exit_code: buffer.exit_code,
                }
            })
            .collect()
    }
}

/// Pump child stdout/stderr into the session buffer until exit or cancel.
async fn pump_session(
    mut child: Child,
    buffer: Arc<std::sync::Mutex<SessionBuffer>>,
    cancel: CancellationToken,
) {
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut out_chunk = [0u8; 4096];
    let mut err_chunk = [0u8; 4096];
    let mut out_open = stdout.is_some();
    let mut err_open = stderr.is_some();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                let mut buf = buffer.lock().unwrap_or_else(|e| e.into_inner());
                buf.exited = true;
                return;
            }
            read = read_some(&mut stdout, &mut out_chunk), if out_open => {
                match read {
                    Some(n) if n > 0 => {
                        let mut buf = buffer.lock().unwrap_or_else(|e| e.into_inner());
                        buf.data.extend_from_slice(&out_chunk[..n]);
                    }
                    _ => out_open = false,
                }
            }
            read = read_some(&mut stderr, &mut err_chunk), if err_open => {
                match read {
                    Some(n) if n > 0 => {
                        let mut buf = buffer.lock().unwrap_or_else(|e| e.into_inner());
                        buf.data.extend_from_slice(&err_chunk[..n]);
                    }
                    _ => err_open = false,
                }
            }
            status = child.wait(), if !out_open && !err_open => {
                let mut buf = buffer.lock().unwrap_or_else(|e| e.into_inner());
                buf.exited = true;
                buf.exit_code = status.ok().and_then(|s| s.code());
                return;
            }
        }
    }
}

async fn read_some<R: AsyncReadExt + Unpin>(
    reader: &mut Option<R>,
    chunk: &mut [u8],
) -> Option<usize> {
    match reader {
        Some(r) => r.read(chunk).await.ok(),
        None => None,
    }
}

#[cfg(test)]
#[path = "shell_tests.rs"]
mod tests;
