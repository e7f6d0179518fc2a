// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end scenarios.
//!
//! Spawns the real `outpost` binary as a subprocess and plays the control
//! plane against it over an in-process WebSocket server.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Once;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times — only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Resolve the path to the compiled `outpost` binary.
pub fn outpost_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("outpost")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `outpost` process that is killed on drop.
pub struct AgentProcess {
    child: Child,
    pub facade_port: Option<u16>,
    _state_dir: tempfile::TempDir,
}

impl AgentProcess {
    /// Start the agent pointed at the given control-plane port.
    pub fn start(control_port: u16) -> anyhow::Result<Self> {
        Self::start_with(control_port, false)
    }

    /// Start the agent, optionally with the localhost facade enabled.
    pub fn start_with(control_port: u16, facade: bool) -> anyhow::Result<Self> {
        let state_dir = tempfile::tempdir()?;
        let facade_port = if facade { Some(free_port()?) } else { None };

        let mut cmd = Command::new(outpost_binary());
        cmd.env("OUTPOST_SERVER_URL", format!("ws://127.0.0.1:{control_port}/ws"))
            .env("OUTPOST_STATE_DIR", state_dir.path())
            .env("OUTPOST_CONFIG_DIR", state_dir.path())
            .env("OUTPOST_LOG_LEVEL", "debug")
            .env_remove("OUTPOST_FACADE_PORT")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(port) = facade_port {
            cmd.env("OUTPOST_FACADE_PORT", port.to_string());
        }

        let child = cmd.spawn()?;
        Ok(Self { child, facade_port, _state_dir: state_dir })
    }

    pub fn facade_url(&self) -> Option<String> {
        self.facade_port.map(|port| format!("http://127.0.0.1:{port}"))
    }
}

impl Drop for AgentProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// The fake control plane: accepts agent connections one at a time.
pub struct ControlPlane {
    listener: TcpListener,
    port: u16,
}

impl ControlPlane {
    pub async fn bind() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accept the next agent connection.
    pub async fn accept(&self) -> anyhow::Result<AgentSession> {
        let (stream, _) = self.listener.accept().await?;
        let ws = tokio_tungstenite::accept_async(stream).await?;
        Ok(AgentSession { ws })
    }
}

/// One accepted agent connection, driven frame by frame.
pub struct AgentSession {
    ws: WebSocketStream<TcpStream>,
}

/// Default wait for any expected frame.
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(15);

impl AgentSession {
    /// Send a JSON frame to the agent.
    pub async fn send(&mut self, frame: serde_json::Value) -> anyhow::Result<()> {
        self.ws.send(Message::Text(frame.to_string().into())).await?;
        Ok(())
    }

    /// Receive the next JSON text frame.
    pub async fn next_frame(&mut self) -> anyhow::Result<serde_json::Value> {
        loop {
            let msg = tokio::time::timeout(FRAME_TIMEOUT, self.ws.next())
                .await?
                .ok_or_else(|| anyhow::anyhow!("agent closed the connection"))?;
            match msg? {
                Message::Text(text) => return Ok(serde_json::from_str(text.as_str())?),
                Message::Close(_) => anyhow::bail!("agent closed the connection"),
                _ => {}
            }
        }
    }

    /// Receive frames until one matches the predicate, dropping the rest
    /// (heartbeats, notifications).
    pub async fn recv_until<F>(&mut self, mut want: F) -> anyhow::Result<serde_json::Value>
    where
        F: FnMut(&serde_json::Value) -> bool,
    {
        let deadline = tokio::time::Instant::now() + FRAME_TIMEOUT;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("expected frame never arrived");
            }
            let frame = self.next_frame().await?;
            if want(&frame) {
                return Ok(frame);
            }
        }
    }

    /// Wait for the agent's `register` frame.
    pub async fn expect_register(&mut self) -> anyhow::Result<serde_json::Value> {
        self.recv_until(|frame| frame["type"] == "register").await
    }

    /// Reply to registration with a standard ack.
    pub async fn ack(
        &mut self,
        heartbeat_ms: u64,
        license_status: &str,
    ) -> anyhow::Result<()> {
        self.send(serde_json::json!({
            "type": "register_ack",
            "sessionId": "s1",
            "config": { "heartbeatInterval": heartbeat_ms, "powerState": "ACTIVE" },
            "licenseStatus": license_status,
            "agentSecret": "sek-test",
        }))
        .await
    }

    /// Wait for the single outcome of a request id: `response` or `error`.
    pub async fn expect_outcome(&mut self, id: &str) -> anyhow::Result<serde_json::Value> {
        self.recv_until(|frame| {
            (frame["type"] == "response" || frame["type"] == "error") && frame["id"] == id
        })
        .await
    }

    /// Close the session the way the server replaces a connection.
    pub async fn close_replaced(mut self) -> anyhow::Result<()> {
        self.ws
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "replaced".into(),
            })))
            .await?;
        let _ = self.ws.close(None).await;
        Ok(())
    }
}
