// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane session: a single authenticated duplex WebSocket with
//! ordered, typed frames in both directions. Reconnects forever with
//! full-jitter backoff; one writer task owns the socket; inbound requests
//! are routed to the dispatcher through the pending table.

pub mod backoff;
pub mod pending;
pub mod wire;

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::dispatch::{Dispatcher, HARD_DEADLINE_CAP};
use crate::error::ErrorCode;
use crate::state::AgentCtx;
use crate::update::UpdateHandle;
use backoff::Backoff;
use pending::Origin;
use wire::{Fingerprint, Frame, SessionConfig, CLOSE_REPLACED, INVALID_AGENT_SECRET};

/// How long to wait for `register_ack` before tearing the socket down.
const ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Heartbeat overshoot beyond which the host is assumed to have slept.
const WAKE_DRIFT: Duration = Duration::from_secs(60);

/// Keyring entry holding the agent secret.
const SECRET_KEY: &str = "agent-secret";

/// Why a connection ended.
enum SessionEnd {
    /// Server refused the stored agent secret.
    AuthRejected,
    /// Transport closed or errored; reconnect with backoff.
    Disconnected,
    /// The agent is shutting down.
    Shutdown,
}

pub struct SessionLayer {
    ctx: Arc<AgentCtx>,
    dispatcher: Arc<Dispatcher>,
    update: UpdateHandle,
    notify_rx: mpsc::Receiver<Frame>,
}

impl SessionLayer {
    pub fn new(
        ctx: Arc<AgentCtx>,
        dispatcher: Arc<Dispatcher>,
        update: UpdateHandle,
        notify_rx: mpsc::Receiver<Frame>,
    ) -> Self {
        Self { ctx, dispatcher, update, notify_rx }
    }

    /// Run until shutdown. Never gives up on the control plane.
    pub async fn run(mut self) {
        let mut backoff = Backoff::default();
        loop {
            if self.ctx.shutdown.is_cancelled() {
                break;
            }

            let end = self.connect_and_run().await;
            // Whatever ended the session, waiters must not hang.
            self.ctx.pending.fail_origin(
                Origin::ControlPlane,
                ErrorCode::Cancelled,
                "session disconnected",
            );

            let delay = match end {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::AuthRejected) => {
                    tracing::warn!("agent secret rejected; entering long backoff");
                    backoff.reset();
                    backoff::AUTH_REJECTED
                }
                Ok(SessionEnd::Disconnected) => backoff.next_delay(),
                Err(e) => {
                    tracing::debug!(err = %e, "control plane connection failed");
                    backoff.next_delay()
                }
            };

            tokio::select! {
                _ = self.ctx.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn connect_and_run(&mut self) -> anyhow::Result<SessionEnd> {
        let url = self.ctx.config.server_url.clone();
        // A dead proxy can accept TCP and then never finish the upgrade;
        // bound the whole handshake.
        let (ws, _) =
            tokio::time::timeout(ACK_TIMEOUT, tokio_tungstenite::connect_async(&url))
                .await
                .map_err(|_| anyhow::anyhow!("websocket handshake timed out"))??;
        let (write, mut read) = ws.split();

        // Single outbound writer: owns the sink, serializes every frame.
        let (out_tx, mut out_rx) = mpsc::channel::<Frame>(64);
        let writer_cancel = CancellationToken::new();
        let writer_guard = writer_cancel.clone();
        let writer = tokio::spawn(async move {
            let mut write = write;
            loop {
                let frame = tokio::select! {
                    _ = writer_guard.cancelled() => break,
                    frame = out_rx.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };
                let text = match frame.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(err = %e, "outbound frame encode failed");
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    // A failed write fails that frame only; the read side
                    // notices the dead socket and reconnects.
                    tracing::debug!(err = %e, "outbound write failed");
                    break;
                }
            }
            let _ = write.close().await;
        });

        let end = self.registered_session(&mut read, &out_tx).await;
        writer_cancel.cancel();
        let _ = writer.await;
        end
    }

    /// Register, then serve the session until it ends.
    async fn registered_session(
        &mut self,
        read: &mut (impl Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
                  + Unpin),
        out_tx: &mpsc::Sender<Frame>,
    ) -> anyhow::Result<SessionEnd> {
        // First frame: register. The secret travels only here.
        let secret = self.load_secret().await;
        let register = Frame::Register {
            machine_id: self.ctx.machine_id.clone(),
            fingerprint: Fingerprint { hash: self.ctx.fingerprint.clone() },
            os: crate::identity::platform().to_owned(),
            arch: crate::identity::arch().to_owned(),
            version: self.ctx.version.clone(),
            agent_name: self.ctx.config.agent_name.clone(),
            agent_secret: secret,
        };
        out_tx.send(register).await.map_err(|_| anyhow::anyhow!("writer gone"))?;

        let ack = tokio::time::timeout(ACK_TIMEOUT, wait_for_ack(read)).await;
        let (session_id, config, license_status, minted_secret) = match ack {
            Ok(Ok(Frame::RegisterAck { error: Some(reason), .. }))
                if reason == INVALID_AGENT_SECRET =>
            {
                return Ok(SessionEnd::AuthRejected);
            }
            Ok(Ok(Frame::RegisterAck { error: Some(reason), .. })) => {
                anyhow::bail!("registration refused: {reason}");
            }
            Ok(Ok(Frame::RegisterAck { session_id, config, license_status, agent_secret, .. })) => {
                (session_id, config, license_status, agent_secret)
            }
            Ok(Ok(other)) => anyhow::bail!("expected register_ack, got {}", other.kind()),
            Ok(Err(e)) => return Err(e),
            Err(_) => anyhow::bail!("register_ack timed out"),
        };

        tracing::info!(
            session_id = session_id.as_deref().unwrap_or("-"),
            "registered with control plane"
        );
        self.ctx.pending.begin_session();
        if let Some(status) = license_status {
            self.ctx.license.apply_status(status);
        }
        self.apply_config(&config);
        if let Some(secret) = minted_secret {
            self.store_secret(&secret).await;
        }

        self.serve(read, out_tx).await
    }

    /// Main loop: route inbound frames, keep the heartbeat cadence, watch
    /// for silent connection death.
    async fn serve(
        &mut self,
        read: &mut (impl Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
                  + Unpin),
        out_tx: &mpsc::Sender<Frame>,
    ) -> anyhow::Result<SessionEnd> {
        let mut power_rx = self.ctx.power.subscribe();
        let mut interval = power_rx.borrow_and_update().heartbeat;
        let mut next_beat = Instant::now() + interval;
        let mut last_inbound = Instant::now();
        let mut counter: u64 = 0;

        loop {
            tokio::select! {
                _ = self.ctx.shutdown.cancelled() => return Ok(SessionEnd::Shutdown),

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            last_inbound = Instant::now();
                            self.handle_frame(text.as_str(), out_tx);
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let reason =
                                frame.map(|f| f.reason.to_string()).unwrap_or_default();
                            if reason.contains(CLOSE_REPLACED) {
                                tracing::info!("session replaced by a newer connection");
                            } else {
                                tracing::debug!(%reason, "server closed the session");
                            }
                            return Ok(SessionEnd::Disconnected);
                        }
                        Some(Ok(_)) => {
                            // Ping/pong/binary: traffic counts for liveness.
                            last_inbound = Instant::now();
                        }
                        Some(Err(e)) => {
                            tracing::debug!(err = %e, "session read error");
                            return Ok(SessionEnd::Disconnected);
                        }
                        None => return Ok(SessionEnd::Disconnected),
                    }
                }

                changed = power_rx.changed() => {
                    if changed.is_ok() {
                        // Adapt immediately to the new cadence.
                        interval = power_rx.borrow_and_update().heartbeat;
                        next_beat = next_beat.min(Instant::now() + interval);
                    }
                }

                frame = self.notify_rx.recv() => {
                    if let Some(frame) = frame {
                        if out_tx.try_send(frame).is_err() {
                            tracing::debug!("notification dropped: writer backlogged");
                        }
                    }
                }

                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(next_beat)) => {
                    // A beat firing far past its schedule means the host
                    // suspended through it: a locally detected wake event.
                    let overshoot = Instant::now().saturating_duration_since(next_beat);
                    if overshoot > WAKE_DRIFT {
                        tracing::info!(overshoot_secs = overshoot.as_secs(), "resume detected");
                        self.ctx.power.wake();
                    }

                    // Reverse proxies can kill a connection silently; treat
                    // prolonged inbound silence as a dead socket.
                    if last_inbound.elapsed() > interval.mul_f32(2.5) {
                        tracing::warn!("no inbound traffic; reconnecting");
                        return Ok(SessionEnd::Disconnected);
                    }

                    counter += 1;
                    let beat = Frame::Heartbeat {
                        power_state: self.ctx.power.snapshot().state,
                        screen_locked: self
                            .ctx
                            .adapter
                            .screen
                            .as_ref()
                            .map(|s| s.is_locked())
                            .unwrap_or(false),
                        current_task: self.dispatcher.current_task(),
                        version: self.ctx.version.clone(),
                        counter,
                        queued_requests: self.dispatcher.queued(),
                    };
                    // Heartbeats never wait on the dispatcher or the writer.
                    if out_tx.try_send(beat).is_err() {
                        tracing::debug!("heartbeat skipped: writer backlogged");
                    }
                    self.update.heartbeat_tick();
                    next_beat = Instant::now() + interval;
                }
            }
        }
    }

    /// Route one inbound text frame. A malformed frame is logged and
    /// dropped; the session stays up.
    fn handle_frame(&self, text: &str, out_tx: &mpsc::Sender<Frame>) {
        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(err = %e, "dropping malformed frame");
                return;
            }
        };

        match frame {
            Frame::Request { id, method, params } => {
                let deadline = Instant::now() + HARD_DEADLINE_CAP;
                let (sink, rx) = match self.ctx.pending.insert(&id, Origin::ControlPlane, deadline)
                {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(%id, "rejecting reused request id");
                        let _ = out_tx.try_send(Frame::Error {
                            id,
                            code: e.code,
                            message: e.message,
                        });
                        return;
                    }
                };

                // Forward the single outcome back through the writer.
                let forward_tx = out_tx.clone();
                let forward_id = id.clone();
                tokio::spawn(async move {
                    let frame = match rx.await {
                        Ok(Ok(result)) => Frame::Response { id: forward_id, result },
                        Ok(Err(e)) => {
                            Frame::Error { id: forward_id, code: e.code, message: e.message }
                        }
                        // Sink dropped without resolution; surface it.
                        Err(_) => Frame::Error {
                            id: forward_id,
                            code: ErrorCode::Internal,
                            message: "request lost".to_owned(),
                        },
                    };
                    let _ = forward_tx.send(frame).await;
                });

                self.dispatcher.submit(method, params, sink);
            }
            Frame::Config { config } => self.apply_config(&config),
            Frame::Wake {} => {
                tracing::info!("wake: forcing ACTIVE power state");
                self.ctx.power.wake();
            }
            Frame::LicenseStateChange { new_state, grace_period_ms } => {
                tracing::info!(state = new_state.as_str(), "license state change");
                self.ctx.license.apply_state_change(new_state, grace_period_ms);
            }
            other => {
                tracing::debug!(kind = other.kind(), "ignoring unexpected inbound frame");
            }
        }
    }

    fn apply_config(&self, config: &SessionConfig) {
        self.ctx.power.apply_config(config.power_state, config.heartbeat_interval);
        self.ctx.license.apply_config(config.permissions, config.default_browser);
        if let Some(flag) = config.update_flag {
            self.update.flag(flag);
        }
    }

    async fn load_secret(&self) -> Option<String> {
        let store = self.ctx.adapter.credentials.as_ref()?;
        match store.get(SECRET_KEY).await {
            Ok(secret) => secret,
            Err(e) => {
                tracing::warn!(err = %e, "credential store read failed");
                None
            }
        }
    }

    async fn store_secret(&self, secret: &str) {
        let Some(store) = self.ctx.adapter.credentials.as_ref() else {
            tracing::warn!("no credential store; agent secret not persisted");
            return;
        };
        if let Err(e) = store.set(SECRET_KEY, secret).await {
            tracing::warn!(err = %e, "agent secret persist failed");
        } else {
            tracing::info!("agent secret persisted to credential store");
        }
    }
}

/// Read frames until a `register_ack` arrives, dropping anything else.
async fn wait_for_ack(
    read: &mut (impl Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
              + Unpin),
) -> anyhow::Result<Frame> {
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => match Frame::decode(text.as_str()) {
                Ok(frame @ Frame::RegisterAck { .. }) => return Ok(frame),
                Ok(other) => {
                    tracing::debug!(kind = other.kind(), "frame before register_ack dropped");
                }
                Err(e) => tracing::warn!(err = %e, "dropping malformed frame"),
            },
            Some(Ok(Message::Close(_))) | None => anyhow::bail!("closed before register_ack"),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }
}
