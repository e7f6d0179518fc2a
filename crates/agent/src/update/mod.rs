// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat-driven auto-update engine: fingerprint-driven check, verified
//! download into the staging directory, atomic swap, restart. Failures
//! enter a cool-down instead of crashing the agent.

pub mod check;
pub mod download;
pub mod install;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};

use crate::session::wire::Frame;
use crate::state::AgentCtx;
use check::{CheckOutcome, CheckParams, UpdateDescriptor};

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Checking,
    UpToDate,
    Available,
    Downloading,
    Downloaded,
    Installing,
    Failed(Instant),
}

impl EngineState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Checking => "CHECKING",
            Self::UpToDate => "UP_TO_DATE",
            Self::Available => "AVAILABLE",
            Self::Downloading => "DOWNLOADING",
            Self::Downloaded => "DOWNLOADED",
            Self::Installing => "INSTALLING",
            Self::Failed(_) => "FAILED",
        }
    }
}

/// Shared engine state, readable by the `status` method and the facade.
pub struct StateCell {
    inner: parking_lot::Mutex<EngineState>,
}

impl Default for StateCell {
    fn default() -> Self {
        Self { inner: parking_lot::Mutex::new(EngineState::Idle) }
    }
}

impl StateCell {
    pub fn get(&self) -> EngineState {
        *self.inner.lock()
    }

    pub fn set(&self, state: EngineState) {
        *self.inner.lock() = state;
    }

    pub fn label(&self) -> &'static str {
        self.get().label()
    }
}

/// Engine input: heartbeat ticks and server flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// One heartbeat elapsed.
    Tick,
    /// Server `update_flag`: 1 = check now, 2 = forced install.
    Flag(u8),
}

/// Cloneable handle the session uses to feed the engine.
#[derive(Clone)]
pub struct UpdateHandle {
    tx: mpsc::Sender<Signal>,
}

impl UpdateHandle {
    pub fn heartbeat_tick(&self) {
        let _ = self.tx.try_send(Signal::Tick);
    }

    pub fn flag(&self, flag: u8) {
        if flag > 0 {
            let _ = self.tx.try_send(Signal::Flag(flag));
        }
    }
}

/// A verified artifact waiting for install.
#[derive(Debug, Clone)]
struct Staged {
    descriptor: UpdateDescriptor,
    path: PathBuf,
}

pub struct UpdateEngine {
    ctx: Arc<AgentCtx>,
    client: reqwest::Client,
    heartbeats: u32,
    staged: Option<Staged>,
    progress: watch::Sender<download::Progress>,
}

impl UpdateEngine {
    /// Spawn the engine task; returns the session-facing handle.
    pub fn spawn(ctx: Arc<AgentCtx>) -> UpdateHandle {
        let (tx, rx) = mpsc::channel(16);
        let (progress, _) = watch::channel(download::Progress::default());
        let engine = Self {
            ctx,
            client: reqwest::Client::new(),
            heartbeats: 0,
            staged: None,
            progress,
        };
        tokio::spawn(engine.run(rx));
        UpdateHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Signal>) {
        loop {
            let signal = tokio::select! {
                _ = self.ctx.shutdown.cancelled() => break,
                signal = rx.recv() => match signal {
                    Some(signal) => signal,
                    None => break,
                },
            };
            match signal {
                Signal::Tick => {
                    self.heartbeats += 1;
                    if self.heartbeats >= self.ctx.config.update_check_heartbeats {
                        self.heartbeats = 0;
                        self.attempt(false).await;
                    }
                }
                Signal::Flag(1) => self.attempt(false).await,
                Signal::Flag(2) => self.attempt(true).await,
                Signal::Flag(_) => {}
            }
        }
    }

    /// One full check→download→install attempt. `forced` overrides both
    /// the failure cool-down and `auto_install=false`.
    async fn attempt(&mut self, forced: bool) {
        let cell = &self.ctx.update_state;
        match cell.get() {
            EngineState::Failed(at) => {
                let cooled = at.elapsed() >= self.ctx.config.update_cooldown();
                if !cooled && !forced {
                    tracing::debug!("update attempt suppressed during cool-down");
                    return;
                }
                cell.set(EngineState::Idle);
            }
            EngineState::Checking | EngineState::Downloading | EngineState::Installing => {
                return; // an attempt is already in flight
            }
            _ => {}
        }

        // Idempotence: a verified staged artifact needs no new download.
        if let Some(staged) = self.staged.clone() {
            if download::staged_matches(&staged.path, &staged.descriptor.sha256).await {
                cell.set(EngineState::Downloaded);
                if self.ctx.config.auto_install || forced || staged.descriptor.is_forced {
                    self.install(&staged).await;
                }
                return;
            }
            self.staged = None;
        }

        cell.set(EngineState::Checking);
        let params = CheckParams {
            platform: crate::identity::platform().to_owned(),
            arch: crate::identity::arch().to_owned(),
            current_version: self.ctx.version.clone(),
            channel: self.ctx.config.channel.clone(),
            machine_id: self.ctx.machine_id.clone(),
        };
        let base_url = self.ctx.config.effective_update_url();
        let descriptor = match check::check(&self.client, &base_url, &params).await {
            Ok(CheckOutcome::UpToDate { reason }) => {
                tracing::debug!(reason = reason.as_deref().unwrap_or("current"), "no update");
                cell.set(EngineState::UpToDate);
                return;
            }
            Ok(CheckOutcome::Available(descriptor)) => descriptor,
            Err(e) => {
                tracing::warn!(err = %e, "update check failed");
                self.fail(&format!("check failed: {e}"));
                return;
            }
        };

        if !check::is_newer(&self.ctx.version, &descriptor.version) {
            tracing::debug!(advertised = %descriptor.version, "advertised version is not newer");
            cell.set(EngineState::UpToDate);
            return;
        }

        tracing::info!(version = %descriptor.version, forced, "update available");
        cell.set(EngineState::Available);
        let forced = forced || descriptor.is_forced;
        if !self.ctx.config.auto_download && !forced {
            return;
        }

        cell.set(EngineState::Downloading);
        let dest = self.ctx.config.staging_dir().join(descriptor.artifact_name());
        let url = absolute_url(&base_url, &descriptor.download_url);
        let cancel = self.ctx.shutdown.child_token();
        if let Err(e) = download::download(
            &self.client,
            &url,
            &dest,
            &descriptor.sha256,
            &cancel,
            &self.progress,
        )
        .await
        {
            tracing::warn!(err = %e, "update download failed");
            self.fail(&format!("download failed: {e}"));
            return;
        }

        cell.set(EngineState::Downloaded);
        self.notify("update-downloaded", serde_json::json!({ "version": descriptor.version }));
        let staged = Staged { descriptor, path: dest };
        self.staged = Some(staged.clone());

        if self.ctx.config.auto_install || forced {
            self.install(&staged).await;
        }
    }

    async fn install(&mut self, staged: &Staged) {
        let cell = &self.ctx.update_state;
        cell.set(EngineState::Installing);
        self.notify(
            "update-installing",
            serde_json::json!({ "version": staged.descriptor.version }),
        );

        // On success this does not return: the process is replaced.
        if let Err(e) = install::apply_and_relaunch(&staged.path) {
            tracing::error!(err = %e, "update install failed");
            self.staged = None;
            self.fail(&format!("install failed: {e}"));
        }
    }

    fn fail(&mut self, reason: &str) {
        self.ctx.update_state.set(EngineState::Failed(Instant::now()));
        self.notify("update-failed", serde_json::json!({ "reason": reason }));
    }

    fn notify(&self, event: &str, data: serde_json::Value) {
        let frame = Frame::Notification { event: event.to_owned(), data };
        if self.ctx.notify_tx.try_send(frame).is_err() {
            tracing::debug!(event, "update notification dropped");
        }
    }
}

/// Resolve a possibly relative download URL against the update base.
fn absolute_url(base: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_owned()
    } else {
        format!("{base}{url}")
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
