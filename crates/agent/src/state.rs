// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::identity;
use crate::license::LicenseGate;
use crate::platform::PlatformAdapter;
use crate::power::PowerControl;
use crate::registry::ToolRegistry;
use crate::session::pending::PendingTable;
use crate::session::wire::Frame;
use crate::update::StateCell;

/// Shared agent state. Explicit collaborators passed by construction;
/// no module-level mutable state.
pub struct AgentCtx {
    pub config: Config,
    pub machine_id: String,
    pub fingerprint: String,
    pub version: String,
    pub license: LicenseGate,
    pub power: PowerControl,
    pub registry: Arc<ToolRegistry>,
    pub adapter: Arc<PlatformAdapter>,
    pub pending: Arc<PendingTable>,
    /// Agent-initiated notifications, forwarded upstream by the session.
    pub notify_tx: mpsc::Sender<Frame>,
    pub update_state: Arc<StateCell>,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl AgentCtx {
    /// Build the shared context, probing identity from the host. Returns
    /// the notification receiver for the session to consume.
    pub fn new(
        config: Config,
        adapter: Arc<PlatformAdapter>,
        registry: Arc<ToolRegistry>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<(Arc<Self>, mpsc::Receiver<Frame>)> {
        let machine_id = identity::load_or_create_machine_id(&config.state_dir())?;
        let fingerprint = identity::HardwareFacts::probe().fingerprint();
        let (notify_tx, notify_rx) = mpsc::channel(64);

        let ctx = Arc::new(Self {
            config,
            machine_id,
            fingerprint,
            version: env!("CARGO_PKG_VERSION").to_owned(),
            license: LicenseGate::new(),
            power: PowerControl::new(),
            registry,
            adapter,
            pending: PendingTable::new(),
            notify_tx,
            update_state: Arc::new(StateCell::default()),
            shutdown,
            started_at: Instant::now(),
        });
        Ok((ctx, notify_rx))
    }
}

/// Current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
