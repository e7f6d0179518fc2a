// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outpost: managed endpoint agent for a remote automation fleet.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod facade;
pub mod identity;
pub mod license;
pub mod platform;
pub mod power;
pub mod registry;
pub mod session;
pub mod state;
pub mod update;

use std::sync::Arc;
use std::sync::Once;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, FileConfig};
use crate::dispatch::Dispatcher;
use crate::platform::PlatformAdapter;
use crate::registry::ToolRegistry;
use crate::session::SessionLayer;
use crate::state::AgentCtx;
use crate::update::UpdateEngine;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/tungstenite rustls.
/// Safe to call multiple times — only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Initialize tracing: env-filtered, json or text, with an optional
/// rotating file layer under the state directory. The returned guard
/// must live for the process lifetime when file logging is enabled.
pub fn init_tracing(
    config: &Config,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    let json = config.log_format == "json";

    if !config.log_to_file {
        if json {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
        return Ok(None);
    }

    let log_dir = config.state_dir().join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("outpost")
        .filename_suffix("log")
        .max_log_files(30)
        .build(&log_dir)?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .with(tracing_subscriber::fmt::layer().json().with_ansi(false).with_writer(file_writer))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_writer))
            .init();
    }
    Ok(Some(guard))
}

/// Run the agent until shutdown.
pub async fn run(mut config: Config) -> anyhow::Result<()> {
    ensure_crypto();

    // Persisted config.json fills in what flags and env left at defaults.
    match FileConfig::load(&config.config_dir()) {
        Ok(file) => config.overlay_file(&file),
        Err(e) => tracing::warn!(err = %e, "ignoring unreadable config.json"),
    }
    config.validate()?;

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let adapter = Arc::new(PlatformAdapter::host_default());
    let registry = Arc::new(ToolRegistry::new());
    registry::builtin::install(&registry, &adapter)?;

    let (ctx, notify_rx) = AgentCtx::new(config, adapter, registry, shutdown.clone())?;
    tracing::info!(
        machine_id = %ctx.machine_id,
        version = %ctx.version,
        server = %ctx.config.server_url,
        "outpost starting"
    );

    let dispatcher = Dispatcher::new(Arc::clone(&ctx));
    let update = UpdateEngine::spawn(Arc::clone(&ctx));

    if let Some(port) = ctx.config.facade_port {
        let facade_ctx = Arc::clone(&ctx);
        let facade_dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            if let Err(e) = facade::serve(facade_ctx, facade_dispatcher, port).await {
                tracing::error!(err = %e, "facade failed");
            }
        });
    }

    spawn_lock_watcher(Arc::clone(&ctx));

    let session = SessionLayer::new(Arc::clone(&ctx), dispatcher, update, notify_rx);
    session.run().await;

    tracing::info!("outpost stopped");
    Ok(())
}

/// Watch the screen-lock flag and notify the control plane on transitions.
/// No-op on hosts without a screen capability.
fn spawn_lock_watcher(ctx: Arc<AgentCtx>) {
    let Some(screen) = ctx.adapter.screen.clone() else {
        return;
    };
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(2));
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut was_locked = screen.is_locked();
        loop {
            tokio::select! {
                _ = ctx.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            let locked = screen.is_locked();
            if locked != was_locked {
                was_locked = locked;
                let frame = session::wire::Frame::Notification {
                    event: "screen-lock".to_owned(),
                    data: serde_json::json!({ "locked": locked }),
                };
                let _ = ctx.notify_tx.try_send(frame);
            }
        }
    });
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        }
    });
}
