// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::{Json, Router};
use sha2::{Digest, Sha256};

use super::UpdateEngine;
use crate::session::wire::Frame;
use crate::state::test_support::test_ctx;
use crate::state::AgentCtx;

struct Fixture {
    base: String,
    check_hits: Arc<AtomicUsize>,
    download_hits: Arc<AtomicUsize>,
    _server: tokio::task::JoinHandle<()>,
}

/// Serve a check endpoint returning `advertise` and the matching artifact.
async fn fixture(advertise: serde_json::Value, artifact: Vec<u8>) -> anyhow::Result<Fixture> {
    let check_hits = Arc::new(AtomicUsize::new(0));
    let download_hits = Arc::new(AtomicUsize::new(0));

    let check_counter = Arc::clone(&check_hits);
    let download_counter = Arc::clone(&download_hits);
    let router = Router::new()
        .route(
            "/api/updates/check",
            get(move || {
                let check_counter = Arc::clone(&check_counter);
                let advertise = advertise.clone();
                async move {
                    check_counter.fetch_add(1, Ordering::SeqCst);
                    Json(advertise)
                }
            }),
        )
        .route(
            "/artifact",
            get(move || {
                let download_counter = Arc::clone(&download_counter);
                let artifact = artifact.clone();
                async move {
                    download_counter.fetch_add(1, Ordering::SeqCst);
                    artifact
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(Fixture { base: format!("http://{addr}"), check_hits, download_hits, _server: server })
}

async fn wait_for_state(ctx: &Arc<AgentCtx>, label: &str) -> anyhow::Result<()> {
    for _ in 0..200 {
        if ctx.update_state.label() == label {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    anyhow::bail!("engine never reached {label}, stuck at {}", ctx.update_state.label())
}

fn descriptor(version: &str, sha256: &str) -> serde_json::Value {
    serde_json::json!({
        "updateAvailable": true,
        "version": version,
        "channel": "stable",
        "sha256": sha256,
        "filename": format!("outpost-{version}"),
        "downloadUrl": "/artifact",
        "isForced": false,
    })
}

#[tokio::test]
async fn no_update_reaches_up_to_date() -> anyhow::Result<()> {
    let fx = fixture(
        serde_json::json!({ "updateAvailable": false, "reason": "current" }),
        Vec::new(),
    )
    .await?;
    let (ctx, _notify, _dir) =
        test_ctx(&["--update-url", &fx.base, "--auto-install", "false"]);
    let handle = UpdateEngine::spawn(Arc::clone(&ctx));

    handle.flag(1);
    wait_for_state(&ctx, "UP_TO_DATE").await?;
    assert_eq!(fx.check_hits.load(Ordering::SeqCst), 1);
    assert_eq!(fx.download_hits.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn verified_download_stages_once() -> anyhow::Result<()> {
    let artifact = b"new-agent-binary".to_vec();
    let digest = format!("{:x}", Sha256::digest(&artifact));
    let fx = fixture(descriptor("2.9.9", &digest), artifact.clone()).await?;
    let (ctx, mut notify_rx, _dir) =
        test_ctx(&["--update-url", &fx.base, "--auto-install", "false"]);
    let handle = UpdateEngine::spawn(Arc::clone(&ctx));

    handle.flag(1);
    wait_for_state(&ctx, "DOWNLOADED").await?;

    let staged = ctx.config.staging_dir().join("outpost-2.9.9");
    assert_eq!(std::fs::read(&staged)?, artifact);

    let frame = tokio::time::timeout(Duration::from_secs(5), notify_rx.recv()).await?;
    match frame {
        Some(Frame::Notification { event, data }) => {
            assert_eq!(event, "update-downloaded");
            assert_eq!(data["version"], "2.9.9");
        }
        other => anyhow::bail!("expected update-downloaded, got {other:?}"),
    }

    // Idempotence: a second check re-uses the verified staged artifact.
    handle.flag(1);
    tokio::time::sleep(Duration::from_millis(300)).await;
    wait_for_state(&ctx, "DOWNLOADED").await?;
    assert_eq!(fx.download_hits.load(Ordering::SeqCst), 1, "no re-download once staged");
    Ok(())
}

#[tokio::test]
async fn digest_mismatch_fails_and_cools_down() -> anyhow::Result<()> {
    let fx = fixture(descriptor("2.9.9", "00ff00ff"), b"tampered".to_vec()).await?;
    let (ctx, mut notify_rx, _dir) =
        test_ctx(&["--update-url", &fx.base, "--auto-install", "false"]);
    let handle = UpdateEngine::spawn(Arc::clone(&ctx));

    handle.flag(1);
    wait_for_state(&ctx, "FAILED").await?;

    // Skip the update-downloaded-free stream to the failure notification.
    let frame = tokio::time::timeout(Duration::from_secs(5), notify_rx.recv()).await?;
    match frame {
        Some(Frame::Notification { event, data }) => {
            assert_eq!(event, "update-failed");
            assert!(data["reason"].as_str().unwrap_or_default().contains("download failed"));
        }
        other => anyhow::bail!("expected update-failed, got {other:?}"),
    }
    let checks_after_failure = fx.check_hits.load(Ordering::SeqCst);

    // Ordinary attempts are suppressed during the cool-down.
    handle.flag(1);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(fx.check_hits.load(Ordering::SeqCst), checks_after_failure);
    assert_eq!(ctx.update_state.label(), "FAILED");

    // A forced update is exempt from the cool-down.
    handle.flag(2);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(fx.check_hits.load(Ordering::SeqCst) > checks_after_failure);
    Ok(())
}

#[tokio::test]
async fn older_advertisement_is_treated_as_current() -> anyhow::Result<()> {
    let artifact = b"stale".to_vec();
    let digest = format!("{:x}", Sha256::digest(&artifact));
    let fx = fixture(descriptor("1.0.0", &digest), artifact).await?;
    let (ctx, _notify, _dir) =
        test_ctx(&["--update-url", &fx.base, "--auto-install", "false"]);
    let handle = UpdateEngine::spawn(Arc::clone(&ctx));

    handle.flag(1);
    wait_for_state(&ctx, "UP_TO_DATE").await?;
    assert_eq!(fx.download_hits.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn heartbeat_counter_triggers_the_check() -> anyhow::Result<()> {
    let fx = fixture(
        serde_json::json!({ "updateAvailable": false, "reason": "current" }),
        Vec::new(),
    )
    .await?;
    let (ctx, _notify, _dir) = test_ctx(&[
        "--update-url",
        &fx.base,
        "--auto-install",
        "false",
        "--update-check-heartbeats",
        "3",
    ]);
    let handle = UpdateEngine::spawn(Arc::clone(&ctx));

    handle.heartbeat_tick();
    handle.heartbeat_tick();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fx.check_hits.load(Ordering::SeqCst), 0, "below the threshold");

    handle.heartbeat_tick();
    wait_for_state(&ctx, "UP_TO_DATE").await?;
    assert_eq!(fx.check_hits.load(Ordering::SeqCst), 1);
    Ok(())
}
