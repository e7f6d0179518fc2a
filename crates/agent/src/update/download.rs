// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Streamed artifact download with incremental SHA-256 verification.
//! `Content-Length` is advisory; the advertised digest is authoritative.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Observable download progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub downloaded: u64,
    pub total: Option<u64>,
}

/// Hex SHA-256 of a file on disk.
pub async fn file_sha256(path: &Path) -> anyhow::Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok(format!("{:x}", hasher.finalize()))
    })
    .await?
}

/// Whether a previously staged artifact already matches the digest.
pub async fn staged_matches(path: &Path, expected_sha256: &str) -> bool {
    if !path.exists() {
        return false;
    }
    match file_sha256(path).await {
        Ok(digest) => digest.eq_ignore_ascii_case(expected_sha256),
        Err(_) => false,
    }
}

/// Stream `url` into `dest`, hashing as bytes arrive. On completion the
/// on-disk digest must equal `expected_sha256` byte-for-byte (hex,
/// case-insensitive); a mismatch removes the file and fails. Cancellation
/// is honoured between chunks and also removes the partial file.
pub async fn download(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    expected_sha256: &str,
    cancel: &CancellationToken,
    progress: &watch::Sender<Progress>,
) -> anyhow::Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut response = client.get(url).send().await?.error_for_status()?;
    let total = response.content_length();
    let _ = progress.send(Progress { downloaded: 0, total });

    let tmp = dest.with_extension("partial");
    let mut file = tokio::fs::File::create(&tmp).await?;
    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;

    loop {
        let chunk = tokio::select! {
            chunk = response.chunk() => chunk?,
            _ = cancel.cancelled() => {
                drop(file);
                let _ = tokio::fs::remove_file(&tmp).await;
                anyhow::bail!("download cancelled");
            }
        };
        let Some(chunk) = chunk else {
            break;
        };
        hasher.update(&chunk);
        downloaded += chunk.len() as u64;
        file.write_all(&chunk).await?;
        let _ = progress.send(Progress { downloaded, total });
    }
    file.flush().await?;
    drop(file);

    let digest = format!("{:x}", hasher.finalize());
    if !digest.eq_ignore_ascii_case(expected_sha256) {
        let _ = tokio::fs::remove_file(&tmp).await;
        anyhow::bail!("sha256 mismatch: expected {expected_sha256}, got {digest}");
    }

    tokio::fs::rename(&tmp, dest).await?;
    Ok(())
}

#[cfg(test)]
#[path = "download_tests.rs"]
mod tests;
