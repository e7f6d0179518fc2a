// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-transfer capability backed by `tokio::fs`. Reads are size-capped;
//! writes land via tmp + rename so a crash never leaves a torn file.

use std::path::PathBuf;

use async_trait::async_trait;

use super::caps::{FsEntry, FsOps};

/// Maximum bytes a single `fs_read` returns.
const MAX_READ_BYTES: u64 = 8 * 1024 * 1024;

/// Local filesystem backend, optionally confined to a root directory.
#[derive(Default)]
pub struct LocalFs {
    root: Option<PathBuf>,
}

impl LocalFs {
    /// Confine all operations beneath `root`.
    pub fn rooted(root: PathBuf) -> Self {
        Self { root: Some(root) }
    }

    fn resolve(&self, path: &str) -> anyhow::Result<PathBuf> {
        let requested = PathBuf::from(path);
        let Some(root) = &self.root else {
            return Ok(requested);
        };
        // Reject traversal rather than canonicalizing (target may not exist).
        if requested.is_absolute()
            || requested.components().any(|c| matches!(c, std::path::Component::ParentDir))
        {
            anyhow::bail!("path escapes the transfer root: {path}");
        }
        Ok(root.join(requested))
    }
}

#[async_trait]
impl FsOps for LocalFs {
    async fn read(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.resolve(path)?;
        let meta = tokio::fs::metadata(&path).await?;
        if meta.len() > MAX_READ_BYTES {
            anyhow::bail!("file exceeds the {MAX_READ_BYTES}-byte read cap");
        }
        Ok(tokio::fs::read(&path).await?)
    }

    async fn write(&self, path: &str, contents: &[u8]) -> anyhow::Result<()> {
        let path = self.resolve(path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = path.with_extension("outpost-tmp");
        tokio::fs::write(&tmp_path, contents).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn list(&self, path: &str) -> anyhow::Result<Vec<FsEntry>> {
        let path = self.resolve(path)?;
        let mut dir = tokio::fs::read_dir(&path).await?;
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let meta = entry.metadata().await?;
            entries.push(FsEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: meta.is_dir(),
                size: meta.len(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[cfg(test)]
#[path = "fsops_tests.rs"]
mod tests;
