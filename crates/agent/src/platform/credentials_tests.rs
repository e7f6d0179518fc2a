// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::super::caps::CredentialOps;
use super::MemoryStore;

#[tokio::test]
async fn memory_store_roundtrip() -> anyhow::Result<()> {
    let store = MemoryStore::default();
    assert_eq!(store.get("agent-secret").await?, None);

    store.set("agent-secret", "sek-1").await?;
    assert_eq!(store.get("agent-secret").await?.as_deref(), Some("sek-1"));

    store.set("agent-secret", "sek-2").await?;
    assert_eq!(store.get("agent-secret").await?.as_deref(), Some("sek-2"));

    store.delete("agent-secret").await?;
    assert_eq!(store.get("agent-secret").await?, None);
    Ok(())
}

#[tokio::test]
async fn delete_is_idempotent() -> anyhow::Result<()> {
    let store = MemoryStore::default();
    store.delete("never-set").await?;
    store.delete("never-set").await?;
    Ok(())
}
