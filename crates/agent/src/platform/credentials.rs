// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential capability backed by the OS credential store. The agent
//! secret and unlock material live here, never in config files.

use async_trait::async_trait;

use super::caps::CredentialOps;

/// Keyring service name all agent entries are filed under.
const SERVICE: &str = "outpost-agent";

/// OS credential store (Keychain, Credential Manager, Secret Service).
#[derive(Default)]
pub struct KeyringStore {
    service: Option<String>,
}

impl KeyringStore {
    /// Use a non-default service name (tests use a scratch service).
    pub fn with_service(service: impl Into<String>) -> Self {
        Self { service: Some(service.into()) }
    }

    fn entry(&self, key: &str) -> anyhow::Result<keyring::Entry> {
        let service = self.service.as_deref().unwrap_or(SERVICE);
        Ok(keyring::Entry::new(service, key)?)
    }
}

#[async_trait]
impl CredentialOps for KeyringStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let entry = self.entry(key)?;
        let result = tokio::task::spawn_blocking(move || entry.get_password()).await?;
        match result {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let entry = self.entry(key)?;
        let value = value.to_owned();
        tokio::task::spawn_blocking(move || entry.set_password(&value)).await??;
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let entry = self.entry(key)?;
        let result = tokio::task::spawn_blocking(move || entry.delete_credential()).await?;
        match result {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests and hosts without a usable keyring daemon.
#[derive(Default)]
pub struct MemoryStore {
    entries: parking_lot::Mutex<std::collections::HashMap<String, String>>,
}

#[async_trait]
impl CredentialOps for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;
