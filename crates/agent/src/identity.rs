// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent identity: stable per-install machine id and hardware fingerprint.

use std::path::Path;

use sha2::{Digest, Sha256};

/// Load the machine id, creating and persisting one on first run.
/// The id is written with tmp + rename so a crash never leaves a torn file.
pub fn load_or_create_machine_id(state_dir: &Path) -> anyhow::Result<String> {
    let path = state_dir.join("machine_id");
    if path.exists() {
        let id = std::fs::read_to_string(&path)?.trim().to_owned();
        if !id.is_empty() {
            return Ok(id);
        }
    }

    std::fs::create_dir_all(state_dir)?;
    let id = uuid::Uuid::new_v4().to_string();
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, &id)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(id)
}

/// Raw hardware facts that feed the fingerprint. Absent facts stay `None`
/// and are omitted from the composition rather than substituted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HardwareFacts {
    pub cpu_model: Option<String>,
    pub disk_serial: Option<String>,
    pub motherboard_uuid: Option<String>,
    /// Sorted, deduplicated MAC addresses.
    pub mac_addresses: Vec<String>,
}

impl HardwareFacts {
    /// Probe the local host.
    pub fn probe() -> Self {
        let mut sys = sysinfo::System::new();
        sys.refresh_cpu_all();
        let cpu_model = sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_owned())
            .filter(|brand| !brand.is_empty());

        let networks = sysinfo::Networks::new_with_refreshed_list();
        let mut mac_addresses: Vec<String> = networks
            .iter()
            .map(|(_, data)| data.mac_address())
            .filter(|mac| !mac.is_unspecified())
            .map(|mac| mac.to_string())
            .collect();
        mac_addresses.sort();
        mac_addresses.dedup();

        Self {
            cpu_model,
            disk_serial: read_dmi("board_serial"),
            motherboard_uuid: read_dmi("product_uuid"),
            mac_addresses,
        }
    }

    /// Compose the canonical fingerprint input: present fields joined by `|`.
    pub fn compose(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(cpu) = &self.cpu_model {
            parts.push(cpu);
        }
        if let Some(serial) = &self.disk_serial {
            parts.push(serial);
        }
        if let Some(uuid) = &self.motherboard_uuid {
            parts.push(uuid);
        }
        let macs = self.mac_addresses.join("|");
        if !macs.is_empty() {
            parts.push(&macs);
        }
        parts.join("|")
    }

    /// Hex SHA-256 of the composed fingerprint input.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.compose().as_bytes());
        format!("{digest:x}")
    }
}

/// Read a DMI attribute on Linux; absent elsewhere or when unreadable.
fn read_dmi(name: &str) -> Option<String> {
    if !cfg!(target_os = "linux") {
        return None;
    }
    let value = std::fs::read_to_string(format!("/sys/class/dmi/id/{name}")).ok()?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    Some(value.to_owned())
}

/// Platform string reported to the control plane and update service.
pub fn platform() -> &'static str {
    std::env::consts::OS
}

/// Architecture string reported to the control plane and update service.
pub fn arch() -> &'static str {
    std::env::consts::ARCH
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
