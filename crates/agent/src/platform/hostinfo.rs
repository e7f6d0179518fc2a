// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host/net capability backed by `sysinfo`.

use async_trait::async_trait;

use super::caps::{HostInfo, HostOps};

pub struct SysinfoHost;

#[async_trait]
impl HostOps for SysinfoHost {
    async fn info(&self) -> anyhow::Result<HostInfo> {
        // sysinfo probing is blocking; keep it off the executor threads.
        let info = tokio::task::spawn_blocking(|| {
            let networks = sysinfo::Networks::new_with_refreshed_list();
            let mut mac_addresses: Vec<String> = networks
                .iter()
                .map(|(_, data)| data.mac_address())
                .filter(|mac| !mac.is_unspecified())
                .map(|mac| mac.to_string())
                .collect();
            mac_addresses.sort();
            mac_addresses.dedup();

            HostInfo {
                hostname: sysinfo::System::host_name(),
                os_version: sysinfo::System::long_os_version(),
                mac_addresses,
                uptime_secs: sysinfo::System::uptime(),
            }
        })
        .await?;
        Ok(info)
    }
}
