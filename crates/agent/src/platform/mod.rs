// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability-keyed registry of host primitives. Each capability is either
//! present with a concrete backend or absent; the dispatcher consults
//! presence before admitting a request.

pub mod caps;
pub mod credentials;
pub mod fsops;
pub mod hostinfo;
pub mod shell;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use caps::{
    ClipboardOps, CredentialOps, FsOps, HostOps, InputOps, PowerOps, ScreenOps, ShellOps,
    WindowOps,
};

/// Platform capability names, as declared by tools and enumerated by
/// `capabilities/list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "screen.capture")]
    ScreenCapture,
    #[serde(rename = "input.inject")]
    InputInject,
    #[serde(rename = "clipboard")]
    Clipboard,
    #[serde(rename = "fs")]
    Fs,
    #[serde(rename = "shell")]
    Shell,
    #[serde(rename = "window")]
    Window,
    #[serde(rename = "power")]
    Power,
    #[serde(rename = "credentials")]
    Credentials,
    #[serde(rename = "net")]
    Net,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScreenCapture => "screen.capture",
            Self::InputInject => "input.inject",
            Self::Clipboard => "clipboard",
            Self::Fs => "fs",
            Self::Shell => "shell",
            Self::Window => "window",
            Self::Power => "power",
            Self::Credentials => "credentials",
            Self::Net => "net",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry of capability backends. Built once at startup; absent slots
/// stay `None` (a headless Linux host has no `screen.capture`).
#[derive(Default)]
pub struct PlatformAdapter {
    pub screen: Option<Arc<dyn ScreenOps>>,
    pub input: Option<Arc<dyn InputOps>>,
    pub clipboard: Option<Arc<dyn ClipboardOps>>,
    pub fs: Option<Arc<dyn FsOps>>,
    pub shell: Option<Arc<dyn ShellOps>>,
    pub window: Option<Arc<dyn WindowOps>>,
    pub power: Option<Arc<dyn PowerOps>>,
    pub credentials: Option<Arc<dyn CredentialOps>>,
    pub host: Option<Arc<dyn HostOps>>,
}

impl PlatformAdapter {
    /// Wire the process-level backends that exist on every platform.
    /// GUI-family capabilities are registered by platform-specific init
    /// when an interactive session is available.
    pub fn host_default() -> Self {
        Self {
            screen: None,
            input: None,
            clipboard: None,
            fs: Some(Arc::new(fsops::LocalFs::default())),
            shell: Some(Arc::new(shell::LocalShell::default())),
            window: None,
            power: None,
            credentials: Some(Arc::new(credentials::KeyringStore::default())),
            host: Some(Arc::new(hostinfo::SysinfoHost)),
        }
    }

    pub fn has(&self, cap: Capability) -> bool {
        match cap {
            Capability::ScreenCapture => self.screen.is_some(),
            Capability::InputInject => self.input.is_some(),
            Capability::Clipboard => self.clipboard.is_some(),
            Capability::Fs => self.fs.is_some(),
            Capability::Shell => self.shell.is_some(),
            Capability::Window => self.window.is_some(),
            Capability::Power => self.power.is_some(),
            Capability::Credentials => self.credentials.is_some(),
            Capability::Net => self.host.is_some(),
        }
    }

    /// All present capabilities, in declaration order.
    pub fn available(&self) -> Vec<Capability> {
        ALL_CAPABILITIES.iter().copied().filter(|cap| self.has(*cap)).collect()
    }

    /// Capabilities from `required` that are absent.
    pub fn missing(&self, required: &[Capability]) -> Vec<Capability> {
        required.iter().copied().filter(|cap| !self.has(*cap)).collect()
    }
}

pub const ALL_CAPABILITIES: &[Capability] = &[
    Capability::ScreenCapture,
    Capability::InputInject,
    Capability::Clipboard,
    Capability::Fs,
    Capability::Shell,
    Capability::Window,
    Capability::Power,
    Capability::Credentials,
    Capability::Net,
];

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
