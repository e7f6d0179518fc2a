// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Managed endpoint agent for the remote automation fleet.
#[derive(Debug, Clone, Parser)]
#[command(name = "outpost", version, about)]
pub struct Config {
    /// Control-plane WebSocket URL.
    #[arg(long, env = "OUTPOST_SERVER_URL", default_value = "wss://fleet.outpost.dev/ws")]
    pub server_url: String,

    /// Update service base URL. Defaults to the server URL host over HTTPS.
    #[arg(long, env = "OUTPOST_UPDATE_URL")]
    pub update_url: Option<String>,

    /// Human-readable agent name reported to the control plane.
    #[arg(long, env = "OUTPOST_AGENT_NAME")]
    pub agent_name: Option<String>,

    /// Update channel.
    #[arg(long, env = "OUTPOST_CHANNEL", default_value = "stable")]
    pub channel: String,

    /// Localhost HTTP facade port (disabled when unset).
    #[arg(long, env = "OUTPOST_FACADE_PORT")]
    pub facade_port: Option<u16>,

    /// Executor pool size for tool handlers.
    #[arg(long, env = "OUTPOST_POOL_SIZE", default_value = "8")]
    pub pool_size: usize,

    /// Bounded admission queue depth; overflow is rejected with `busy`.
    #[arg(long, env = "OUTPOST_ADMISSION_QUEUE", default_value = "64")]
    pub admission_queue: usize,

    /// Heartbeats between update checks.
    #[arg(long, env = "OUTPOST_UPDATE_HEARTBEATS", default_value = "60")]
    pub update_check_heartbeats: u32,

    /// Cool-down after a failed update attempt, in seconds.
    #[arg(long, env = "OUTPOST_UPDATE_COOLDOWN", default_value = "3600")]
    pub update_cooldown_secs: u64,

    /// Automatically download advertised updates.
    #[arg(
        long,
        env = "OUTPOST_AUTO_DOWNLOAD",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub auto_download: bool,

    /// Automatically install verified downloads.
    #[arg(
        long,
        env = "OUTPOST_AUTO_INSTALL",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub auto_install: bool,

    /// State directory override (machine id, staging, logs).
    #[arg(long, env = "OUTPOST_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Config directory override (config.json).
    #[arg(long, env = "OUTPOST_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Log format (json or text).
    #[arg(long, env = "OUTPOST_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "OUTPOST_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Also write rotating log files under the state directory.
    #[arg(
        long,
        env = "OUTPOST_LOG_TO_FILE",
        default_value_t = false,
        action = clap::ArgAction::Set
    )]
    pub log_to_file: bool,
}

impl Config {
    /// Validate the configuration after parsing and overlay.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.server_url.starts_with("ws://") && !self.server_url.starts_with("wss://") {
            anyhow::bail!("--server-url must be a ws:// or wss:// URL");
        }
        if let Some(url) = &self.update_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("--update-url must be an http(s) URL");
            }
        }
        if self.pool_size == 0 {
            anyhow::bail!("--pool-size must be at least 1");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        Ok(())
    }

    /// Resolve the update base URL, deriving it from the server URL when unset.
    pub fn effective_update_url(&self) -> String {
        if let Some(url) = &self.update_url {
            return url.trim_end_matches('/').to_owned();
        }
        let base = if let Some(rest) = self.server_url.strip_prefix("wss://") {
            format!("https://{rest}")
        } else {
            let rest = self.server_url.strip_prefix("ws://").unwrap_or(&self.server_url);
            format!("http://{rest}")
        };
        // Strip the websocket path component.
        match base.rfind("/ws") {
            Some(idx) => base[..idx].to_owned(),
            None => base.trim_end_matches('/').to_owned(),
        }
    }

    /// State directory: `--state-dir`, else the platform state dir.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(dir) = &self.state_dir {
            return dir.clone();
        }
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("outpost")
    }

    /// Config directory: `--config-dir`, else the platform config dir.
    pub fn config_dir(&self) -> PathBuf {
        if let Some(dir) = &self.config_dir {
            return dir.clone();
        }
        dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("outpost")
    }

    /// Update staging directory (ephemeral, outside the install path).
    pub fn staging_dir(&self) -> PathBuf {
        self.state_dir().join("staging")
    }

    pub fn update_cooldown(&self) -> Duration {
        Duration::from_secs(self.update_cooldown_secs)
    }

    /// Overlay persisted `config.json` values. CLI flags and env vars win;
    /// only fields still at their defaults are taken from the file.
    pub fn overlay_file(&mut self, file: &FileConfig) {
        if self.server_url == "wss://fleet.outpost.dev/ws" {
            if let Some(url) = &file.server_url {
                self.server_url = url.clone();
            }
        }
        if self.agent_name.is_none() {
            self.agent_name.clone_from(&file.agent_name);
        }
        if self.log_format == "text" {
            if let Some(fmt) = &file.log_format {
                self.log_format = fmt.clone();
            }
        }
        if self.log_level == "info" {
            if let Some(level) = &file.log_level {
                self.log_level = level.clone();
            }
        }
    }
}

/// Persisted configuration file (`<config>/config.json`). Credentials are
/// never stored here; they live in the OS credential store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileConfig {
    pub server_url: Option<String>,
    pub agent_name: Option<String>,
    pub log_format: Option<String>,
    pub log_level: Option<String>,
}

impl FileConfig {
    /// Load from `<dir>/config.json`; a missing file yields defaults.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let path = dir.join("config.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save to `<dir>/config.json` atomically (write tmp + rename).
    pub fn save(&self, dir: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("config.json");
        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
