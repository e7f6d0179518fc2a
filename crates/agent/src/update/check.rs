// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Update check against `GET /api/updates/check`.

use serde::Deserialize;

/// Server-advertised update descriptor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDescriptor {
    pub version: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    pub sha256: String,
    #[serde(default)]
    pub filename: Option<String>,
    pub download_url: String,
    #[serde(default)]
    pub release_notes: Option<String>,
    #[serde(default)]
    pub is_forced: bool,
}

impl UpdateDescriptor {
    /// Staged artifact file name.
    pub fn artifact_name(&self) -> String {
        self.filename.clone().unwrap_or_else(|| format!("outpost-{}", self.version))
    }
}

/// Outcome of a check request.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    UpToDate { reason: Option<String> },
    Available(UpdateDescriptor),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCheck {
    update_available: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Parameters identifying this install to the update service.
#[derive(Debug, Clone)]
pub struct CheckParams {
    pub platform: String,
    pub arch: String,
    pub current_version: String,
    pub channel: String,
    pub machine_id: String,
}

/// Query the update service.
pub async fn check(
    client: &reqwest::Client,
    base_url: &str,
    params: &CheckParams,
) -> anyhow::Result<CheckOutcome> {
    let response = client
        .get(format!("{base_url}/api/updates/check"))
        .query(&[
            ("platform", params.platform.as_str()),
            ("arch", params.arch.as_str()),
            ("currentVersion", params.current_version.as_str()),
            ("channel", params.channel.as_str()),
            ("machineId", params.machine_id.as_str()),
        ])
        .send()
        .await?
        .error_for_status()?;

    let body: serde_json::Value = response.json().await?;
    let raw: RawCheck = serde_json::from_value(body.clone())?;
    if !raw.update_available {
        return Ok(CheckOutcome::UpToDate { reason: raw.reason });
    }
    let descriptor: UpdateDescriptor = serde_json::from_value(body)?;
    Ok(CheckOutcome::Available(descriptor))
}

/// Whether the advertised version is strictly newer. Non-semver strings
/// fall back to inequality so a malformed advertisement cannot loop the
/// installer.
pub fn is_newer(current: &str, advertised: &str) -> bool {
    match (semver::Version::parse(current), semver::Version::parse(advertised)) {
        (Ok(current), Ok(advertised)) => advertised > current,
        _ => false,
    }
}

#[cfg(test)]
#[path = "check_tests.rs"]
mod tests;
