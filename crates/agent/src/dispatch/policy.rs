// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command filter for shell-like tools. Denies a configured set of
//! destructive forms; every denial carries a machine-readable reason tag
//! and is logged before `policy_blocked` goes back over the wire.

use regex::Regex;

use crate::error::{DispatchError, ErrorCode};

/// A single deny rule.
struct Rule {
    reason: &'static str,
    pattern: Regex,
}

/// The compiled deny list.
pub struct CommandPolicy {
    rules: Vec<Rule>,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        // Patterns are anchored on word boundaries, not full commands, so
        // compound lines (`a && b`) are caught by any destructive segment.
        let specs: &[(&str, &str)] = &[
            ("rooted_deletion", r"(?i)\brm\s+(?:-{1,2}[\w-]+\s+)*/\s*(?:$|[;&|])"),
            ("rooted_deletion", r"(?i)\brm\b.*--no-preserve-root"),
            ("device_overwrite", r"(?i)\bdd\b[^|;&]*\bof=/dev/(?:sd|hd|nvme|vd|disk)"),
            ("device_overwrite", r"(?i)\bshred\b[^|;&]*\s/dev/"),
            ("filesystem_format", r"(?i)\bmkfs(?:\.\w+)?\b"),
            ("fork_bomb", r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;"),
            ("pipe_to_shell", r"(?i)\b(?:curl|wget)\b[^|;&]*\|\s*(?:sudo\s+)?(?:ba|z|da)?sh\b"),
            ("exfiltration_pipe", r"(?i)\b(?:cat|tar|dd|gzip)\b[^|;&]*\|\s*(?:curl|wget|nc|ncat)\b"),
            ("recursive_chown_root", r"(?i)\bch(?:own|mod)\s+(?:-{1,2}[\w-]+\s+)*[\w:.+-]+\s+/\s*(?:$|[;&|])"),
        ];
        let rules = specs
            .iter()
            .filter_map(|(reason, pattern)| {
                Regex::new(pattern).ok().map(|pattern| Rule { reason, pattern })
            })
            .collect();
        Self { rules }
    }
}

impl CommandPolicy {
    /// Check a command line. `Err` carries the reason tag of the first
    /// matching deny rule.
    pub fn check(&self, command: &str) -> Result<(), DispatchError> {
        for rule in &self.rules {
            if rule.pattern.is_match(command) {
                tracing::warn!(reason = rule.reason, command, "command blocked by policy");
                return Err(DispatchError::new(ErrorCode::PolicyBlocked, rule.reason));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
