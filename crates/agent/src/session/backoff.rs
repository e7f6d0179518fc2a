// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnect backoff: exponential with full jitter. The agent never gives
//! up; a rejected agent secret switches to a long fixed backoff so the
//! registration endpoint is not hammered.

use std::time::Duration;

use rand::Rng;

/// Base delay for the first reconnect attempt.
pub const BASE: Duration = Duration::from_secs(1);

/// Ceiling for the exponential envelope.
pub const CAP: Duration = Duration::from_secs(60);

/// Minimum wait after an `INVALID_AGENT_SECRET` refusal.
pub const AUTH_REJECTED: Duration = Duration::from_secs(300);

/// Exponential backoff with full jitter.
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BASE, CAP)
    }
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap, attempt: 0 }
    }

    /// Envelope for the next attempt: `min(cap, base * 2^attempt)`.
    fn envelope(&self) -> Duration {
        let exp = self.base.saturating_mul(1u32 << self.attempt.min(30));
        exp.min(self.cap)
    }

    /// Next delay: uniformly random in `[0, envelope]`, then advance.
    pub fn next_delay(&mut self) -> Duration {
        let ceiling = self.envelope();
        self.attempt = self.attempt.saturating_add(1);
        let millis = ceiling.as_millis() as u64;
        if millis == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=millis))
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
