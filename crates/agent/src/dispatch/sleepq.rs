// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FIFO queue for requests arriving while the power state is SLEEP. Each
//! parked entry carries an independent ceiling; exceeding it fails the
//! request with `queued_timeout`. On wake the queue drains in arrival
//! order before newly arrived requests are admitted.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{DispatchError, ErrorCode};
use crate::session::pending::ResponseSink;

/// Maximum time a request may sit parked before failing.
pub const QUEUE_CEILING: Duration = Duration::from_secs(300);

/// A request parked while the host sleeps.
pub struct Parked {
    pub method: String,
    pub params: Value,
    pub sink: ResponseSink,
    pub enqueued_at: Instant,
    ceiling_guard: CancellationToken,
}

impl Parked {
    /// Stop the ceiling timer; called when the entry is taken for
    /// execution or swept at shutdown.
    pub fn disarm(&self) {
        self.ceiling_guard.cancel();
    }
}

/// The per-agent sleep queue.
pub struct SleepQueue {
    entries: parking_lot::Mutex<VecDeque<Parked>>,
    capacity: usize,
    ceiling: Duration,
}

impl SleepQueue {
    pub fn new(capacity: usize) -> Self {
        Self::with_ceiling(capacity, QUEUE_CEILING)
    }

    pub fn with_ceiling(capacity: usize, ceiling: Duration) -> Self {
        Self { entries: parking_lot::Mutex::new(VecDeque::new()), capacity, ceiling }
    }

    /// Park a request. The sink fails with `busy` when the queue is full,
    /// `queued_timeout` when the ceiling passes before wake.
    pub fn park(&self, method: String, params: Value, sink: ResponseSink) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            drop(entries);
            sink.resolve(Err(DispatchError::new(ErrorCode::Busy, "sleep queue full")));
            return;
        }

        let ceiling_guard = CancellationToken::new();
        let timer_guard = ceiling_guard.clone();
        let timer_sink = sink.clone();
        let ceiling = self.ceiling;
        tokio::spawn(async move {
            tokio::select! {
                _ = timer_guard.cancelled() => {}
                _ = tokio::time::sleep(ceiling) => {
                    timer_sink.resolve(Err(DispatchError::new(
                        ErrorCode::QueuedTimeout,
                        "request expired while host was asleep",
                    )));
                }
            }
        });

        entries.push_back(Parked {
            method,
            params,
            sink,
            enqueued_at: Instant::now(),
            ceiling_guard,
        });
    }

    /// Remove every parked entry, in arrival order. Ceiling timers stay
    /// armed until the caller disarms each entry it executes.
    pub fn drain(&self) -> Vec<Parked> {
        let mut entries = self.entries.lock();
        entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
#[path = "sleepq_tests.rs"]
mod tests;
