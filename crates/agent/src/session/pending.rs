// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pending-request table: request id → one-shot response sink. An id
//! leaves the table exactly once — on response, error, cancellation,
//! timeout, or disconnect-induced synthetic failure — and the sink fires
//! exactly once on whichever transition happens first.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{DispatchError, ErrorCode};

/// Who a request came from. Scopes disconnect sweeps: a control-plane
/// disconnect must not fail facade-originated requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    ControlPlane,
    Facade,
}

/// The single outcome of a request.
pub type Outcome = Result<Value, DispatchError>;

struct Entry {
    tx: oneshot::Sender<Outcome>,
    origin: Origin,
    #[allow(dead_code)]
    deadline: Instant,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Ids ever admitted in the current session; enforces no-reuse.
    seen: HashSet<String>,
}

/// Shared pending-request table. The session owns it; the dispatcher
/// resolves entries through [`ResponseSink`] handles and never touches
/// the socket.
#[derive(Default)]
pub struct PendingTable {
    inner: parking_lot::Mutex<Inner>,
}

impl PendingTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Admit a request id. Returns the sink the dispatcher resolves and
    /// the receiver the session awaits. Rejects ids already used this
    /// session.
    pub fn insert(
        self: &Arc<Self>,
        id: &str,
        origin: Origin,
        deadline: Instant,
    ) -> Result<(ResponseSink, oneshot::Receiver<Outcome>), DispatchError> {
        let mut inner = self.inner.lock();
        if !inner.seen.insert(id.to_owned()) {
            return Err(DispatchError::new(
                ErrorCode::InvalidArguments,
                format!("request id already used: {id}"),
            ));
        }
        let (tx, rx) = oneshot::channel();
        inner.entries.insert(id.to_owned(), Entry { tx, origin, deadline });
        let sink = ResponseSink { table: Arc::clone(self), id: id.to_owned() };
        Ok((sink, rx))
    }

    /// Resolve an entry. Returns false when the id already left the table.
    pub fn resolve(&self, id: &str, outcome: Outcome) -> bool {
        let entry = self.inner.lock().entries.remove(id);
        match entry {
            Some(entry) => {
                // Receiver may be gone (session torn down); either way the
                // id has now left the table exactly once.
                let _ = entry.tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Fail every entry of one origin with a synthetic error. Used on
    /// disconnect so dispatcher waiters are unblocked.
    pub fn fail_origin(&self, origin: Origin, code: ErrorCode, message: &str) -> usize {
        let drained: Vec<Entry> = {
            let mut inner = self.inner.lock();
            let ids: Vec<String> = inner
                .entries
                .iter()
                .filter(|(_, e)| e.origin == origin)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| inner.entries.remove(id)).collect()
        };
        let count = drained.len();
        for entry in drained {
            let _ = entry.tx.send(Err(DispatchError::new(code, message)));
        }
        count
    }

    /// Reset the id-reuse set for a fresh session. In-flight entries are
    /// untouched; the caller fails them first via `fail_origin`.
    pub fn begin_session(&self) {
        self.inner.lock().seen.clear();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

/// Completion handle for a single pending request. Clones share the same
/// table entry; whichever resolution lands first wins, the rest no-op.
#[derive(Clone)]
pub struct ResponseSink {
    table: Arc<PendingTable>,
    id: String,
}

impl ResponseSink {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the request is still awaiting its single outcome.
    pub fn is_pending(&self) -> bool {
        self.table.contains(&self.id)
    }

    /// Resolve the request. A second resolution for the same id is a
    /// no-op, which keeps the exactly-once invariant under races between
    /// completion, timeout, and disconnect.
    pub fn resolve(&self, outcome: Outcome) -> bool {
        self.table.resolve(&self.id, outcome)
    }
}

#[cfg(test)]
#[path = "pending_tests.rs"]
mod tests;
