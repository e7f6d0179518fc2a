// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command dispatcher: translates inbound requests into tool invocations,
//! enforces the pre-condition gate, bounds concurrency, imposes deadlines,
//! and resolves exactly one outcome per request through its pending sink.

pub mod policy;
pub mod reserved;
pub mod sleepq;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::{DispatchError, ErrorCode};
use crate::license;
use crate::power::PowerState;
use crate::registry::{Tool, ToolCtx};
use crate::session::pending::ResponseSink;
use crate::session::wire::Frame;
use crate::state::AgentCtx;
use policy::CommandPolicy;
use sleepq::SleepQueue;

/// Hard ceiling on any request deadline.
pub const HARD_DEADLINE_CAP: Duration = Duration::from_secs(120);

/// How long a cancelled handler gets to unwind before its task is aborted.
const CANCEL_GRACE: Duration = Duration::from_secs(1);

struct ActiveRequest {
    method: String,
    cancel: CancellationToken,
}

pub struct Dispatcher {
    ctx: Arc<AgentCtx>,
    policy: CommandPolicy,
    /// Bounded executor pool.
    pool: Arc<Semaphore>,
    /// Admission permits = pool + queue depth; `try_acquire` failure is `busy`.
    admission: Arc<Semaphore>,
    /// Single lock for `serialized-globally` tools.
    global_lock: Arc<Semaphore>,
    /// Per-tool exclusion semaphores, created on first use.
    exclusive: parking_lot::Mutex<HashMap<String, Arc<Semaphore>>>,
    sleep_queue: SleepQueue,
    draining: AtomicBool,
    active: parking_lot::Mutex<HashMap<String, ActiveRequest>>,
}

impl Dispatcher {
    /// Build the dispatcher and spawn its sleep-queue drain worker.
    pub fn new(ctx: Arc<AgentCtx>) -> Arc<Self> {
        let pool_size = ctx.config.pool_size;
        let queue_depth = ctx.config.admission_queue;
        let dispatcher = Arc::new(Self {
            ctx,
            policy: CommandPolicy::default(),
            pool: Arc::new(Semaphore::new(pool_size)),
            admission: Arc::new(Semaphore::new(pool_size + queue_depth)),
            global_lock: Arc::new(Semaphore::new(1)),
            exclusive: parking_lot::Mutex::new(HashMap::new()),
            sleep_queue: SleepQueue::new(queue_depth),
            draining: AtomicBool::new(false),
            active: parking_lot::Mutex::new(HashMap::new()),
        });
        dispatcher.spawn_drain_worker();
        dispatcher
    }

    /// Submit a request. Returns immediately; the outcome lands on `sink`.
    pub fn submit(self: &Arc<Self>, method: String, params: Value, sink: ResponseSink) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run(method, params, sink, true).await;
        });
    }

    /// Number of requests parked for wake.
    pub fn queued(&self) -> usize {
        self.sleep_queue.len()
    }

    /// Number of handlers currently executing.
    pub fn active(&self) -> usize {
        self.active.lock().len()
    }

    /// A currently executing tool name, for the heartbeat's task field.
    pub fn current_task(&self) -> Option<String> {
        self.active.lock().values().next().map(|req| req.method.clone())
    }

    // -- gate ------------------------------------------------------------------

    async fn run(self: &Arc<Self>, method: String, params: Value, sink: ResponseSink, gate_power: bool) {
        // 1. License gate.
        let snap = self.ctx.license.snapshot();
        if !snap.admits(&method) {
            sink.resolve(Err(DispatchError::bare(snap.refusal())));
            return;
        }

        // Reserved control methods run inline: cheap, never pooled, and
        // still served in degraded mode.
        if reserved::is_reserved(&method) {
            let outcome = reserved::handle(self, &method, &params).await;
            sink.resolve(outcome);
            return;
        }

        // Tool resolution: `tools/call` envelope or a bare tool name.
        let via_envelope = method == "tools/call";
        let (name, arguments) = match resolve_call(&method, &params) {
            Ok(resolved) => resolved,
            Err(e) => {
                sink.resolve(Err(e));
                return;
            }
        };
        let Some(tool) = self.ctx.registry.get(&name) else {
            let code = if via_envelope { ErrorCode::UnknownTool } else { ErrorCode::UnknownMethod };
            sink.resolve(Err(DispatchError::new(code, name)));
            return;
        };

        // 2. Capability gate.
        let missing = self.ctx.adapter.missing(&tool.spec.capabilities);
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|cap| cap.as_str()).collect();
            sink.resolve(Err(DispatchError::new(
                ErrorCode::CapabilityUnavailable,
                names.join(","),
            )));
            return;
        }

        // 3. Power gate: park while asleep (or while the wake backlog is
        // still draining, to preserve arrival order) and ask for a wake.
        if gate_power {
            let asleep = self.ctx.power.snapshot().state == PowerState::Sleep;
            if asleep || self.draining.load(Ordering::Acquire) || !self.sleep_queue.is_empty() {
                self.sleep_queue.park(method, params, sink);
                self.request_wake();
                // The drain we observed may have finished before the park
                // landed, and no power transition will follow to restart
                // it. Kick one off; it no-ops if a drain is running.
                if self.ctx.power.snapshot().state != PowerState::Sleep {
                    let this = Arc::clone(self);
                    tokio::spawn(async move { this.drain_queue().await });
                }
                return;
            }
        }

        // 4. Schema validation, then policy, admission, execution.
        self.execute(tool, name, method, arguments, params, sink).await;
    }

    async fn execute(
        self: &Arc<Self>,
        tool: Arc<Tool>,
        name: String,
        admitted_method: String,
        arguments: Value,
        params: Value,
        sink: ResponseSink,
    ) {
        if let Err(e) = tool.validate(&arguments) {
            sink.resolve(Err(e));
            return;
        }

        if tool.spec.tags.shell_like {
            if let Some(command) = arguments.get("command").and_then(Value::as_str) {
                if let Err(e) = self.policy.check(command) {
                    sink.resolve(Err(e));
                    return;
                }
            }
        }

        // Admission: a full queue rejects instead of waiting.
        let Ok(admission_permit) = Arc::clone(&self.admission).try_acquire_owned() else {
            sink.resolve(Err(DispatchError::new(ErrorCode::Busy, "admission queue full")));
            return;
        };

        let deadline = effective_deadline(&params, &arguments, tool.spec.default_timeout);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _admission = admission_permit;

            // Pool permit: waits when all executors are busy.
            let Ok(_pool) = Arc::clone(&this.pool).acquire_owned().await else {
                sink.resolve(Err(DispatchError::internal("executor pool closed")));
                return;
            };

            // Exclusion permits, acquired before the handler runs and
            // released on return, cancellation, or panic.
            let _exclusive = if tool.spec.tags.exclusive {
                match this.exclusive_semaphore(&name).acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        sink.resolve(Err(DispatchError::internal("exclusion lock closed")));
                        return;
                    }
                }
            } else {
                None
            };
            let _global = if tool.spec.tags.serialized_globally {
                match Arc::clone(&this.global_lock).acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        sink.resolve(Err(DispatchError::internal("global lock closed")));
                        return;
                    }
                }
            } else {
                None
            };

            this.run_handler(tool, name, admitted_method, arguments, deadline, sink).await;
        });
    }

    async fn run_handler(
        self: Arc<Self>,
        tool: Arc<Tool>,
        name: String,
        admitted_method: String,
        arguments: Value,
        deadline: Duration,
        sink: ResponseSink,
    ) {
        let snap = self.ctx.license.snapshot();
        let cancel = self.ctx.shutdown.child_token();
        let tool_ctx = ToolCtx {
            adapter: Arc::clone(&self.ctx.adapter),
            permissions: snap.permissions,
            default_browser: snap.default_browser,
            cancel: cancel.clone(),
        };

        self.active.lock().insert(
            sink.id().to_owned(),
            ActiveRequest { method: name.clone(), cancel: cancel.clone() },
        );

        // The handler gets its own task so a panic is confined to it.
        let mut handler = tokio::spawn(async move { tool.invoke(tool_ctx, arguments).await });

        let license_rx = self.ctx.license.subscribe();
        let outcome = tokio::select! {
            joined = &mut handler => match joined {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => {
                    tracing::error!(tool = %name, "handler panicked");
                    Err(DispatchError::new(ErrorCode::Internal, "handler fault"))
                }
                Err(_) => Err(DispatchError::bare(ErrorCode::Cancelled)),
            },
            _ = tokio::time::sleep(deadline) => {
                cancel.cancel();
                reap(handler).await;
                Err(DispatchError::bare(ErrorCode::Timeout))
            }
            _ = license::revoked(license_rx, admitted_method) => {
                cancel.cancel();
                reap(handler).await;
                Err(DispatchError::new(ErrorCode::Cancelled, "license revoked"))
            }
            _ = cancel.cancelled() => {
                reap(handler).await;
                Err(DispatchError::bare(ErrorCode::Cancelled))
            }
        };

        self.active.lock().remove(sink.id());
        sink.resolve(outcome);
    }

    fn exclusive_semaphore(&self, name: &str) -> Arc<Semaphore> {
        let mut map = self.exclusive.lock();
        Arc::clone(map.entry(name.to_owned()).or_insert_with(|| Arc::new(Semaphore::new(1))))
    }

    // -- wake / drain ----------------------------------------------------------

    /// Signal the session that queued work wants the host awake.
    fn request_wake(&self) {
        let frame = Frame::Notification {
            event: "wake-requested".to_owned(),
            data: serde_json::json!({ "queuedRequests": self.sleep_queue.len() }),
        };
        if self.ctx.notify_tx.try_send(frame).is_err() {
            tracing::debug!("wake-requested notification dropped");
        }
    }

    fn spawn_drain_worker(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut power_rx = this.ctx.power.subscribe();
            loop {
                tokio::select! {
                    _ = this.ctx.shutdown.cancelled() => break,
                    changed = power_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                let awake = power_rx.borrow_and_update().state != PowerState::Sleep;
                if awake {
                    this.drain_queue().await;
                }
            }
        });
    }

    /// Dispatch every parked request in arrival order before newly
    /// arrived requests are admitted (they park behind the backlog while
    /// `draining` is set).
    async fn drain_queue(self: &Arc<Self>) {
        if self.draining.swap(true, Ordering::AcqRel) {
            return;
        }
        loop {
            loop {
                let batch = self.sleep_queue.drain();
                if batch.is_empty() {
                    break;
                }
                for parked in batch {
                    parked.disarm();
                    if !parked.sink.is_pending() {
                        continue; // already failed with queued_timeout
                    }
                    if self.ctx.power.snapshot().state == PowerState::Sleep {
                        // Fell back asleep mid-drain; re-park.
                        self.sleep_queue.park(parked.method, parked.params, parked.sink);
                        continue;
                    }
                    // Full re-gate: license may have changed while parked.
                    self.run(parked.method, parked.params, parked.sink, false).await;
                }
                if self.ctx.power.snapshot().state == PowerState::Sleep {
                    break;
                }
            }
            self.draining.store(false, Ordering::Release);

            // A request that observed `draining` just before the flag
            // cleared may have parked into the emptied queue, and no
            // power transition will come to re-trigger this worker.
            // Pick such entries up now.
            if self.ctx.power.snapshot().state == PowerState::Sleep
                || self.sleep_queue.is_empty()
                || self.draining.swap(true, Ordering::AcqRel)
            {
                break;
            }
        }
    }

    // -- emergency stop --------------------------------------------------------

    /// Cancel every running handler and fail the parked backlog. Returns
    /// `(cancelled_active, drained_queued)`.
    pub fn emergency_stop(&self) -> (usize, usize) {
        let cancelled = {
            let active = self.active.lock();
            for req in active.values() {
                req.cancel.cancel();
            }
            active.len()
        };

        let mut drained = 0;
        for parked in self.sleep_queue.drain() {
            parked.disarm();
            if parked.sink.resolve(Err(DispatchError::new(
                ErrorCode::Cancelled,
                "emergency stop",
            ))) {
                drained += 1;
            }
        }
        tracing::warn!(cancelled, drained, "emergency stop executed");
        (cancelled, drained)
    }
}

/// Wait out a cancelled handler briefly, then abort it. The abort drops
/// the handler future, and `kill_on_drop` reaps any spawned child.
async fn reap(handler: tokio::task::JoinHandle<Result<Value, DispatchError>>) {
    let abort = handler.abort_handle();
    if tokio::time::timeout(CANCEL_GRACE, handler).await.is_err() {
        abort.abort();
    }
}

/// Resolve `tools/call {name, arguments}` or a bare tool-name method.
fn resolve_call(method: &str, params: &Value) -> Result<(String, Value), DispatchError> {
    if method == "tools/call" {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DispatchError::new(ErrorCode::InvalidArguments, "tools/call requires a name")
            })?
            .to_owned();
        let arguments =
            params.get("arguments").cloned().unwrap_or_else(|| Value::Object(Default::default()));
        return Ok((name, arguments));
    }
    // Bare tool name: params are the arguments.
    let arguments = match params {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    Ok((method.to_owned(), arguments))
}

/// Effective deadline: min(request-supplied, tool default, hard cap).
fn effective_deadline(params: &Value, arguments: &Value, tool_default: Duration) -> Duration {
    let requested = requested_timeout(params).or_else(|| requested_timeout(arguments));
    let mut deadline = tool_default.min(HARD_DEADLINE_CAP);
    if let Some(requested) = requested {
        deadline = deadline.min(requested);
    }
    deadline
}

fn requested_timeout(value: &Value) -> Option<Duration> {
    if let Some(ms) = value.get("timeoutMs").and_then(Value::as_u64) {
        return Some(Duration::from_millis(ms));
    }
    value.get("timeout").and_then(Value::as_u64).map(Duration::from_secs)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
