// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Localhost HTTP facade for co-resident processes (tray, browser
//! extension bridge). Every endpoint is either a trivial probe or a tool
//! invocation routed through the dispatcher — identical pre-conditions,
//! identical deadlines.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::dispatch::{reserved, Dispatcher, HARD_DEADLINE_CAP};
use crate::error::DispatchError;
use crate::session::pending::Origin;
use crate::state::AgentCtx;

#[derive(Clone)]
struct FacadeState {
    ctx: Arc<AgentCtx>,
    dispatcher: Arc<Dispatcher>,
}

/// Build the facade router.
pub fn router(ctx: Arc<AgentCtx>, dispatcher: Arc<Dispatcher>) -> Router {
    let state = FacadeState { ctx, dispatcher };
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/status", get(status))
        .route("/api/v1/tools", get(tools))
        .route("/api/v1/call", post(call))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the facade on 127.0.0.1 until shutdown.
pub async fn serve(ctx: Arc<AgentCtx>, dispatcher: Arc<Dispatcher>, port: u16) -> anyhow::Result<()> {
    let shutdown = ctx.shutdown.clone();
    let router = router(ctx, dispatcher);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!(port, "facade listening on localhost");
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;
    Ok(())
}

async fn health(State(state): State<FacadeState>) -> Json<Value> {
    Json(json!({
        "status": "running",
        "version": state.ctx.version,
        "uptimeSecs": state.ctx.started_at.elapsed().as_secs(),
        "pid": std::process::id(),
    }))
}

async fn status(State(state): State<FacadeState>) -> (StatusCode, Json<Value>) {
    match reserved::handle(&state.dispatcher, "status", &Value::Null).await {
        Ok(result) => (StatusCode::OK, Json(result)),
        Err(e) => error_response(e),
    }
}

async fn tools(State(state): State<FacadeState>) -> Json<Value> {
    Json(json!({ "tools": state.ctx.registry.snapshot() }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallBody {
    method: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

/// `POST /api/v1/call` — run a method through the dispatcher with a
/// facade-origin pending entry.
async fn call(
    State(state): State<FacadeState>,
    Json(body): Json<CallBody>,
) -> (StatusCode, Json<Value>) {
    let mut params = match body.params {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    if let (Some(ms), Some(obj)) = (body.timeout_ms, params.as_object_mut()) {
        obj.insert("timeoutMs".to_owned(), json!(ms));
    }

    let id = format!("facade-{}", uuid::Uuid::new_v4());
    let deadline = Instant::now() + HARD_DEADLINE_CAP;
    let (sink, rx) = match state.ctx.pending.insert(&id, Origin::Facade, deadline) {
        Ok(pair) => pair,
        Err(e) => return error_response(e),
    };

    state.dispatcher.submit(body.method, params, sink);

    match rx.await {
        Ok(Ok(result)) => (StatusCode::OK, Json(json!({ "id": id, "result": result }))),
        Ok(Err(e)) => error_response(e),
        Err(_) => error_response(DispatchError::internal("request lost")),
    }
}

fn error_response(err: DispatchError) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(err.code.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": { "code": err.code, "message": err.message } })))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
