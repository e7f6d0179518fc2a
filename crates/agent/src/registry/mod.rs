// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only tool registry. Tools are registered at startup (static set
//! plus platform-specific set gated on capability availability), then the
//! registry is frozen; the dispatcher never knows tool names at compile
//! time.

pub mod builtin;
pub mod schema;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{DispatchError, ErrorCode};
use crate::license::{DefaultBrowser, Permissions};
use crate::platform::{Capability, PlatformAdapter};

/// Behavioural tags the dispatcher keys scheduling and policy on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolTags {
    /// Takes a per-tool semaphore of one (e.g. a capture pipeline).
    pub exclusive: bool,
    /// Takes the single global lock (e.g. credential operations).
    pub serialized_globally: bool,
    /// Inputs pass the destructive-command policy filter.
    pub shell_like: bool,
    /// Requires an interactive desktop session.
    pub gui_only: bool,
    /// Performs no side effects on the host.
    pub read_only: bool,
}

/// Static description of a tool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub capabilities: Vec<Capability>,
    pub tags: ToolTags,
    /// Default deadline when the request does not carry one.
    #[serde(serialize_with = "serialize_ms", rename = "defaultTimeoutMs")]
    pub default_timeout: Duration,
}

fn serialize_ms<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Execution context handed to every tool handler.
#[derive(Clone)]
pub struct ToolCtx {
    pub adapter: Arc<PlatformAdapter>,
    pub permissions: Permissions,
    pub default_browser: DefaultBrowser,
    /// Cancelled on deadline, emergency stop, license revocation, shutdown.
    pub cancel: CancellationToken,
}

/// A tool handler: decoded arguments in, result value or typed error out.
pub type Handler = Arc<
    dyn Fn(ToolCtx, Value) -> Pin<Box<dyn Future<Output = Result<Value, DispatchError>> + Send>>
        + Send
        + Sync,
>;

/// A registered tool: spec, compiled argument validator, handler.
pub struct Tool {
    pub spec: ToolSpec,
    validator: jsonschema::Validator,
    handler: Handler,
}

impl Tool {
    pub fn new(spec: ToolSpec, handler: Handler) -> anyhow::Result<Self> {
        let validator = schema::compile(&spec.input_schema)?;
        Ok(Self { spec, validator, handler })
    }

    /// Validate `arguments` against the tool's input schema.
    pub fn validate(&self, arguments: &Value) -> Result<(), DispatchError> {
        schema::validate(&self.validator, arguments)
    }

    /// Invoke the handler. The caller has already validated arguments and
    /// acquired any exclusion permits.
    pub async fn invoke(&self, ctx: ToolCtx, arguments: Value) -> Result<Value, DispatchError> {
        (self.handler)(ctx, arguments).await
    }
}

/// The process-lifetime tool registry.
#[derive(Default)]
pub struct ToolRegistry {
    tools: parking_lot::RwLock<IndexMap<String, Arc<Tool>>>,
    frozen: AtomicBool,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails after `freeze`, and on duplicate names.
    pub fn register(&self, tool: Tool) -> anyhow::Result<()> {
        if self.frozen.load(Ordering::Acquire) {
            anyhow::bail!("tool registry is frozen");
        }
        let mut tools = self.tools.write();
        let name = tool.spec.name.clone();
        if tools.contains_key(&name) {
            anyhow::bail!("duplicate tool name: {name}");
        }
        tools.insert(name, Arc::new(tool));
        Ok(())
    }

    /// Freeze the registry; all later `register` calls fail.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Tool>> {
        self.tools.read().get(name).map(Arc::clone)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Serializable snapshot for `tools/list`.
    pub fn snapshot(&self) -> Vec<ToolSpec> {
        self.tools.read().values().map(|tool| tool.spec.clone()).collect()
    }
}

/// Convenience constructor used by the builtin set and tests.
pub fn tool(
    name: &str,
    description: &str,
    input_schema: Value,
    capabilities: Vec<Capability>,
    tags: ToolTags,
    default_timeout: Duration,
    handler: Handler,
) -> anyhow::Result<Tool> {
    Tool::new(
        ToolSpec {
            name: name.to_owned(),
            description: description.to_owned(),
            input_schema,
            capabilities,
            tags,
            default_timeout,
        },
        handler,
    )
}

/// Wrap an async closure into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(ToolCtx, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, DispatchError>> + Send + 'static,
{
    Arc::new(move |ctx, args| Box::pin(f(ctx, args)))
}

/// Decode a typed argument struct out of a validated JSON object.
pub fn decode_args<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T, DispatchError> {
    serde_json::from_value(arguments)
        .map_err(|e| DispatchError::new(ErrorCode::InvalidArguments, e.to_string()))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
