//! Tool trait — the abstract interface every agent tool must implement.
//!
//! Handlers run with the full privileges of the process. The registry does no
//! sandboxing: a tool that reads files, spawns processes, or calls the network
//! is responsible for its own limits and its own concurrency safety.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Keyword arguments passed to a tool handler.
pub type ToolArgs = HashMap<String, Value>;

/// Parameter name → human-readable constraint, e.g. `"pattern" → "glob such as *.md"`.
///
/// Ordered so rendered catalogues are stable.
pub type ParameterSchema = BTreeMap<String, String>;

// ─────────────────────────────────────────────
// Tool trait
// ─────────────────────────────────────────────

/// Every agent tool implements this trait.
///
/// The prompt builder documents tools via `to_descriptor()`, and the registry
/// dispatches calls via `execute()`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model uses in `Action:` (e.g. `"read_file"`).
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// Accepted parameters and a hint for each.
    fn parameters(&self) -> ParameterSchema;

    /// Execute the tool with decoded arguments.
    ///
    /// Return text as `Value::String`, or any structured JSON value.
    /// On failure, return an `Err`; the registry wraps it with the tool name
    /// and parameters.
    async fn execute(&self, params: ToolArgs) -> anyhow::Result<Value>;

    /// Catalogue entry for this tool.
    fn to_descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// What the model is told about a tool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

// ─────────────────────────────────────────────
// Closure-backed tool
// ─────────────────────────────────────────────

type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;
type BoxedHandler = Box<dyn Fn(ToolArgs) -> HandlerFuture + Send + Sync>;

/// A tool built from a name, description, schema, and async closure.
pub struct FnTool {
    name: String,
    description: String,
    parameters: ParameterSchema,
    handler: BoxedHandler,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSchema,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Box::new(move |args: ToolArgs| -> HandlerFuture { Box::pin(handler(args)) }),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> ParameterSchema {
        self.parameters.clone()
    }

    async fn execute(&self, params: ToolArgs) -> anyhow::Result<Value> {
        (self.handler)(params).await
    }
}

/// Build a [`ParameterSchema`] from `(name, hint)` pairs.
pub fn schema(pairs: &[(&str, &str)]) -> ParameterSchema {
    pairs
        .iter()
        .map(|(name, hint)| (name.to_string(), hint.to_string()))
        .collect()
}

// ─────────────────────────────────────────────
// Param helpers
// ─────────────────────────────────────────────

/// Extract a required `String` param, returning a user-friendly error.
pub fn require_string(params: &ToolArgs, key: &str) -> anyhow::Result<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Missing required parameter: {key}"))
}

/// Extract an optional `String` param.
pub fn optional_string(params: &ToolArgs, key: &str) -> Option<String> {
    params.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Extract an optional integer param. Numeric strings are accepted too,
/// since models often quote numbers.
pub fn optional_i64(params: &ToolArgs, key: &str) -> Option<i64> {
    params.get(key).and_then(|v| match v {
        Value::String(s) => s.trim().parse().ok(),
        other => other.as_i64(),
    })
}
