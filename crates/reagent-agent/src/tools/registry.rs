//! Tool Registry — name → tool lookup and guarded dispatch.
//!
//! Built once at startup and then shared read-only (`Arc<ToolRegistry>`)
//! between concurrent runs.
//!
//! Invariant: at most one tool per name. Registering a name that is already
//! taken replaces the earlier tool and hands it back to the caller.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::base::{FnTool, ParameterSchema, Tool, ToolArgs, ToolDescriptor};
use crate::error::ToolError;

/// Default per-invocation handler timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

// ─────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────

/// Stores tools keyed by name and dispatches calls.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    timeout: Option<Duration>,
}

impl ToolRegistry {
    /// Create an empty registry with the default handler timeout.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            timeout: Some(DEFAULT_TOOL_TIMEOUT),
        }
    }

    /// Set the handler timeout; `None` lets handlers run unbounded (builder pattern).
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a tool, returning the tool it replaced, if any.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        let name = tool.name().to_string();
        let previous = self.tools.insert(name.clone(), tool);
        if previous.is_some() {
            warn!(tool = %name, "replaced previously registered tool");
        } else {
            info!(tool = %name, "registered tool");
        }
        previous
    }

    /// Register a closure as a tool.
    pub fn register_fn<F, Fut>(
        &mut self,
        name: &str,
        description: &str,
        parameters: ParameterSchema,
        handler: F,
    ) -> Option<Arc<dyn Tool>>
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.register(Arc::new(FnTool::new(name, description, parameters, handler)))
    }

    /// Unregister a tool by name. Returns the removed tool, if any.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        let removed = self.tools.remove(name);
        if removed.is_some() {
            info!(tool = name, "unregistered tool");
        }
        removed
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Check if a tool is registered.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Names of all registered tools, sorted for determinism.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Catalogue entries for all registered tools, sorted by name.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<ToolDescriptor> =
            self.tools.values().map(|t| t.to_descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Execute a tool by name.
    ///
    /// An unknown name never reaches any handler. A handler error or timeout
    /// comes back as [`ToolError::Execution`] carrying the tool name, the
    /// parameters, and the original message.
    pub async fn invoke(&self, name: &str, params: ToolArgs) -> Result<Value, ToolError> {
        let tool = match self.tools.get(name) {
            Some(t) => t,
            None => {
                warn!(tool = name, "tool not found");
                return Err(ToolError::Unknown {
                    name: name.to_string(),
                    available: self.tool_names(),
                });
            }
        };

        let parameters = Value::Object(params.clone().into_iter().collect());
        debug!(tool = name, params = %parameters, "invoking tool");

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, tool.execute(params)).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("timed out after {}s", limit.as_secs_f64())),
            },
            None => tool.execute(params).await,
        };

        result.map_err(|e| {
            warn!(tool = name, error = %e, "tool execution failed");
            ToolError::Execution {
                name: name.to_string(),
                parameters,
                message: format!("{e:#}"),
            }
        })
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
