//! Tool modules for the Reagent agent.

pub mod base;
pub mod filesystem;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use reagent_core::config::ToolsConfig;
use reagent_core::utils::expand_home;

pub use base::{
    optional_i64, optional_string, require_string, schema, FnTool, ParameterSchema, Tool,
    ToolArgs, ToolDescriptor,
};
pub use filesystem::{AnalyzeCodeTool, FsScope, ReadFileTool, SearchFilesTool};
pub use registry::ToolRegistry;

/// Build a registry holding the built-in filesystem tools.
///
/// A `timeoutSecs` of zero disables the per-call handler timeout.
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));
    let scope = FsScope::new(expand_home(&config.workspace), config.restrict_to_workspace);

    let mut registry = ToolRegistry::new().with_timeout(timeout);
    registry.register(Arc::new(ReadFileTool::new(scope.clone())));
    registry.register(Arc::new(SearchFilesTool::new(scope.clone())));
    registry.register(Arc::new(AnalyzeCodeTool::new(scope)));
    registry
}
