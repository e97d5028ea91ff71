//! Failure taxonomy for parsing, dispatch, and whole runs.
//!
//! Parser and registry failures are values the loop turns into observations
//! so the model can correct itself. Only [`AgentError`] ends a run.

use serde_json::Value;
use thiserror::Error;

use reagent_core::types::{ConversationEntry, ToolInvocationRecord};
use reagent_core::utils::truncate_string;
use reagent_providers::GatewayError;

/// Longest slice of raw model text quoted in an error message.
const RAW_PREVIEW_CHARS: usize = 200;

/// The model's response does not follow the marker protocol.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("response contains no recognized protocol marker: {:?}", truncate_string(.raw, RAW_PREVIEW_CHARS))]
    NoMarkers { raw: String },

    #[error("action '{tool}' was not followed by an Action Input")]
    MissingActionInput { tool: String },
}

impl ProtocolError {
    pub fn kind(&self) -> &'static str {
        "ProtocolError"
    }
}

/// `Action Input:` text could not be decoded into an argument object.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("could not decode arguments for tool '{tool}' from {:?}; expected a JSON object", truncate_string(.raw, RAW_PREVIEW_CHARS))]
pub struct ArgumentParseError {
    pub tool: String,
    pub raw: String,
}

impl ArgumentParseError {
    pub fn kind(&self) -> &'static str {
        "ArgumentParseError"
    }
}

/// Tool lookup or execution failure.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ToolError {
    #[error("tool '{name}' is not registered; available tools: {}", .available.join(", "))]
    Unknown { name: String, available: Vec<String> },

    #[error("tool '{name}' failed with parameters {parameters}: {message}")]
    Execution {
        name: String,
        parameters: Value,
        message: String,
    },
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Unknown { .. } => "UnknownToolError",
            ToolError::Execution { .. } => "ToolExecutionError",
        }
    }
}

/// Why a run could not produce a result.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model gateway failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("run was cancelled")]
    Cancelled,

    #[error("query is empty")]
    EmptyQuery,
}

impl AgentError {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Gateway(e) => e.kind(),
            AgentError::Cancelled => "Cancelled",
            AgentError::EmptyQuery => "EmptyQuery",
        }
    }
}

/// A terminal failure, with whatever progress the run made before it.
#[derive(Debug, Error)]
#[error("run failed after {iterations} iteration(s): {error}")]
pub struct RunFailure {
    #[source]
    pub error: AgentError,
    pub iterations: usize,
    pub conversation: Vec<ConversationEntry>,
    pub tool_invocations: Vec<ToolInvocationRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_tool_message_names_tool() {
        let err = ToolError::Unknown {
            name: "teleport".into(),
            available: vec!["read_file".into(), "search_files".into()],
        };
        assert_eq!(err.kind(), "UnknownToolError");
        let msg = err.to_string();
        assert!(msg.contains("teleport"));
        assert!(msg.contains("read_file, search_files"));
    }

    #[test]
    fn test_execution_error_keeps_parameters_and_message() {
        let err = ToolError::Execution {
            name: "read_file".into(),
            parameters: json!({"file_path": "/nope"}),
            message: "File not found: /nope".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/nope"));
        assert!(msg.contains("File not found"));
        assert_eq!(err.kind(), "ToolExecutionError");
    }

    #[test]
    fn test_no_markers_preview_is_bounded() {
        let err = ProtocolError::NoMarkers { raw: "x".repeat(1000) };
        assert!(err.to_string().len() < 300);
    }

    #[test]
    fn test_gateway_error_kind_passes_through() {
        let err = AgentError::from(GatewayError::Transport("down".into()));
        assert_eq!(err.kind(), "TransportError");
    }
}
