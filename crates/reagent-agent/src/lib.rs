//! Reagent Agent — protocol parser, prompt builder, tools, and the reasoning loop.
//!
//! This crate contains:
//! - **protocol**: Marker tokenizer turning a model reply into typed segments
//! - **prompt**: Renders conversation + tool catalogue into prompt text
//! - **tools**: Tool trait, registry, and built-in filesystem tools
//! - **agent_loop**: The model ↔ tool loop for one query

pub mod agent_loop;
pub mod error;
pub mod prompt;
pub mod protocol;
pub mod tools;

pub use agent_loop::{AgentLoop, QueryRequest, DEFAULT_MAX_ITERATIONS};
pub use error::{AgentError, ArgumentParseError, ProtocolError, RunFailure, ToolError};
pub use prompt::PromptBuilder;
pub use protocol::{decode_arguments, parse, ParsedSegment};
pub use tools::{default_registry, Tool, ToolRegistry};
