//! Configuration schema.
//!
//! Hierarchy: `Config` → `AgentConfig`, `ProviderConfig`, `ToolsConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.reagent/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub agent: AgentConfig,
    pub provider: ProviderConfig,
    pub tools: ToolsConfig,
}

// ─────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────

/// Loop and sampling settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// Model identifier sent to the generation service.
    pub model: String,
    /// Maximum model calls per query before best-effort termination.
    pub max_iterations: u32,
    /// Maximum tokens to generate per response.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "deepseek-chat".to_string(),
            max_iterations: 5,
            max_tokens: 2000,
            temperature: 0.7,
            top_p: 0.95,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

// ─────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────

/// Connection settings for the OpenAI-compatible generation service.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    /// API key for bearer authentication.
    pub api_key: String,
    /// API base URL, e.g. `https://api.deepseek.com/v1`.
    pub api_base: String,
    /// Wall-clock timeout per request attempt.
    pub timeout_secs: u64,
    /// Attempts per call, including the first.
    pub max_attempts: u32,
    /// Backoff unit; attempt `n` waits `n * retryBaseDelayMs` before the next one.
    pub retry_base_delay_ms: u64,
    /// Extra HTTP headers to send with each request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<HashMap<String, String>>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://api.deepseek.com/v1".to_string(),
            timeout_secs: 60,
            max_attempts: 3,
            retry_base_delay_ms: 1000,
            extra_headers: None,
        }
    }
}

impl ProviderConfig {
    /// Whether an API key is configured.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

// ─────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────

/// Settings for the built-in tools and tool dispatch.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolsConfig {
    /// Directory relative paths are resolved against.
    pub workspace: String,
    /// Refuse paths outside `workspace`.
    pub restrict_to_workspace: bool,
    /// Per-invocation handler timeout.
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            workspace: ".".to_string(),
            restrict_to_workspace: false,
            timeout_secs: 60,
        }
    }
}
