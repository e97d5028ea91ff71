//! Core types for Reagent: conversation records, run results, and the
//! OpenAI-compatible wire format spoken by the model gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────
// Conversation
// ─────────────────────────────────────────────

/// Who authored a conversation entry.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol segment an entry was produced from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Thought,
    Action,
    Observation,
    Answer,
    Error,
}

impl SegmentKind {
    /// The literal protocol marker for this kind (without the colon).
    pub fn marker(&self) -> &'static str {
        match self {
            SegmentKind::Thought => "Thought",
            SegmentKind::Action => "Action",
            SegmentKind::Observation => "Observation",
            SegmentKind::Answer => "Answer",
            SegmentKind::Error => "Error",
        }
    }
}

/// One record of a run's conversation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConversationEntry {
    pub role: Role,
    pub content: String,
    #[serde(rename = "kind", default, skip_serializing_if = "Option::is_none")]
    pub segment_kind: Option<SegmentKind>,
}

impl ConversationEntry {
    /// The user's query.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            segment_kind: None,
        }
    }

    /// Model-authored content, optionally tagged with its segment kind.
    pub fn assistant(kind: Option<SegmentKind>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            segment_kind: kind,
        }
    }

    /// Content produced by the runtime on the model's behalf (tool results, protocol notes).
    pub fn tool(kind: SegmentKind, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            segment_kind: Some(kind),
        }
    }

    /// Render as a transcript line: `role: content`, with the segment marker
    /// prefixed to the content when the entry has a kind.
    pub fn render(&self) -> String {
        match self.segment_kind {
            Some(kind) => format!("{}: {}: {}", self.role, kind.marker(), self.content),
            None => format!("{}: {}", self.role, self.content),
        }
    }
}

/// Append-only conversation owned by a single run.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Conversation {
    entries: Vec<ConversationEntry>,
}

impl Conversation {
    /// Start a conversation seeded with the user's query.
    pub fn seeded(query: impl Into<String>) -> Self {
        Self {
            entries: vec![ConversationEntry::user(query)],
        }
    }

    pub fn push(&mut self, entry: ConversationEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Content of the most recent assistant-authored entry.
    pub fn last_assistant_content(&self) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.role == Role::Assistant)
            .map(|e| e.content.as_str())
    }

    pub fn into_entries(self) -> Vec<ConversationEntry> {
        self.entries
    }
}

// ─────────────────────────────────────────────
// Tool invocation log
// ─────────────────────────────────────────────

/// Result of one attempted tool dispatch.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum InvocationOutcome {
    Success { output: Value },
    Failure { error: String },
}

impl InvocationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationOutcome::Success { .. })
    }
}

/// One entry of a run's tool log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocationRecord {
    pub tool_name: String,
    /// Decoded arguments, or the raw argument text when decoding failed.
    pub parameters: Value,
    pub outcome: InvocationOutcome,
}

// ─────────────────────────────────────────────
// Run result
// ─────────────────────────────────────────────

/// How a successful run ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// The model produced an `Answer:` segment.
    Answered,
    /// The iteration budget ran out; `final_text` is best-effort.
    Exhausted,
}

/// Everything a caller gets back from one top-level query.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResult {
    pub final_text: String,
    pub outcome: RunOutcome,
    /// Number of model calls made.
    pub iterations: usize,
    pub conversation: Vec<ConversationEntry>,
    pub tool_invocations: Vec<ToolInvocationRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn is_best_effort(&self) -> bool {
        self.outcome == RunOutcome::Exhausted
    }
}

// ─────────────────────────────────────────────
// Chat wire format (OpenAI chat completions)
// ─────────────────────────────────────────────

/// A message sent to the generation service.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role")]
pub enum ChatMessage {
    #[serde(rename = "system")]
    System { content: String },
    #[serde(rename = "user")]
    User { content: String },
    #[serde(rename = "assistant")]
    Assistant { content: String },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage::Assistant {
            content: content.into(),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            ChatMessage::System { content }
            | ChatMessage::User { content }
            | ChatMessage::Assistant { content } => content,
        }
    }
}

/// Request body for an OpenAI-compatible chat completion API.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

/// Raw chat completion response. Used internally for deserialization.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    pub usage: Option<UsageInfo>,
}

impl ChatCompletionResponse {
    /// Content of the first completion choice, if any.
    pub fn into_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: AssistantMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage statistics from the service.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UsageInfo {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
