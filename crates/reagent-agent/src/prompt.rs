//! Prompt builder: renders the conversation, tool catalogue, and goal into
//! the text sent to the model.
//!
//! Output depends only on the inputs, so the same conversation always yields
//! the same prompt.

use reagent_core::types::{ChatMessage, ConversationEntry, Role, SegmentKind};
use reagent_core::utils::truncate_string;

use crate::tools::ToolDescriptor;

/// Short system message sent ahead of every prompt.
pub const SYSTEM_PROMPT: &str = "You are an AI assistant that follows the ReAct pattern. \
Each reply is either one step or the final answer.\n\
A step is `Thought:` with your reasoning, then `Action:` with one tool name \
and `Action Input:` with its arguments as a JSON object. Then stop: \
the runtime runs the tool and reports the result as an Observation in the next prompt.\n\
When you have enough information, reply with `Thought:` and then `Answer:` with the final answer.";

/// Fixed protocol instructions placed at the top of every prompt.
pub const DEFAULT_INSTRUCTIONS: &str = "\
# Instructions

Work through the goal step by step using these markers, each at the start of a line:

Thought: reason about what to do next.
Action: the name of exactly one tool from the list below.
Action Input: the tool's arguments as a single JSON object.
Observation: the tool result. The runtime writes this for you; never write it yourself.
Answer: your final answer. Use it once you have enough information.

Repeat Thought / Action / Action Input as many times as needed, one action per reply.
If something goes wrong and you cannot continue, reply with `Error:` followed by a description.";

/// Longest observation quoted in the tool-results summary.
const SUMMARY_PREVIEW_CHARS: usize = 500;

// ─────────────────────────────────────────────
// Prompt builder
// ─────────────────────────────────────────────

/// Renders prompts for the agent loop.
#[derive(Clone, Debug)]
pub struct PromptBuilder {
    instructions: String,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self {
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
        }
    }

    /// Replace the instruction block (builder pattern).
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Build the full prompt text.
    ///
    /// Sections, in order: instructions, tool catalogue, goal, transcript, and
    /// a summary of tool results when any tool has run.
    pub fn build(
        &self,
        conversation: &[ConversationEntry],
        catalogue: &[ToolDescriptor],
        goal: &str,
    ) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(5);

        parts.push(self.instructions.clone());
        parts.push(render_catalogue(catalogue));
        parts.push(format!("## Goal\n\n{goal}"));

        let transcript: Vec<String> = conversation.iter().map(ConversationEntry::render).collect();
        parts.push(format!("## Conversation\n\n{}", transcript.join("\n")));

        if let Some(summary) = render_tool_summary(conversation) {
            parts.push(summary);
        }

        parts.join("\n\n")
    }

    /// Wrap [`build`](Self::build) as the `[system, user]` message pair the gateway expects.
    pub fn build_messages(
        &self,
        conversation: &[ConversationEntry],
        catalogue: &[ToolDescriptor],
        goal: &str,
    ) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(self.build(conversation, catalogue, goal)),
        ]
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn render_catalogue(catalogue: &[ToolDescriptor]) -> String {
    if catalogue.is_empty() {
        return "## Tools\n\n(no tools available)".to_string();
    }

    let mut sorted: Vec<&ToolDescriptor> = catalogue.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = String::from("## Tools\n");
    for tool in sorted {
        out.push_str(&format!("\n- {}: {}", tool.name, tool.description));
        for (param, hint) in &tool.parameters {
            out.push_str(&format!("\n    - {param}: {hint}"));
        }
    }
    out
}

fn render_tool_summary(conversation: &[ConversationEntry]) -> Option<String> {
    let observations: Vec<&ConversationEntry> = conversation
        .iter()
        .filter(|e| e.role == Role::Tool && e.segment_kind == Some(SegmentKind::Observation))
        .collect();
    let latest = observations.last()?;

    Some(format!(
        "## Tool results\n\n{} tool call(s) so far. Most recent result:\n{}",
        observations.len(),
        truncate_string(&latest.content, SUMMARY_PREVIEW_CHARS)
    ))
}
