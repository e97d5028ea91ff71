//! Shared CLI helpers — answer and trace printing, tool catalogue, banner.

use colored::Colorize;
use serde_json::{json, Value};

use reagent_agent::tools::ToolDescriptor;
use reagent_agent::RunFailure;
use reagent_core::types::{
    ConversationEntry, InvocationOutcome, Role, RunResult, ToolInvocationRecord,
};
use reagent_core::utils::truncate_string;

/// Longest tool output shown in a trace line.
const TRACE_PREVIEW_CHARS: usize = 300;

/// Print a run's final answer to stdout.
pub fn print_response(result: &RunResult) {
    println!();
    println!("{}", "Reagent".cyan().bold());
    if result.final_text.is_empty() {
        println!("{}", "(no response)".dimmed());
    } else {
        println!("{}", result.final_text);
    }
    if result.is_best_effort() {
        println!(
            "{}",
            format!(
                "(best effort: no final answer after {} iteration(s))",
                result.iterations
            )
            .yellow()
        );
    }
    println!();
}

/// Print the conversation and tool log of a run.
pub fn print_trace(conversation: &[ConversationEntry], tool_invocations: &[ToolInvocationRecord]) {
    println!();
    println!("{}", "── Trace ──".dimmed());
    for entry in conversation {
        println!("{}", trace_line(entry));
    }

    if !tool_invocations.is_empty() {
        println!();
        println!("{}", "── Tool calls ──".dimmed());
        for record in tool_invocations {
            let status = match &record.outcome {
                InvocationOutcome::Success { output } => format!(
                    "{} {}",
                    "✓".green(),
                    truncate_string(&output.to_string(), TRACE_PREVIEW_CHARS)
                ),
                InvocationOutcome::Failure { error } => format!("{} {}", "✗".red(), error),
            };
            println!("  {} {} {}", record.tool_name.bold(), record.parameters, status);
        }
    }
}

fn trace_line(entry: &ConversationEntry) -> String {
    let role = match entry.role {
        Role::User => entry.role.as_str().blue().bold(),
        Role::Assistant => entry.role.as_str().cyan(),
        Role::Tool => entry.role.as_str().magenta(),
    };
    let body = match entry.segment_kind {
        Some(kind) => format!("{} {}", format!("{}:", kind.marker()).bold(), entry.content),
        None => entry.content.clone(),
    };
    format!("  {role:>9} │ {body}")
}

/// JSON view of a failed run, for `--json` output.
pub fn failure_json(failure: &RunFailure) -> Value {
    json!({
        "error": {
            "kind": failure.error.kind(),
            "message": failure.error.to_string(),
        },
        "iterations": failure.iterations,
        "conversation": failure.conversation,
        "tool_invocations": failure.tool_invocations,
    })
}

/// Print the tool catalogue.
pub fn print_catalogue(descriptors: &[ToolDescriptor]) {
    println!();
    println!("{}", "Reagent Tools".cyan().bold());
    println!();
    if descriptors.is_empty() {
        println!("  {}", "(no tools registered)".dimmed());
    }
    for tool in descriptors {
        println!("  {:<16} {}", tool.name.bold(), tool.description);
        for (param, hint) in &tool.parameters {
            println!("    {:<14} {}", param.dimmed(), hint);
        }
    }
    println!();
}

/// Print the banner shown at REPL start.
pub fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "Reagent".cyan().bold(), version.dimmed());
    println!(
        "{}",
        "Type a question, or \"exit\" to quit. Ctrl-C cancels a running query.".dimmed()
    );
    println!();
}

/// Print a "thinking" placeholder (for non-log mode).
pub fn print_thinking() {
    eprint!("{}", "⠿ thinking...".dimmed());
}

/// Clear the "thinking" placeholder.
pub fn clear_thinking() {
    eprint!("\r{}\r", " ".repeat(40));
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use reagent_agent::AgentError;
    use reagent_core::types::SegmentKind;

    #[test]
    fn trace_line_includes_marker_and_content() {
        colored::control::set_override(false);
        let entry = ConversationEntry::assistant(Some(SegmentKind::Thought), "look around");
        let line = trace_line(&entry);
        assert!(line.contains("assistant"));
        assert!(line.contains("Thought: look around"));
    }

    #[test]
    fn failure_json_carries_progress() {
        let failure = RunFailure {
            error: AgentError::Cancelled,
            iterations: 2,
            conversation: vec![ConversationEntry::user("q")],
            tool_invocations: Vec::new(),
        };
        let value = failure_json(&failure);
        assert_eq!(value["error"]["kind"], "Cancelled");
        assert_eq!(value["iterations"], 2);
        assert_eq!(value["conversation"][0]["role"], "user");
    }
}
