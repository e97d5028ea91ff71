//! Interactive REPL.
//!
//! Uses `rustyline` for readline-style editing with persistent history.
//! Each query gets its own cancellation token wired to Ctrl-C.

use anyhow::Result;
use rustyline::config::Configurer;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use reagent_agent::{AgentError, AgentLoop, QueryRequest};
use reagent_core::utils::get_history_path;

use crate::helpers;

/// Exit commands (case-insensitive match).
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

/// Toggles trace printing for the rest of the session.
const TRACE_COMMAND: &str = "/trace";

/// Run the interactive REPL loop.
pub async fn run(agent: AgentLoop, mut show_trace: bool) -> Result<()> {
    helpers::print_banner();

    let mut editor = create_editor()?;

    loop {
        let input = match editor.readline("You: ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted) => break,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }

        if is_exit_command(trimmed) {
            println!("\nGoodbye!");
            break;
        }

        if trimmed.eq_ignore_ascii_case(TRACE_COMMAND) {
            show_trace = !show_trace;
            println!("trace {}", if show_trace { "on" } else { "off" });
            continue;
        }

        let _ = editor.add_history_entry(&input);

        debug!(input = trimmed, "processing input");
        helpers::print_thinking();

        let cancel = CancellationToken::new();
        let watcher = crate::spawn_ctrl_c_watcher(cancel.clone());
        let outcome = agent
            .run_with_cancel(QueryRequest::new(trimmed), cancel)
            .await;
        watcher.abort();
        helpers::clear_thinking();

        match outcome {
            Ok(result) => {
                if show_trace {
                    helpers::print_trace(&result.conversation, &result.tool_invocations);
                }
                helpers::print_response(&result);
            }
            Err(failure) if matches!(failure.error, AgentError::Cancelled) => {
                eprintln!("\n(cancelled)\n");
            }
            Err(failure) => {
                if show_trace {
                    helpers::print_trace(&failure.conversation, &failure.tool_invocations);
                }
                eprintln!("\nError: {failure}\n");
            }
        }
    }

    save_history(&mut editor);

    Ok(())
}

/// Create a rustyline editor with history.
fn create_editor() -> Result<Editor<(), DefaultHistory>> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;

    let history_path = get_history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
        debug!("loaded REPL history from {}", history_path.display());
    }

    Ok(editor)
}

/// Save history to disk.
fn save_history(editor: &mut Editor<(), DefaultHistory>) {
    let path = get_history_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save history: {e}");
    }
}

/// Check if input is an exit command.
fn is_exit_command(input: &str) -> bool {
    let lower = input.to_lowercase();
    EXIT_COMMANDS.contains(&lower.as_str())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_commands() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("EXIT"));
        assert!(is_exit_command("/quit"));
        assert!(is_exit_command(":q"));
        assert!(!is_exit_command("hello"));
        assert!(!is_exit_command(""));
    }

    #[test]
    fn history_path_under_data_dir() {
        let path = get_history_path();
        assert!(path.to_string_lossy().contains(".reagent"));
        assert!(path.to_string_lossy().contains("chat_history"));
    }
}
