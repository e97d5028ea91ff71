//! Utility helpers — path resolution and string shortening for logs.

use std::path::PathBuf;

/// Get the Reagent data directory (e.g. `~/.reagent/`).
pub fn get_data_path() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".reagent")
}

/// Get the REPL history file (e.g. `~/.reagent/history/chat_history`).
pub fn get_history_path() -> PathBuf {
    get_data_path().join("history").join("chat_history")
}

/// Truncate a string to `max_len` characters, adding "..." if truncated.
/// Unicode-safe.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// Expand `~` to the home directory in a path string.
pub fn expand_home(path: &str) -> PathBuf {
    let home = || dirs_next::home_dir().unwrap_or_else(|| PathBuf::from("."));
    if let Some(rest) = path.strip_prefix("~/") {
        home().join(rest)
    } else if path == "~" {
        home()
    } else {
        PathBuf::from(path)
    }
}
