//! Filesystem tools — read, search, and summarize files.
//!
//! Relative paths resolve against the workspace. With `restrict_to_workspace`
//! every resolved path must stay inside it.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::base::{optional_i64, optional_string, require_string, schema, ParameterSchema, Tool, ToolArgs};

/// Maximum number of paths returned by a single search.
const MAX_SEARCH_RESULTS: usize = 200;

// ─────────────────────────────────────────────
// Shared path helper
// ─────────────────────────────────────────────

/// Where the filesystem tools may look.
#[derive(Clone, Debug)]
pub struct FsScope {
    workspace: PathBuf,
    restrict: bool,
}

impl FsScope {
    pub fn new(workspace: impl Into<PathBuf>, restrict: bool) -> Self {
        Self {
            workspace: workspace.into(),
            restrict,
        }
    }

    /// Resolve a user-supplied path against the workspace.
    ///
    /// Returns `Err` if the scope is restricted and the path escapes it.
    fn resolve(&self, path: &str) -> anyhow::Result<PathBuf> {
        let expanded = reagent_core::utils::expand_home(path);
        let joined = if expanded.is_absolute() {
            expanded
        } else {
            self.workspace.join(expanded)
        };
        let resolved = joined.canonicalize().unwrap_or(joined);

        if self.restrict {
            let root = self.root();
            if !resolved.starts_with(&root) {
                anyhow::bail!(
                    "Access denied: path '{}' is outside workspace '{}'",
                    resolved.display(),
                    root.display()
                );
            }
        }
        Ok(resolved)
    }

    fn root(&self) -> PathBuf {
        self.workspace
            .canonicalize()
            .unwrap_or_else(|_| self.workspace.clone())
    }

    /// A restricted scope only accepts relative glob patterns without `..`.
    fn check_pattern(&self, pattern: &str) -> anyhow::Result<()> {
        if !self.restrict {
            return Ok(());
        }
        let path = Path::new(pattern);
        if path.is_absolute()
            || path.has_root()
            || path.components().any(|c| matches!(c, Component::ParentDir))
        {
            anyhow::bail!("Access denied: pattern '{pattern}' reaches outside the workspace");
        }
        Ok(())
    }

    /// Whether a path on disk lies inside the scope. Symlinks are followed.
    fn contains(&self, path: &Path, root: &Path) -> bool {
        !self.restrict
            || path
                .canonicalize()
                .map(|p| p.starts_with(root))
                .unwrap_or(false)
    }
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    if !path.is_file() {
        anyhow::bail!("Not a file: {}", path.display());
    }
    std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))
}

// ─────────────────────────────────────────────
// ReadFileTool
// ─────────────────────────────────────────────

/// Returns a file's text, optionally limited to an inclusive 1-based line range.
pub struct ReadFileTool {
    scope: FsScope,
}

impl ReadFileTool {
    pub fn new(scope: FsScope) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Optionally return only a range of lines."
    }

    fn parameters(&self) -> ParameterSchema {
        schema(&[
            ("file_path", "path of the file to read"),
            ("start_line", "optional first line to return (1-based)"),
            ("end_line", "optional last line to return (inclusive)"),
        ])
    }

    async fn execute(&self, params: ToolArgs) -> anyhow::Result<Value> {
        let path = self.scope.resolve(&require_string(&params, "file_path")?)?;
        let content = read_text(&path)?;

        let start = optional_i64(&params, "start_line");
        let end = optional_i64(&params, "end_line");
        if start.is_none() && end.is_none() {
            return Ok(Value::String(content));
        }

        let start = start.unwrap_or(1).max(1) as usize;
        let end = end.map(|e| e.max(0) as usize).unwrap_or(usize::MAX);
        if end < start {
            anyhow::bail!("end_line ({end}) is before start_line ({start})");
        }
        let selected: Vec<&str> = content
            .lines()
            .skip(start - 1)
            .take(end - start + 1)
            .collect();
        Ok(Value::String(selected.join("\n")))
    }
}

// ─────────────────────────────────────────────
// SearchFilesTool
// ─────────────────────────────────────────────

/// Lists files under a directory matching a glob pattern.
pub struct SearchFilesTool {
    scope: FsScope,
}

impl SearchFilesTool {
    pub fn new(scope: FsScope) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search a directory for files whose paths match a glob pattern. Returns a JSON list of paths."
    }

    fn parameters(&self) -> ParameterSchema {
        schema(&[
            ("directory", "optional directory to search (defaults to the workspace)"),
            ("pattern", "glob pattern, e.g. *.md or **/*.rs"),
        ])
    }

    async fn execute(&self, params: ToolArgs) -> anyhow::Result<Value> {
        let pattern = require_string(&params, "pattern")?;
        self.scope.check_pattern(&pattern)?;
        let directory = optional_string(&params, "directory").unwrap_or_else(|| ".".into());
        let root = self.scope.resolve(&directory)?;
        if !root.is_dir() {
            anyhow::bail!("Not a directory: {}", root.display());
        }

        let full_pattern = root.join(&pattern);
        let full_pattern = full_pattern.to_string_lossy();
        let entries = glob::glob(&full_pattern)
            .map_err(|e| anyhow::anyhow!("Invalid pattern '{pattern}': {e}"))?;

        let scope_root = self.scope.root();
        let mut paths: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|p| p.is_file() && self.scope.contains(p, &scope_root))
            .map(|p| {
                p.strip_prefix(&root)
                    .map(|rel| rel.to_path_buf())
                    .unwrap_or(p)
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        paths.sort();
        paths.truncate(MAX_SEARCH_RESULTS);
        Ok(json!(paths))
    }
}

// ─────────────────────────────────────────────
// AnalyzeCodeTool
// ─────────────────────────────────────────────

/// Reports basic size and shape statistics for a source file.
pub struct AnalyzeCodeTool {
    scope: FsScope,
}

impl AnalyzeCodeTool {
    pub fn new(scope: FsScope) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl Tool for AnalyzeCodeTool {
    fn name(&self) -> &str {
        "analyze_code"
    }

    fn description(&self) -> &str {
        "Summarize a source file: line counts, size in bytes, and language guess."
    }

    fn parameters(&self) -> ParameterSchema {
        schema(&[("file_path", "path of the source file to analyze")])
    }

    async fn execute(&self, params: ToolArgs) -> anyhow::Result<Value> {
        let path = self.scope.resolve(&require_string(&params, "file_path")?)?;
        let content = read_text(&path)?;

        let mut blank = 0usize;
        let mut comment = 0usize;
        let mut longest = 0usize;
        let mut total = 0usize;
        for line in content.lines() {
            total += 1;
            longest = longest.max(line.chars().count());
            let trimmed = line.trim_start();
            if trimmed.is_empty() {
                blank += 1;
            } else if is_comment(trimmed) {
                comment += 1;
            }
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        Ok(json!({
            "path": path.display().to_string(),
            "language": language_for(&extension),
            "lines": total,
            "blank_lines": blank,
            "comment_lines": comment,
            "code_lines": total - blank - comment,
            "bytes": content.len(),
            "longest_line": longest,
        }))
    }
}

fn is_comment(line: &str) -> bool {
    ["//", "#", "--", "/*", "*"].iter().any(|p| line.starts_with(p))
}

fn language_for(extension: &str) -> &'static str {
    match extension {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cc" | "cpp" | "hpp" => "c++",
        "md" => "markdown",
        "toml" => "toml",
        "json" => "json",
        "sh" => "shell",
        _ => "unknown",
    }
}
