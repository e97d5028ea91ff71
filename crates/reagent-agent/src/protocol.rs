//! Marker protocol parser.
//!
//! Turns one raw model response into an ordered list of [`ParsedSegment`]s.
//! Markers are located with a single tokenizer pass; each marker's body runs
//! to the next marker (or the end of the text).
//!
//! ```text
//! Thought: I should look for markdown files.
//! Action: search_files
//! Action Input: {"directory": ".", "pattern": "*.md"}
//! ```

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use reagent_core::types::SegmentKind;

use crate::error::{ArgumentParseError, ProtocolError};
use crate::tools::ToolArgs;

/// One unit of a parsed response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedSegment {
    Thought {
        text: String,
    },
    /// `raw_argument_text` is `None` when the model named a tool but never
    /// supplied an `Action Input:`; such an action is not dispatchable.
    Action {
        tool_name: String,
        raw_argument_text: Option<String>,
    },
    Observation {
        text: String,
    },
    Answer {
        text: String,
    },
    Error {
        text: String,
    },
}

impl ParsedSegment {
    pub fn kind(&self) -> SegmentKind {
        match self {
            ParsedSegment::Thought { .. } => SegmentKind::Thought,
            ParsedSegment::Action { .. } => SegmentKind::Action,
            ParsedSegment::Observation { .. } => SegmentKind::Observation,
            ParsedSegment::Answer { .. } => SegmentKind::Answer,
            ParsedSegment::Error { .. } => SegmentKind::Error,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Marker {
    Thought,
    Action,
    ActionInput,
    Observation,
    Answer,
    Error,
}

struct MarkerHit {
    marker: Marker,
    start: usize,
    end: usize,
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "Action Input" must precede "Action" in the alternation.
    RE.get_or_init(|| {
        Regex::new(r"\b(Thought|Action Input|Action|Observation|Answer|Error):")
            .expect("marker pattern is valid")
    })
}

fn tokenize(raw: &str) -> Vec<MarkerHit> {
    marker_regex()
        .captures_iter(raw)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let marker = match caps.get(1)?.as_str() {
                "Thought" => Marker::Thought,
                "Action Input" => Marker::ActionInput,
                "Action" => Marker::Action,
                "Observation" => Marker::Observation,
                "Answer" => Marker::Answer,
                _ => Marker::Error,
            };
            Some(MarkerHit {
                marker,
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// Tool names sometimes arrive quoted or wrapped in backticks.
fn clean_tool_name(body: &str) -> String {
    body.lines()
        .next()
        .unwrap_or("")
        .trim()
        .trim_matches(|c| matches!(c, '`' | '"' | '\'' | '*'))
        .trim()
        .to_string()
}

fn flush_pending(pending: &mut Option<String>, segments: &mut Vec<ParsedSegment>) {
    if let Some(tool_name) = pending.take() {
        segments.push(ParsedSegment::Action {
            tool_name,
            raw_argument_text: None,
        });
    }
}

/// Parse a raw model response.
///
/// The first `Answer:` wins: everything after it becomes the answer text and
/// parsing stops there. Text before the first marker is ignored. Markers in
/// unusual order are accepted as they come.
pub fn parse(raw: &str) -> Result<Vec<ParsedSegment>, ProtocolError> {
    let hits = tokenize(raw);
    if hits.is_empty() {
        return Err(ProtocolError::NoMarkers {
            raw: raw.to_string(),
        });
    }

    let mut segments = Vec::with_capacity(hits.len());
    let mut pending: Option<String> = None;

    for (i, hit) in hits.iter().enumerate() {
        let body_end = hits.get(i + 1).map(|next| next.start).unwrap_or(raw.len());
        let body = raw[hit.end..body_end].trim().to_string();

        match hit.marker {
            Marker::Answer => {
                flush_pending(&mut pending, &mut segments);
                segments.push(ParsedSegment::Answer {
                    text: raw[hit.end..].trim().to_string(),
                });
                return Ok(segments);
            }
            Marker::Action => {
                flush_pending(&mut pending, &mut segments);
                pending = Some(clean_tool_name(&body));
            }
            Marker::ActionInput => match pending.take() {
                Some(tool_name) => segments.push(ParsedSegment::Action {
                    tool_name,
                    raw_argument_text: Some(body),
                }),
                None => warn!(input = %body, "dropping Action Input with no preceding Action"),
            },
            Marker::Thought => {
                flush_pending(&mut pending, &mut segments);
                segments.push(ParsedSegment::Thought { text: body });
            }
            Marker::Observation => {
                flush_pending(&mut pending, &mut segments);
                segments.push(ParsedSegment::Observation { text: body });
            }
            Marker::Error => {
                flush_pending(&mut pending, &mut segments);
                segments.push(ParsedSegment::Error { text: body });
            }
        }
    }

    flush_pending(&mut pending, &mut segments);
    Ok(segments)
}

// ─────────────────────────────────────────────
// Argument decoding
// ─────────────────────────────────────────────

/// Decode `Action Input:` text into named arguments.
///
/// Tries the whole span as a JSON object first, then every balanced
/// `{...}` substring in order. Blank input decodes to no arguments.
pub fn decode_arguments(tool: &str, raw: &str) -> Result<ToolArgs, ArgumentParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(ToolArgs::new());
    }

    if let Some(args) = decode_object(trimmed) {
        return Ok(args);
    }

    for (start, _) in trimmed.match_indices('{') {
        let candidate = &trimmed[start..];
        if let Some(len) = balanced_object_len(candidate) {
            if let Some(args) = decode_object(&candidate[..len]) {
                return Ok(args);
            }
        }
    }

    Err(ArgumentParseError {
        tool: tool.to_string(),
        raw: raw.to_string(),
    })
}

fn decode_object(text: &str) -> Option<ToolArgs> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map.into_iter().collect()),
        _ => None,
    }
}

/// Byte length of the `{...}` object starting at `text[0]`, honoring string
/// literals and escapes. `None` if the braces never balance.
fn balanced_object_len(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}
