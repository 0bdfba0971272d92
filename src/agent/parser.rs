//! Tool-call extraction from raw model output.
//!
//! The model requests tools with a single fenced block:
//!
//! ```text
//! <tool_calls>[{"name": "read", "arguments": {"path": "a.txt"}}]</tool_calls>
//! ```
//!
//! Parsing fails closed. A missing block, invalid JSON or a non-array body
//! yields no calls at all, and entries without a name or with arguments that
//! are neither an object nor a string are dropped. String arguments are kept
//! as-is; [`ToolCall::parse_arguments`] decodes them at execution time so a
//! bad payload becomes a failed tool result instead of vanishing.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::session::ToolCall;

static TOOL_CALLS_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<tool_calls>\s*(.*?)\s*</tool_calls>").unwrap());

/// Extract the tool calls requested in `text`.
///
/// Only the first `<tool_calls>` block is read. Ids missing or repeated
/// within the block are replaced with fresh `call_<uuid>` ids.
///
/// # Example
/// ```
/// use taskclaw::agent::parse_tool_calls;
///
/// let calls = parse_tool_calls(
///     r#"Let me look. <tool_calls>[{"name":"read","arguments":{"path":"a.txt"}}]</tool_calls>"#,
/// );
/// assert_eq!(calls.len(), 1);
/// assert_eq!(calls[0].name, "read");
///
/// assert!(parse_tool_calls("The answer is 4.").is_empty());
/// ```
pub fn parse_tool_calls(text: &str) -> Vec<ToolCall> {
    let Some(body) = TOOL_CALLS_BLOCK
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
    else {
        return Vec::new();
    };

    let entries = match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(entries)) => entries,
        Ok(_) => {
            debug!("tool_calls block is not an array, ignoring");
            return Vec::new();
        }
        Err(e) => {
            debug!(error = %e, "tool_calls block is not valid JSON, ignoring");
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut calls = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(name) = entry
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
        else {
            debug!("Dropping tool call without a name");
            continue;
        };

        let arguments = match entry.get("arguments") {
            Some(args @ (Value::Object(_) | Value::String(_))) => args.clone(),
            _ => {
                debug!(tool = name, "Dropping tool call without an argument object");
                continue;
            }
        };

        let id = match entry.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() && !seen.contains(id) => id.to_string(),
            _ => format!("call_{}", uuid::Uuid::new_v4().simple()),
        };
        seen.insert(id.clone());

        calls.push(ToolCall::new(&id, name, arguments));
    }
    calls
}

/// Remove every `<tool_calls>` block from `text`, trimming the remainder.
///
/// Used to report the model's prose when a run ends mid tool-call.
pub fn strip_tool_calls(text: &str) -> String {
    TOOL_CALLS_BLOCK.replace_all(text, "").trim().to_string()
}
