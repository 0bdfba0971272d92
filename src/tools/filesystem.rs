//! Filesystem tools for TaskClaw
//!
//! Paths are resolved relative to the context workspace; absolute paths and
//! parent-directory components are refused.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Result, TaskClawError};
use crate::utils::string::preview;

use super::{Tool, ToolContext, ToolOutput};

/// Largest file `read` returns in full, in bytes.
const MAX_READ_BYTES: usize = 256 * 1024;

/// Required string argument `key`.
fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| TaskClawError::Tool(format!("Missing '{}' argument", key)))
}

/// Resolve a model-supplied path inside the workspace.
fn resolve_path(path: &str, ctx: &ToolContext) -> Result<PathBuf> {
    let workspace = ctx.workspace.as_ref().ok_or_else(|| {
        TaskClawError::Tool("Workspace not configured; filesystem tools are disabled".into())
    })?;

    let requested = Path::new(path);
    let escapes = requested
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(TaskClawError::Tool(format!(
            "Path '{}' must be relative to the workspace without '..'",
            path
        )));
    }

    Ok(workspace.join(requested))
}

/// Tool for reading file contents from the workspace.
///
/// # Parameters
/// - `path`: workspace-relative path (required)
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read the text contents of a file in the workspace"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Workspace-relative path of the file to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let path = str_arg(&args, "path")?;
        let full_path = resolve_path(path, ctx)?;
        let content = match tokio::fs::read_to_string(&full_path).await {
            Ok(c) => c,
            Err(e) => {
                return Ok(ToolOutput::error(format!(
                    "Failed to read file '{}': {}",
                    path, e
                )))
            }
        };

        if content.len() > MAX_READ_BYTES {
            let mut end = MAX_READ_BYTES;
            while !content.is_char_boundary(end) {
                end -= 1;
            }
            return Ok(ToolOutput::text(format!(
                "{}\n...[truncated, {} bytes total]",
                &content[..end],
                content.len()
            )));
        }
        Ok(ToolOutput::text(content))
    }
}

/// Tool for writing a file in the workspace, creating parent directories.
///
/// # Parameters
/// - `path`: workspace-relative path (required)
/// - `content`: full new contents (required)
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Write text to a file in the workspace, replacing it if it exists"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Workspace-relative path of the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Text to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let path = str_arg(&args, "path")?;
        let content = str_arg(&args, "content")?;
        let full_path = resolve_path(path, ctx)?;

        if let Some(parent) = full_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(ToolOutput::error(format!(
                    "Failed to create directories for '{}': {}",
                    path, e
                )));
            }
        }
        if let Err(e) = tokio::fs::write(&full_path, content).await {
            return Ok(ToolOutput::error(format!(
                "Failed to write file '{}': {}",
                path, e
            )));
        }

        Ok(ToolOutput::text(format!(
            "Wrote {} bytes to {}",
            content.len(),
            path
        )))
    }
}

/// Tool for replacing text inside a workspace file.
///
/// Every occurrence of `old_text` is replaced; a file without it is left
/// untouched and the call fails.
pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Replace exact text in a workspace file"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Workspace-relative path of the file to edit"
                },
                "old_text": {
                    "type": "string",
                    "description": "Exact text to find"
                },
                "new_text": {
                    "type": "string",
                    "description": "Replacement text"
                }
            },
            "required": ["path", "old_text", "new_text"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let path = str_arg(&args, "path")?;
        let old_text = str_arg(&args, "old_text")?;
        let new_text = str_arg(&args, "new_text")?;
        if old_text.is_empty() {
            return Err(TaskClawError::Tool("'old_text' must not be empty".into()));
        }
        let full_path = resolve_path(path, ctx)?;

        let content = match tokio::fs::read_to_string(&full_path).await {
            Ok(c) => c,
            Err(e) => {
                return Ok(ToolOutput::error(format!(
                    "Failed to read file '{}': {}",
                    path, e
                )))
            }
        };

        let replacements = content.matches(old_text).count();
        if replacements == 0 {
            return Ok(ToolOutput::error(format!(
                "Text '{}' not found in '{}'",
                preview(old_text, 50),
                path
            )));
        }

        let updated = content.replace(old_text, new_text);
        if let Err(e) = tokio::fs::write(&full_path, updated).await {
            return Ok(ToolOutput::error(format!(
                "Failed to write file '{}': {}",
                path, e
            )));
        }

        Ok(ToolOutput::text(format!(
            "Replaced {} occurrence(s) in {}",
            replacements, path
        )))
    }
}
