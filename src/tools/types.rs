//! Tool types for TaskClaw
//!
//! This module defines the `Tool` trait that all tools implement, the
//! `ToolContext` handed to every execution, and the `ToolOutput` a tool
//! reports back. Tools are opaque to the agent loop beyond this contract.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::error::Result;
use crate::session::ToolResult;

/// Catalogue entry describing a tool to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The name of the tool (must be unique)
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON-schema-like input description: `type: object`, named
    /// `properties` and a `required` list
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// What a tool reports after running.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Whether the tool succeeded
    pub success: bool,
    /// Structured or text output
    pub output: Value,
    /// Failure reason, shown to the model
    pub error: Option<String>,
}

impl ToolOutput {
    /// Successful structured output.
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    /// Successful text output.
    pub fn text(content: impl Into<String>) -> Self {
        Self::ok(Value::String(content.into()))
    }

    /// Failed output. The model sees the message and may retry.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(message.into()),
        }
    }

    /// Attach the call identity, producing the result stored in the session.
    pub fn into_result(self, call_id: &str, name: &str) -> ToolResult {
        ToolResult {
            call_id: call_id.to_string(),
            name: name.to_string(),
            output: self.output,
            success: self.success,
            error: self.error,
        }
    }
}

/// The contract every tool implements.
///
/// Tools are registered into a [`ToolRegistry`](super::ToolRegistry) owned
/// by one agent and may be called from many lanes at once, so
/// implementations must not keep per-call state on `self`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name used by the model.
    fn name(&self) -> &str;

    /// One-line description for the tool catalogue.
    fn description(&self) -> &str;

    /// Input schema (`type`, `properties`, `required`).
    fn parameters(&self) -> Value;

    /// Run the tool.
    ///
    /// Returning `Err` is equivalent to returning [`ToolOutput::error`]: the
    /// loop records a failed result either way.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput>;

    /// The catalogue entry for this tool.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters())
    }
}

/// Context handed to every tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Key of the session the call belongs to
    pub session_key: String,
    /// Read-only configuration handle
    pub config: Arc<Config>,
    /// Directory filesystem tools are confined to
    pub workspace: Option<PathBuf>,
}

impl ToolContext {
    /// Create a context for a session.
    pub fn new(session_key: &str, config: Arc<Config>) -> Self {
        Self {
            session_key: session_key.to_string(),
            config,
            workspace: None,
        }
    }

    /// Confine filesystem tools to `workspace`.
    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_output_constructors() {
        let ok = ToolOutput::text("done");
        assert!(ok.success);
        assert_eq!(ok.output, json!("done"));

        let err = ToolOutput::error("bad path");
        assert!(!err.success);
        assert_eq!(err.error.as_deref(), Some("bad path"));
    }

    #[test]
    fn test_into_result_carries_identity() {
        let result = ToolOutput::ok(json!({"n": 1})).into_result("call_1", "count");
        assert_eq!(result.call_id, "call_1");
        assert_eq!(result.name, "count");
        assert!(result.success);
    }

    #[test]
    fn test_tool_context_builder() {
        let ctx = ToolContext::new("cli:a", Arc::new(Config::default())).with_workspace("/tmp/ws");
        assert_eq!(ctx.session_key, "cli:a");
        assert_eq!(ctx.workspace, Some(PathBuf::from("/tmp/ws")));
        assert_eq!(ctx.config.agent.max_iterations, 20);
    }
}
