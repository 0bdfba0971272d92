//! Tools module for TaskClaw
//!
//! Tools are external capabilities the model can request. Each implements
//! the [`Tool`] trait and is registered into an agent's [`ToolRegistry`].
//!
//! # Built-in Tools
//!
//! - `EchoTool`: echoes its `message` argument, handy for wiring checks
//! - `ReadFileTool`: reads a workspace-relative text file
//! - `WriteFileTool`: writes a file, creating parent directories
//! - `EditFileTool`: replaces exact text inside a file
//!
//! Which of these the model sees is decided by the registry's
//! [`ToolsConfig`](crate::config::ToolsConfig) policy.
//!
//! # Example
//!
//! ```rust
//! use taskclaw::tools::{EchoTool, ToolContext, ToolRegistry};
//! use taskclaw::tools::filesystem::ReadFileTool;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let mut registry = ToolRegistry::new();
//! registry.register(Box::new(EchoTool));
//! registry.register(Box::new(ReadFileTool));
//!
//! let output = registry
//!     .execute("echo", json!({"message": "Hello!"}), &ToolContext::default())
//!     .await
//!     .unwrap();
//! assert_eq!(output.output, json!("Hello!"));
//! assert_eq!(registry.definitions().len(), 2);
//! # });
//! ```

pub mod filesystem;
mod registry;
mod types;

pub use registry::ToolRegistry;
pub use types::{Tool, ToolContext, ToolDefinition, ToolOutput};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A simple echo tool.
///
/// Echoes back the `message` argument.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes back the provided message"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to echo"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)");
        Ok(ToolOutput::text(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_echo_tool() {
        let output = EchoTool
            .execute(json!({"message": "hi"}), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(output.output, json!("hi"));
    }

    #[tokio::test]
    async fn test_echo_tool_non_string_message() {
        let output = EchoTool
            .execute(json!({"message": 42}), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(output.output, json!("(no message)"));
    }

    #[test]
    fn test_echo_definition() {
        let def = EchoTool.definition();
        assert_eq!(def.name, "echo");
        assert_eq!(def.parameters["required"][0], "message");
    }
}
