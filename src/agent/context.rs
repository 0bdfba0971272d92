//! Prompt construction for agent runs
//!
//! This module provides the `ContextBuilder`, which renders the identity
//! prompt sent with every provider call and the tool catalogue that seeds a
//! new session. The catalogue is the only place tool metadata enters the
//! conversation.

use crate::config::ThinkLevel;
use crate::session::Message;
use crate::tools::ToolDefinition;

/// Default identity prompt for TaskClaw agents
const DEFAULT_SYSTEM_PROMPT: &str = r#"You are TaskClaw, a task-focused assistant.

Work through the user's request step by step. Use the available tools when they help, and answer directly when they don't.

Be concise. When the task is done, reply with the final answer and no tool calls."#;

/// Appended to the identity prompt for `ThinkLevel::On`.
const REASONING_INSTRUCTION: &str =
    "Before answering, reason through the problem step by step, then state the conclusion clearly.";

/// How the model must format tool requests.
const TOOL_CALL_FORMAT: &str = r#"## Calling tools

To call tools, include exactly one block in your reply:

<tool_calls>[{"name": "<tool name>", "arguments": {<arguments object>}}]</tool_calls>

List several calls in the array to run them in order. Results come back as messages starting with [Tool Result] or [Tool Error]. When you have the final answer, reply without a <tool_calls> block."#;

/// Builder for the prompt material of an agent run.
///
/// # Example
///
/// ```rust
/// use taskclaw::agent::ContextBuilder;
/// use taskclaw::config::ThinkLevel;
///
/// let builder = ContextBuilder::new().with_workspace("/srv/work");
/// assert!(builder.system_prompt(ThinkLevel::Off).contains("TaskClaw"));
///
/// let seed = builder.build_seed_message(&[]);
/// assert!(seed.content.contains("No tools are available"));
/// ```
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    /// Identity prompt sent as the provider's system prompt
    system_prompt: String,
    /// Workspace path shown in the catalogue
    workspace: Option<String>,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextBuilder {
    /// Create a builder with the default identity prompt.
    pub fn new() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            workspace: None,
        }
    }

    /// Replace the identity prompt.
    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    /// Mention the workspace directory in the catalogue.
    pub fn with_workspace(mut self, workspace: &str) -> Self {
        self.workspace = Some(workspace.to_string());
        self
    }

    /// The system prompt for a provider call at the given think level.
    pub fn system_prompt(&self, think_level: ThinkLevel) -> String {
        match think_level {
            ThinkLevel::On => format!("{}\n\n{}", self.system_prompt, REASONING_INSTRUCTION),
            ThinkLevel::Off | ThinkLevel::Stream => self.system_prompt.clone(),
        }
    }

    /// Render the tool catalogue: name, description and parameter schema of
    /// each tool, followed by the call format.
    pub fn render_catalogue(&self, tools: &[ToolDefinition]) -> String {
        let mut content = String::from("## Available Tools\n\n");
        if tools.is_empty() {
            content.push_str("No tools are available. Answer directly.");
        } else {
            for tool in tools {
                content.push_str(&format!(
                    "### {}\n{}\nParameters: {}\n\n",
                    tool.name, tool.description, tool.parameters
                ));
            }
            content.push_str(TOOL_CALL_FORMAT);
        }

        if let Some(ref workspace) = self.workspace {
            content.push_str(&format!("\n\n## Runtime Context\n\n- Workspace: {}", workspace));
        }
        content
    }

    /// The System message that seeds a new session.
    pub fn build_seed_message(&self, tools: &[ToolDefinition]) -> Message {
        Message::system(&self.render_catalogue(tools))
    }
}
