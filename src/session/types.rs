//! Session types for TaskClaw
//!
//! This module defines the core types for session and conversation management,
//! including messages, roles, tool calls and tool results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A conversation session containing messages and metadata.
///
/// Sessions are addressed by a routing `key` and carry an opaque `id`.
/// Callers never mutate a stored session directly; all changes go through
/// [`SessionStore`](crate::session::SessionStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque identifier, unique per created session
    pub id: String,
    /// Routing handle (e.g., "cli:default")
    pub key: String,
    /// Ordered list of messages in this conversation
    pub messages: Vec<Message>,
    /// When this session was created
    pub created_at: DateTime<Utc>,
    /// When this session was last modified
    pub updated_at: DateTime<Utc>,
    /// Open metadata map
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Session {
    /// Create a new empty session with the given key and metadata.
    ///
    /// # Example
    /// ```
    /// use taskclaw::session::Session;
    ///
    /// let session = Session::new("cli:default", Default::default());
    /// assert!(session.messages.is_empty());
    /// assert_eq!(session.key, "cli:default");
    /// ```
    pub fn new(key: &str, metadata: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key: key.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata,
        }
    }

    /// Get the number of messages in this session.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Check if this session is empty (no messages).
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Get the last message in this session, if any.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Get messages by role.
    pub fn messages_by_role(&self, role: Role) -> Vec<&Message> {
        self.messages.iter().filter(|m| m.role == role).collect()
    }
}

/// A single message in a conversation.
///
/// Messages are immutable once appended. Insertion order is causal order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender
    pub role: Role,
    /// The text content of the message
    pub content: String,
    /// When the message was created
    pub created_at: DateTime<Utc>,
    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Tool results carried by a tool message (if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolResult>>,
    /// Image references (URLs or base64 payloads)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl Message {
    fn with_role(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            created_at: Utc::now(),
            tool_calls: None,
            tool_results: None,
            images: None,
        }
    }

    /// Create a new user message.
    ///
    /// # Example
    /// ```
    /// use taskclaw::session::{Message, Role};
    ///
    /// let msg = Message::user("Hello, assistant!");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: &str) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: &str) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    ///
    /// System messages hold prompts, the tool catalogue and compaction
    /// summaries.
    pub fn system(content: &str) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create an assistant message that requested tool calls.
    ///
    /// The raw calls are kept on the message for audit.
    ///
    /// # Example
    /// ```
    /// use taskclaw::session::{Message, ToolCall};
    /// use serde_json::json;
    ///
    /// let call = ToolCall::new("call_1", "read", json!({"path": "a.txt"}));
    /// let msg = Message::assistant_with_tools("Reading the file.", vec![call]);
    /// assert!(msg.has_tool_calls());
    /// ```
    pub fn assistant_with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, content);
        msg.tool_calls = Some(tool_calls);
        msg
    }

    /// Create a tool message carrying one result.
    ///
    /// The content is the text the model sees: the output on success, the
    /// error on failure.
    pub fn tool_result(result: ToolResult) -> Self {
        let mut msg = Self::with_role(Role::Tool, &result.render());
        msg.tool_results = Some(vec![result]);
        msg
    }

    /// Attach image references to this message.
    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = if images.is_empty() { None } else { Some(images) };
        self
    }

    /// Check if this message requested tool calls.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Check if this message is a tool result.
    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool
    }

    /// Number of tool calls plus tool results attached to this message.
    pub fn tool_item_count(&self) -> usize {
        self.tool_calls.as_ref().map_or(0, Vec::len)
            + self.tool_results.as_ref().map_or(0, Vec::len)
    }

    /// Number of attached images.
    pub fn image_count(&self) -> usize {
        self.images.as_ref().map_or(0, Vec::len)
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message from the user
    User,
    /// Message from the AI assistant
    Assistant,
    /// System prompt, tool catalogue or summary
    System,
    /// Result from a tool execution
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier unique within the turn
    pub id: String,
    /// Name of the tool to call
    pub name: String,
    /// Arguments as sent by the model. Normally an object; a string holds a
    /// JSON payload that still has to be decoded.
    pub arguments: Value,
}

impl ToolCall {
    /// Create a new tool call.
    pub fn new(id: &str, name: &str, arguments: Value) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    /// Resolve the arguments into a JSON object.
    ///
    /// String payloads are decoded; the decoder's message is returned when
    /// they are not valid JSON objects.
    ///
    /// # Example
    /// ```
    /// use taskclaw::session::ToolCall;
    /// use serde_json::json;
    ///
    /// let call = ToolCall::new("c1", "read", json!(r#"{"path":"a.txt"}"#));
    /// assert_eq!(call.parse_arguments().unwrap()["path"], "a.txt");
    ///
    /// let bad = ToolCall::new("c2", "read", json!("{path: a.txt"));
    /// assert!(bad.parse_arguments().is_err());
    /// ```
    pub fn parse_arguments(&self) -> std::result::Result<Value, String> {
        match &self.arguments {
            Value::Object(_) => Ok(self.arguments.clone()),
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(v @ Value::Object(_)) => Ok(v),
                Ok(other) => Err(format!(
                    "arguments must be a JSON object, got {}",
                    json_kind(&other)
                )),
                Err(e) => Err(e.to_string()),
            },
            other => Err(format!(
                "arguments must be a JSON object, got {}",
                json_kind(other)
            )),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The outcome of one tool call. Always populated, even on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The [`ToolCall::id`] this result answers
    pub call_id: String,
    /// Tool name
    pub name: String,
    /// Structured or text output
    pub output: Value,
    /// Whether the tool succeeded
    pub success: bool,
    /// Failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// A successful result.
    pub fn ok(call_id: &str, name: &str, output: Value) -> Self {
        Self {
            call_id: call_id.to_string(),
            name: name.to_string(),
            output,
            success: true,
            error: None,
        }
    }

    /// A failed result with a human-readable reason.
    pub fn failed(call_id: &str, name: &str, error: &str) -> Self {
        Self {
            call_id: call_id.to_string(),
            name: name.to_string(),
            output: Value::Null,
            success: false,
            error: Some(error.to_string()),
        }
    }

    /// Text shown to the model for this result.
    pub fn render(&self) -> String {
        if self.success {
            let output = match &self.output {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            format!("[Tool Result] {}: {}", self.name, output)
        } else {
            format!(
                "[Tool Error] {}: {}",
                self.name,
                self.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}
