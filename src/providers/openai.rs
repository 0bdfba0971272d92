//! OpenAI-compatible Provider Implementation
//!
//! Implements `LLMProvider` against any Chat Completions endpoint: OpenAI
//! itself, Ollama's `/v1` surface, vLLM, llama.cpp server and similar.
//!
//! Tool results are sent with role `user`. Tool calls travel inside the
//! assistant's text rather than as native `tool_calls`, so there is no
//! call id for a `tool` role message to reference, and several local
//! servers reject that role outright.
//!
//! # Example
//!
//! ```rust,ignore
//! use taskclaw::providers::{openai::OpenAIProvider, CompletionRequest, LLMProvider};
//! use taskclaw::session::Message;
//!
//! async fn example() {
//!     let provider = OpenAIProvider::with_base_url(None, "http://localhost:11434/v1", "llama3.1");
//!     let response = provider
//!         .complete(CompletionRequest::new(vec![Message::user("Hello!")]))
//!         .await
//!         .unwrap();
//!     println!("{}", response.content);
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Result, TaskClawError};
use crate::session::{Message, Role};

use super::{
    parse_provider_error, ChunkReceiver, CompletionRequest, CompletionResponse, LLMProvider,
    StreamChunk, Usage, STREAM_CHANNEL_CAPACITY,
};

/// The OpenAI API endpoint URL.
const OPENAI_API_URL: &str = "https://api.openai.com/v1";

// ============================================================================
// Wire Types
// ============================================================================

/// Chat Completions request body.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

/// A message in the wire format. `content` is a string, or an array of
/// parts when images are attached.
#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// One SSE `data:` payload of a streamed response.
#[derive(Debug, Deserialize)]
struct StreamPayload {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

// ============================================================================
// Provider
// ============================================================================

/// OpenAI-compatible LLM provider.
pub struct OpenAIProvider {
    /// Bearer token, if the endpoint needs one
    api_key: Option<String>,
    /// API base URL without trailing slash
    api_base: String,
    /// Model used when the request does not name one
    default_model: String,
    /// HTTP client for making requests
    client: Client,
}

impl OpenAIProvider {
    /// Create a provider for the public OpenAI endpoint.
    pub fn new(api_key: &str, default_model: &str) -> Self {
        Self::with_base_url(Some(api_key), OPENAI_API_URL, default_model)
    }

    /// Create a provider for an OpenAI-compatible endpoint.
    ///
    /// # Example
    /// ```
    /// use taskclaw::providers::openai::OpenAIProvider;
    /// use taskclaw::providers::LLMProvider;
    ///
    /// let provider = OpenAIProvider::with_base_url(None, "http://localhost:11434/v1/", "llama3.1");
    /// assert_eq!(provider.default_model(), "llama3.1");
    /// ```
    pub fn with_base_url(api_key: Option<&str>, api_base: &str, default_model: &str) -> Self {
        Self::with_client(api_key, api_base, default_model, Client::new())
    }

    /// Create a provider with a custom HTTP client (timeouts, proxies).
    pub fn with_client(
        api_key: Option<&str>,
        api_base: &str,
        default_model: &str,
        client: Client,
    ) -> Self {
        Self {
            api_key: api_key.map(str::to_string),
            api_base: api_base.trim_end_matches('/').to_string(),
            default_model: default_model.to_string(),
            client,
        }
    }

    /// Build a provider from the `provider` and `agent` config sections.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.provider.timeout_secs))
            .build()?;
        Ok(Self::with_client(
            config.provider.api_key.as_deref(),
            &config.provider.api_base,
            &config.agent.model,
            client,
        ))
    }

    fn build_request(&self, request: CompletionRequest, stream: bool) -> ChatRequest {
        ChatRequest {
            model: request
                .model
                .unwrap_or_else(|| self.default_model.clone()),
            messages: convert_messages(request.system_prompt.as_deref(), request.messages),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream,
        }
    }

    async fn send(&self, body: &ChatRequest) -> Result<reqwest::Response> {
        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(ref key) = self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TaskClawError::from(crate::error::ProviderError::Timeout(e.to_string()))
            } else {
                TaskClawError::Provider(format!("request failed: {}", e))
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(parse_provider_error(status, &detail).into());
        }
        Ok(response)
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Map a message role to the wire role.
fn wire_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User | Role::Tool => "user",
        Role::Assistant => "assistant",
    }
}

/// Convert session messages to the wire format, system prompt first.
fn convert_messages(system_prompt: Option<&str>, messages: Vec<Message>) -> Vec<WireMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(prompt) = system_prompt {
        out.push(WireMessage {
            role: "system",
            content: Value::String(prompt.to_string()),
        });
    }
    for msg in messages {
        let content = match msg.images {
            Some(images) if !images.is_empty() => {
                let mut parts = vec![json!({"type": "text", "text": msg.content})];
                parts.extend(
                    images
                        .into_iter()
                        .map(|url| json!({"type": "image_url", "image_url": {"url": url}})),
                );
                Value::Array(parts)
            }
            _ => Value::String(msg.content),
        };
        out.push(WireMessage {
            role: wire_role(msg.role),
            content,
        });
    }
    out
}

fn convert_response(response: ChatResponse) -> CompletionResponse {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();
    let mut out = CompletionResponse::text(&content);
    if let Some(usage) = response.usage {
        out = out.with_usage(Usage::new(usage.prompt_tokens, usage.completion_tokens));
    }
    out
}

/// Decode one SSE line into a chunk.
///
/// Returns `None` for blank lines, comments and payloads without content.
fn parse_sse_line(line: &str) -> Option<StreamChunk> {
    let data = line
        .strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))?
        .trim();
    if data == "[DONE]" {
        return Some(StreamChunk::done());
    }
    let payload: StreamPayload = serde_json::from_str(data).ok()?;
    let choice = payload.choices.into_iter().next()?;
    match (choice.delta.content, choice.finish_reason) {
        (Some(text), _) if !text.is_empty() => Some(StreamChunk::delta(text)),
        (_, Some(_)) => Some(StreamChunk::done()),
        _ => None,
    }
}

// ============================================================================
// LLMProvider Implementation
// ============================================================================

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_request(request, false);
        debug!(model = %body.model, messages = body.messages.len(), "Chat completion request");

        let response = self.send(&body).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| TaskClawError::Provider(format!("Failed to parse response: {}", e)))?;

        info!(model = %body.model, "Chat completion received");
        Ok(convert_response(parsed))
    }

    async fn stream(&self, request: CompletionRequest) -> Result<ChunkReceiver> {
        let body = self.build_request(request, true);
        debug!(model = %body.model, "Streaming chat completion request");

        let response = self.send(&body).await?;
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let byte_stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut line_buffer = String::new();
            tokio::pin!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(TaskClawError::Provider(format!(
                                "Stream read error: {}",
                                e
                            ))))
                            .await;
                        return;
                    }
                };
                line_buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(newline_pos) = line_buffer.find('\n') {
                    let line: String = line_buffer.drain(..=newline_pos).collect();
                    let Some(chunk) = parse_sse_line(line.trim()) else {
                        continue;
                    };
                    let done = chunk.done;
                    if tx.send(Ok(chunk)).await.is_err() || done {
                        return;
                    }
                }
            }

            let _ = tx.send(Ok(StreamChunk::done())).await;
        });

        Ok(rx)
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ToolResult;

    #[test]
    fn test_provider_creation() {
        let provider = OpenAIProvider::new("test-key", "gpt-4o");
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.default_model(), "gpt-4o");
        assert_eq!(provider.api_base, "https://api.openai.com/v1");
    }

    #[test]
    fn test_base_url_trailing_slash_removed() {
        let provider = OpenAIProvider::with_base_url(None, "http://localhost:11434/v1/", "m");
        assert_eq!(provider.api_base, "http://localhost:11434/v1");
        assert!(provider.api_key.is_none());
    }

    #[test]
    fn test_from_config() {
        let provider = OpenAIProvider::from_config(&Config::default()).unwrap();
        assert_eq!(provider.default_model(), "llama3.1");
        assert_eq!(provider.api_base, "http://localhost:11434/v1");
    }

    #[test]
    fn test_convert_messages_roles() {
        let messages = vec![
            Message::system("catalogue"),
            Message::user("Hello"),
            Message::assistant("Hi"),
            Message::tool_result(ToolResult::ok("c1", "read", Value::String("x".into()))),
        ];
        let converted = convert_messages(Some("identity"), messages);

        let roles: Vec<&str> = converted.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "system", "user", "assistant", "user"]);
        assert_eq!(converted[0].content, json!("identity"));
        assert_eq!(converted[4].content, json!("[Tool Result] read: x"));
    }

    #[test]
    fn test_convert_messages_with_images() {
        let msg = Message::user("what is this?").with_images(vec!["https://x/cat.png".into()]);
        let converted = convert_messages(None, vec![msg]);
        let parts = converted[0].content.as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["image_url"]["url"], "https://x/cat.png");
    }

    #[test]
    fn test_build_request_uses_default_model() {
        let provider = OpenAIProvider::with_base_url(None, "http://h/v1", "llama3.1");
        let body = provider.build_request(CompletionRequest::new(vec![]), false);
        assert_eq!(body.model, "llama3.1");
        assert!(!body.stream);

        let body = provider.build_request(CompletionRequest::new(vec![]).with_model("qwen"), true);
        assert_eq!(body.model, "qwen");
        assert!(body.stream);
    }

    #[test]
    fn test_convert_response() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": "4"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 1}
        }))
        .unwrap();
        let converted = convert_response(response);
        assert_eq!(converted.content, "4");
        assert_eq!(converted.usage.unwrap().total_tokens, 11);
    }

    #[test]
    fn test_convert_response_without_choices() {
        let response: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert_eq!(convert_response(response).content, "");
    }

    #[test]
    fn test_parse_sse_lines() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#),
            Some(StreamChunk::delta("Hel"))
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#),
            Some(StreamChunk::done())
        );
        assert_eq!(parse_sse_line("data: [DONE]"), Some(StreamChunk::done()));
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(parse_sse_line("data: {broken"), None);
    }
}
