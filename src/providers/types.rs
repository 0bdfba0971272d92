//! Provider types for TaskClaw
//!
//! This module defines the `LLMProvider` trait consumed by the agent loop
//! and compactor, along with request, response and stream chunk types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::session::Message;

/// Channel capacity for streamed responses.
pub const STREAM_CHANNEL_CAPACITY: usize = 32;

/// A completion request.
///
/// Use the builder methods to fill in optional fields.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// The conversation, in order
    pub messages: Vec<Message>,
    /// Optional system prompt sent ahead of the messages
    pub system_prompt: Option<String>,
    /// Model override (provider default if None)
    pub model: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Create a request for `messages` with every option unset.
    ///
    /// # Example
    /// ```
    /// use taskclaw::providers::CompletionRequest;
    /// use taskclaw::session::Message;
    ///
    /// let request = CompletionRequest::new(vec![Message::user("2+2?")])
    ///     .with_model("llama3.1")
    ///     .with_max_tokens(64);
    /// assert_eq!(request.model.as_deref(), Some("llama3.1"));
    /// assert_eq!(request.max_tokens, Some(64));
    /// ```
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// Set the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,
    /// Tokens in the completion
    pub completion_tokens: u32,
    /// Sum of both
    pub total_tokens: u32,
}

impl Usage {
    /// Create usage from prompt and completion counts.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// A completion response: raw model text plus optional usage.
///
/// Tool calls are not a provider concern; the agent parses them out of
/// `content`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionResponse {
    /// Raw model output
    pub content: String,
    /// Token usage, when reported
    pub usage: Option<Usage>,
}

impl CompletionResponse {
    /// A text-only response.
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            usage: None,
        }
    }

    /// Attach usage information.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// One piece of a streamed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    /// Text appended since the previous chunk
    pub delta: String,
    /// Set on the final chunk
    pub done: bool,
}

impl StreamChunk {
    /// A content chunk.
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: text.into(),
            done: false,
        }
    }

    /// The terminating chunk.
    pub fn done() -> Self {
        Self {
            delta: String::new(),
            done: true,
        }
    }
}

/// Receiving half of a streamed response.
pub type ChunkReceiver = mpsc::Receiver<Result<StreamChunk>>;

/// Trait for LLM providers.
///
/// Implement this trait to add support for a new backend. A provider must
/// fail with a provider error on any non-2xx or transport failure; the loop
/// treats that as fatal for the current run and never retries.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Run a completion and return the full response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Run a completion as a stream of chunks ending with `done`.
    ///
    /// The default implementation calls [`complete`](Self::complete) and
    /// replays the result as a single delta.
    async fn stream(&self, request: CompletionRequest) -> Result<ChunkReceiver> {
        let response = self.complete(request).await?;
        let (tx, rx) = mpsc::channel(2);
        // Capacity covers both sends, so neither can fail while rx is alive.
        let _ = tx.send(Ok(StreamChunk::delta(response.content))).await;
        let _ = tx.send(Ok(StreamChunk::done())).await;
        Ok(rx)
    }

    /// The model used when a request leaves `model` unset.
    fn default_model(&self) -> &str;

    /// Provider name for logs (e.g., "openai").
    fn name(&self) -> &str;
}

/// Drain a chunk stream into a complete response.
///
/// Stops at the first `done` chunk. A stream that closes without `done` is
/// accepted with whatever arrived; an error item aborts.
pub async fn collect_stream(mut rx: ChunkReceiver) -> Result<CompletionResponse> {
    let mut content = String::new();
    while let Some(item) = rx.recv().await {
        let chunk = item?;
        content.push_str(&chunk.delta);
        if chunk.done {
            break;
        }
    }
    Ok(CompletionResponse::text(&content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskClawError;

    struct Fixed;

    #[async_trait]
    impl LLMProvider for Fixed {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
            Ok(CompletionResponse::text(&format!(
                "{} messages",
                request.messages.len()
            )))
        }
        fn default_model(&self) -> &str {
            "fixed"
        }
        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn test_usage_total() {
        let usage = Usage::new(10, 5);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn test_request_builder() {
        let req = CompletionRequest::new(vec![])
            .with_system_prompt("be brief")
            .with_temperature(0.2);
        assert_eq!(req.system_prompt.as_deref(), Some("be brief"));
        assert_eq!(req.temperature, Some(0.2));
        assert!(req.model.is_none());
    }

    #[tokio::test]
    async fn test_default_stream_replays_complete() {
        let rx = Fixed
            .stream(CompletionRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap();
        let response = collect_stream(rx).await.unwrap();
        assert_eq!(response.content, "1 messages");
    }

    #[tokio::test]
    async fn test_collect_stream_stops_at_done() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok(StreamChunk::delta("Hel"))).await.unwrap();
        tx.send(Ok(StreamChunk::delta("lo"))).await.unwrap();
        tx.send(Ok(StreamChunk::done())).await.unwrap();
        tx.send(Ok(StreamChunk::delta("ignored"))).await.unwrap();
        drop(tx);

        assert_eq!(collect_stream(rx).await.unwrap().content, "Hello");
    }

    #[tokio::test]
    async fn test_collect_stream_propagates_error() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok(StreamChunk::delta("partial"))).await.unwrap();
        tx.send(Err(TaskClawError::Provider("cut off".into())))
            .await
            .unwrap();
        drop(tx);

        assert!(collect_stream(rx).await.is_err());
    }
}
