//! Providers module - LLM backends
//!
//! This module defines the `LLMProvider` trait and the request/response types
//! the agent loop and compactor speak. The crate ships one implementation,
//! [`OpenAIProvider`], which covers any Chat Completions compatible server.
//!
//! # Example
//!
//! ```rust,ignore
//! use taskclaw::providers::{CompletionRequest, LLMProvider, OpenAIProvider};
//! use taskclaw::session::Message;
//!
//! async fn example() {
//!     let provider = OpenAIProvider::with_base_url(None, "http://localhost:11434/v1", "llama3.1");
//!     let request = CompletionRequest::new(vec![Message::user("Hello!")]).with_max_tokens(256);
//!
//!     let response = provider.complete(request).await.unwrap();
//!     println!("Response: {}", response.content);
//! }
//! ```

pub mod openai;
mod types;

use crate::error::ProviderError;

pub use openai::OpenAIProvider;
pub use types::{
    collect_stream, ChunkReceiver, CompletionRequest, CompletionResponse, LLMProvider,
    StreamChunk, Usage, STREAM_CHANNEL_CAPACITY,
};

/// Parse an HTTP status code and response body into a structured [`ProviderError`].
pub fn parse_provider_error(status: u16, body: &str) -> ProviderError {
    match status {
        401 => ProviderError::Auth(body.to_string()),
        404 => ProviderError::ModelNotFound(body.to_string()),
        429 => ProviderError::RateLimit(body.to_string()),
        400 => ProviderError::InvalidRequest(body.to_string()),
        500..=599 => ProviderError::ServerError(body.to_string()),
        _ => ProviderError::Unknown(format!("HTTP {}: {}", status, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_map_to_classes() {
        let classify = |status| parse_provider_error(status, "body");
        assert!(matches!(classify(400), ProviderError::InvalidRequest(_)));
        assert!(matches!(classify(401), ProviderError::Auth(_)));
        assert!(matches!(classify(404), ProviderError::ModelNotFound(_)));
        assert!(matches!(classify(429), ProviderError::RateLimit(_)));
        for status in [500, 502, 503, 599] {
            assert!(matches!(classify(status), ProviderError::ServerError(_)));
        }
    }

    #[test]
    fn test_unmapped_status_keeps_code_in_message() {
        let err = parse_provider_error(418, "teapot");
        assert!(matches!(err, ProviderError::Unknown(_)));
        assert_eq!(err.to_string(), "Unknown provider error: HTTP 418: teapot");
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_body_is_preserved_for_callers() {
        match parse_provider_error(404, "model 'llama9' not found") {
            ProviderError::ModelNotFound(body) => assert!(body.contains("llama9")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
