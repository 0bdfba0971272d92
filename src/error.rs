//! Error types for TaskClaw
//!
//! This module defines all error types used throughout the TaskClaw crate.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! Only provider failures and context overflow abort an agent run. Tool
//! failures are absorbed into the conversation as failed tool results, so
//! `ToolNotFound` and `Tool` mostly surface from direct registry calls.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured provider error classification.
///
/// Categorizes LLM provider HTTP failures so callers can build their own
/// retry policy without string matching. The agent loop itself never retries.
#[derive(Debug)]
pub enum ProviderError {
    /// 401: invalid API key or authentication failure
    Auth(String),
    /// 429: rate limit or quota exceeded
    RateLimit(String),
    /// 500-599: server-side errors
    ServerError(String),
    /// 400: bad request, invalid JSON, malformed parameters
    InvalidRequest(String),
    /// 404: model not found or endpoint not available
    ModelNotFound(String),
    /// Connection or read timeout
    Timeout(String),
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            ProviderError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Returns `true` if a caller-level retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimit(_) | ProviderError::ServerError(_) | ProviderError::Timeout(_)
        )
    }

    /// Returns the HTTP status code associated with this error, if applicable.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Auth(_) => Some(401),
            ProviderError::RateLimit(_) => Some(429),
            ProviderError::ServerError(_) => Some(500),
            ProviderError::InvalidRequest(_) => Some(400),
            ProviderError::ModelNotFound(_) => Some(404),
            ProviderError::Timeout(_) => None,
            ProviderError::Unknown(_) => None,
        }
    }
}

impl From<ProviderError> for TaskClawError {
    fn from(err: ProviderError) -> Self {
        TaskClawError::ProviderTyped(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for TaskClaw operations.
#[derive(Error, Debug)]
pub enum TaskClawError {
    /// Configuration errors (invalid values, unreadable config file, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider errors (transport failures, unparseable responses, etc.)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Structured provider error carrying the HTTP classification.
    #[error("Provider error: {0}")]
    ProviderTyped(ProviderError),

    /// A session key was referenced outside the create-or-get path.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Compaction could not bring the session under the context limit.
    #[error("Context overflow ({estimated}/{limit} tokens): reduce input or enable compaction")]
    ContextOverflow { estimated: usize, limit: usize },

    /// The model requested a tool that is not registered.
    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    /// Tool execution errors (invalid parameters, execution failures, etc.)
    #[error("Tool error: {0}")]
    Tool(String),

    /// The agent loop hit its iteration ceiling.
    #[error("Max iterations ({0}) exceeded")]
    MaxIterationsExceeded(u32),

    /// A queued task was cleared, dropped or panicked before producing a value.
    #[error("Queue error: {0}")]
    Queue(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl TaskClawError {
    /// Returns `true` for errors that end an agent run outright.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(
            self,
            TaskClawError::Provider(_)
                | TaskClawError::ProviderTyped(_)
                | TaskClawError::Http(_)
                | TaskClawError::ContextOverflow { .. }
        )
    }
}

/// A specialized `Result` type for TaskClaw operations.
pub type Result<T> = std::result::Result<T, TaskClawError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TaskClawError::Config("context_limit must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: context_limit must be positive"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TaskClawError = io_err.into();
        assert!(matches!(err, TaskClawError::Io(_)));
    }

    #[test]
    fn test_context_overflow_display_mentions_remedy() {
        let err = TaskClawError::ContextOverflow {
            estimated: 2000,
            limit: 1000,
        };
        let text = err.to_string();
        assert!(text.contains("2000/1000"));
        assert!(text.contains("enable compaction"));
    }

    #[test]
    fn test_session_not_found_display() {
        let err = TaskClawError::SessionNotFound("cli:abc".into());
        assert_eq!(err.to_string(), "Session not found: cli:abc");
    }

    #[test]
    fn test_unknown_tool_display() {
        let err = TaskClawError::ToolNotFound("nope".into());
        assert_eq!(err.to_string(), "Unknown tool: nope");
    }

    #[test]
    fn test_fatal_for_run() {
        assert!(TaskClawError::Provider("down".into()).is_fatal_for_run());
        assert!(TaskClawError::ProviderTyped(ProviderError::Auth("x".into())).is_fatal_for_run());
        assert!(TaskClawError::ContextOverflow {
            estimated: 2,
            limit: 1
        }
        .is_fatal_for_run());
        assert!(!TaskClawError::Tool("boom".into()).is_fatal_for_run());
        assert!(!TaskClawError::ToolNotFound("nope".into()).is_fatal_for_run());
        assert!(!TaskClawError::MaxIterationsExceeded(20).is_fatal_for_run());
    }

    #[test]
    fn test_provider_error_classification_table() {
        let cases = [
            (ProviderError::Auth("bad key".into()), Some(401), false, "Authentication"),
            (ProviderError::RateLimit("slow down".into()), Some(429), true, "Rate limit"),
            (ProviderError::ServerError("down".into()), Some(500), true, "Server error"),
            (ProviderError::InvalidRequest("bad".into()), Some(400), false, "Invalid request"),
            (ProviderError::ModelNotFound("llama9".into()), Some(404), false, "Model not found"),
            (ProviderError::Timeout("30s".into()), None, true, "Timeout"),
            (ProviderError::Unknown("?".into()), None, false, "Unknown provider"),
        ];
        for (err, status, retryable, prefix) in cases {
            assert_eq!(err.status_code(), status, "{err}");
            assert_eq!(err.is_retryable(), retryable, "{err}");
            assert!(err.to_string().starts_with(prefix), "{err}");
        }
    }

    #[test]
    fn test_provider_error_into_crate_error() {
        let err: TaskClawError = ProviderError::ServerError("boom".into()).into();
        assert!(matches!(err, TaskClawError::ProviderTyped(_)));
        assert_eq!(err.to_string(), "Provider error: Server error: boom");
    }
}
