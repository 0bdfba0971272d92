//! Configuration type definitions for TaskClaw
//!
//! All types implement serde traits for JSON serialization and have sensible
//! defaults, so a partial config file only overrides what it names.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration struct for TaskClaw
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Agent loop configuration (model, iterations, sampling)
    pub agent: AgentConfig,
    /// Token accounting configuration
    pub context: ContextConfig,
    /// Context compaction configuration
    pub compaction: CompactionConfig,
    /// Per-session queue configuration
    pub queue: QueueConfig,
    /// Session storage configuration
    pub session: SessionConfig,
    /// LLM provider endpoint configuration
    pub provider: ProviderConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Tool exposure policy
    pub tools: ToolsConfig,
}

// ============================================================================
// Agent Configuration
// ============================================================================

/// How the agent asks the provider to think.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkLevel {
    /// Plain completion
    #[default]
    Off,
    /// Completion with an explicit reasoning instruction
    On,
    /// Streamed completion, assembled from deltas
    Stream,
}

impl std::str::FromStr for ThinkLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(ThinkLevel::Off),
            "on" => Ok(ThinkLevel::On),
            "stream" => Ok(ThinkLevel::Stream),
            other => Err(format!("unknown think level '{}'", other)),
        }
    }
}

/// Agent loop defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model identifier passed to the provider
    pub model: String,
    /// Maximum provider calls per run
    pub max_iterations: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens to generate per provider call
    pub max_tokens: u32,
    /// Optional identity prompt sent as the provider's system prompt
    pub system_prompt: Option<String>,
    /// Default think level for runs that don't specify one
    pub think_level: ThinkLevel,
    /// Number of recent user turns sent to the provider (0 = all)
    pub history_turn_limit: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "llama3.1".to_string(),
            max_iterations: 20,
            temperature: 0.7,
            max_tokens: 2048,
            system_prompt: None,
            think_level: ThinkLevel::Off,
            history_turn_limit: 0,
        }
    }
}

// ============================================================================
// Context Configuration
// ============================================================================

/// Token accounting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Context window size in tokens
    pub context_limit: usize,
    /// Usage percentage above which a warning is raised
    pub warn_percent: f64,
    /// Flat token surcharge per tool call or tool result
    pub tool_overhead_tokens: usize,
    /// Character cost charged per attached image
    pub image_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            context_limit: 32_768,
            warn_percent: 80.0,
            tool_overhead_tokens: 100,
            image_chars: 4000,
        }
    }
}

// ============================================================================
// Compaction Configuration
// ============================================================================

/// Context compaction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Whether overflowing sessions are compacted before the provider call.
    pub enabled: bool,
    /// Fraction (0.0-1.0] of context_limit used as the compaction target.
    pub target_ratio: f64,
    /// Minimum number of recent non-system messages kept verbatim.
    pub recent_turns_to_keep: usize,
    /// Upper bound on summary length requested from the provider.
    pub summary_max_tokens: u32,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_ratio: 0.6,
            recent_turns_to_keep: 20,
            summary_max_tokens: 512,
        }
    }
}

impl CompactionConfig {
    /// Token budget that compaction aims for, given the window size.
    pub fn target_budget(&self, context_limit: usize) -> usize {
        (context_limit as f64 * self.target_ratio).floor() as usize
    }
}

// ============================================================================
// Queue Configuration
// ============================================================================

/// Per-session queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Concurrent tasks per lane
    pub max_concurrent: usize,
    /// Wait time after which the wait callback fires
    pub warn_after_ms: u64,
    /// Optional cap on concurrent tasks across all lanes
    pub global_max_concurrent: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            warn_after_ms: 2000,
            global_max_concurrent: None,
        }
    }
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Where sessions live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStorage {
    /// Process memory only
    Memory,
    /// One JSONL file per session
    #[default]
    Jsonl,
}

/// Session storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Storage medium
    pub storage: SessionStorage,
    /// Directory for JSONL files (defaults to ~/.taskclaw/sessions)
    pub dir: Option<PathBuf>,
    /// Cached sessions idle longer than this are evicted from memory
    pub max_idle_secs: Option<u64>,
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// OpenAI-compatible endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the chat completions API
    pub api_base: String,
    /// Bearer token, if the endpoint needs one
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:11434/v1".to_string(),
            api_key: None,
            timeout_secs: 120,
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text
    Pretty,
    /// Compact text with component fields
    #[default]
    Component,
    /// JSON lines
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Optional log file (appended)
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Component,
            file: None,
        }
    }
}

// ============================================================================
// Tools Configuration
// ============================================================================

/// Which registered tools the model may see and call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSecurity {
    /// Every registered tool
    #[default]
    Full,
    /// No tools at all
    Deny,
    /// Only the tools named in `allow`
    Allowlist,
}

impl std::str::FromStr for ToolSecurity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(ToolSecurity::Full),
            "deny" => Ok(ToolSecurity::Deny),
            "allowlist" => Ok(ToolSecurity::Allowlist),
            other => Err(format!("unknown tool security mode '{}'", other)),
        }
    }
}

/// Tools configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Exposure mode
    pub security: ToolSecurity,
    /// Tool names permitted in `allowlist` mode
    pub allow: Vec<String>,
}

impl ToolsConfig {
    /// Whether the tool called `name` may be offered and executed.
    pub fn permits(&self, name: &str) -> bool {
        match self.security {
            ToolSecurity::Full => true,
            ToolSecurity::Deny => false,
            ToolSecurity::Allowlist => self.allow.iter().any(|allowed| allowed == name),
        }
    }
}
