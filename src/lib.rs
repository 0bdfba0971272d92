//! TaskClaw - session-aware LLM task agent core
//!
//! Runs a tool-using model against durable sessions: token accounting,
//! context compaction, a bounded tool-call loop, and per-session FIFO lanes.

pub mod agent;
pub mod config;
pub mod error;
pub mod providers;
pub mod queue;
pub mod session;
pub mod tools;
pub mod utils;

pub use agent::{
    AgentEvent, AgentLoop, CompactionResult, Compactor, ContextAccountant, ContextStatus,
    EventListener, RunRequest, RunResult, ThinkLevel,
};
pub use config::{Config, ConfigOverrides};
pub use error::{ProviderError, Result, TaskClawError};
pub use providers::{CompletionRequest, CompletionResponse, LLMProvider, OpenAIProvider, Usage};
pub use queue::{EnqueueOptions, SessionQueue, WaitInfo};
pub use session::{Message, Role, Session, SessionStore, ToolCall, ToolResult};
pub use tools::{Tool, ToolContext, ToolDefinition, ToolOutput, ToolRegistry};
