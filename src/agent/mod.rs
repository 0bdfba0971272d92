//! Agent module - the tool-call loop and the context it runs in
//!
//! This module provides the agent loop and everything it needs to keep a
//! session inside the model's context window. The agent is responsible for:
//!
//! - Resolving or creating the session, seeding it with the tool catalogue
//! - Estimating token usage and compacting overflowing sessions
//! - Calling the LLM provider and parsing tool-call requests from its output
//! - Executing tools in order and feeding results back to the model
//! - Emitting lifecycle events to registered listeners
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ SessionQueue │────>│  AgentLoop  │────>│ LLMProvider │
//! │   (lanes)    │     │             │     │             │
//! └──────────────┘     └─────────────┘     └─────────────┘
//!                        │    │    │
//!            ┌───────────┘    │    └───────────┐
//!            ▼                ▼                ▼
//!     ┌─────────────┐  ┌─────────────┐  ┌─────────────┐
//!     │  Compactor  │  │   Session   │  │    Tool     │
//!     │ + Accountant│  │    Store    │  │  Registry   │
//!     └─────────────┘  └─────────────┘  └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use taskclaw::agent::{AgentLoop, RunRequest};
//! use taskclaw::config::Config;
//! use taskclaw::providers::OpenAIProvider;
//! use taskclaw::session::SessionStore;
//! use taskclaw::tools::EchoTool;
//!
//! async fn run_agent() -> taskclaw::Result<()> {
//!     let config = Config::default();
//!     let provider = Arc::new(OpenAIProvider::from_config(&config)?);
//!     let agent = AgentLoop::new(config, SessionStore::new_memory(), provider);
//!
//!     // Register tools
//!     agent.register_tool(Box::new(EchoTool)).await;
//!
//!     let result = agent.run(RunRequest::new("cli:default", "2+2?")).await?;
//!     println!("{}", result.content);
//!     Ok(())
//! }
//! ```

pub mod compaction;
mod context;
mod events;
mod r#loop;
mod parser;
mod tokens;

pub use compaction::{CompactionResult, Compactor};
pub use context::ContextBuilder;
pub use events::{AgentEvent, EventEmitter, EventListener};
pub use parser::{parse_tool_calls, strip_tool_calls};
pub use r#loop::{AgentLoop, RunRequest, RunResult};
pub use tokens::{ContextAccountant, ContextStatus, SessionStats};

pub use crate::config::ThinkLevel;
