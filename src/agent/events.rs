//! Lifecycle events emitted by the agent loop.
//!
//! Listeners are owned by one `AgentLoop`. A listener that returns an error
//! or panics is logged and skipped; the run carries on.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// An observable step of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    RunStart {
        session_key: String,
        user_text: String,
    },
    RunEnd {
        session_key: String,
        success: bool,
        iterations: u32,
        error: Option<String>,
    },
    ToolStart {
        session_key: String,
        call_id: String,
        tool: String,
        arguments: Value,
    },
    ToolEnd {
        session_key: String,
        call_id: String,
        tool: String,
        duration_ms: u64,
    },
    ToolError {
        session_key: String,
        call_id: String,
        tool: String,
        error: String,
    },
}

impl AgentEvent {
    /// Wire name of the event, e.g. `tool:start`.
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::RunStart { .. } => "run:start",
            AgentEvent::RunEnd { .. } => "run:end",
            AgentEvent::ToolStart { .. } => "tool:start",
            AgentEvent::ToolEnd { .. } => "tool:end",
            AgentEvent::ToolError { .. } => "tool:error",
        }
    }
}

/// Receives agent events.
///
/// Any `Fn(&AgentEvent) -> anyhow::Result<()>` closure is a listener.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &AgentEvent) -> anyhow::Result<()>;
}

impl<F> EventListener for F
where
    F: Fn(&AgentEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &AgentEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Fan-out of events to registered listeners.
#[derive(Default, Clone)]
pub struct EventEmitter {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Listeners are called in registration order.
    pub fn add_listener(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver `event` to every listener, isolating failures.
    pub fn emit(&self, event: &AgentEvent) {
        for (index, listener) in self.listeners.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(event = event.name(), listener = index, error = %e, "Event listener failed");
                }
                Err(_) => {
                    warn!(event = event.name(), listener = index, "Event listener panicked");
                }
            }
        }
    }
}
