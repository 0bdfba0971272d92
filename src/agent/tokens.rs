//! Token accounting for sessions and messages.
//!
//! A cheap, deterministic heuristic shared by the agent loop and the
//! compactor. No tokenizer is involved: CJK ideographs count one token each,
//! every other character counts a quarter token (rounded up per text), and
//! each tool call or tool result attached to a message adds a flat surcharge.
//!
//! The estimate is additive over messages, so appending a message can never
//! lower a session's total.

use serde::Serialize;

use crate::config::Config;
use crate::session::{Message, Session};

/// Characters per token for non-ideographic text.
const CHARS_PER_TOKEN: usize = 4;

/// Snapshot of how full a context window is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextStatus {
    /// Estimated tokens in use
    pub estimated_tokens: usize,
    /// Window size
    pub limit: usize,
    /// `estimated_tokens / limit` as a percentage
    pub usage_percent: f64,
    /// Estimate exceeds the limit
    pub is_overflow: bool,
    /// Usage is above the warning threshold
    pub warning: bool,
}

/// Per-session statistics for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    pub key: String,
    pub message_count: usize,
    pub estimated_tokens: usize,
    pub context_limit: usize,
    pub usage_percent: f64,
}

/// Estimates token cost of text, messages and sessions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextAccountant {
    tool_overhead_tokens: usize,
    image_chars: usize,
    warn_percent: f64,
}

impl Default for ContextAccountant {
    fn default() -> Self {
        Self {
            tool_overhead_tokens: 100,
            image_chars: 4000,
            warn_percent: 80.0,
        }
    }
}

impl ContextAccountant {
    /// Create an accountant with the given surcharges.
    pub fn new(tool_overhead_tokens: usize, image_chars: usize, warn_percent: f64) -> Self {
        Self {
            tool_overhead_tokens,
            image_chars,
            warn_percent,
        }
    }

    /// Create an accountant from the `context` config section.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.context.tool_overhead_tokens,
            config.context.image_chars,
            config.context.warn_percent,
        )
    }

    /// Estimate the tokens in a piece of text.
    ///
    /// # Example
    /// ```
    /// use taskclaw::agent::ContextAccountant;
    ///
    /// let accountant = ContextAccountant::default();
    /// assert_eq!(accountant.estimate_tokens(""), 0);
    /// assert_eq!(accountant.estimate_tokens("abcde"), 2);
    /// assert_eq!(accountant.estimate_tokens("你好"), 2);
    /// ```
    pub fn estimate_tokens(&self, text: &str) -> usize {
        let mut ideographs = 0usize;
        let mut other = 0usize;
        for c in text.chars() {
            if is_cjk_ideograph(c) {
                ideographs += 1;
            } else {
                other += 1;
            }
        }
        ideographs + other.div_ceil(CHARS_PER_TOKEN)
    }

    /// Estimate one message: content, tool surcharges and images.
    pub fn estimate_message_tokens(&self, message: &Message) -> usize {
        self.estimate_tokens(&message.content)
            + message.tool_item_count() * self.tool_overhead_tokens
            + message.image_count() * self.image_chars.div_ceil(CHARS_PER_TOKEN)
    }

    /// Sum of the estimates of `messages`.
    pub fn estimate_messages_tokens(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| self.estimate_message_tokens(m))
            .sum()
    }

    /// Estimate a whole session.
    pub fn estimate_session_tokens(&self, session: &Session) -> usize {
        self.estimate_messages_tokens(&session.messages)
    }

    /// Compare a session against a window of `limit` tokens.
    pub fn check_window(&self, session: &Session, limit: usize) -> ContextStatus {
        self.check_messages(&session.messages, limit)
    }

    /// Compare a message list against a window of `limit` tokens.
    pub fn check_messages(&self, messages: &[Message], limit: usize) -> ContextStatus {
        let estimated_tokens = self.estimate_messages_tokens(messages);
        let usage_percent = usage_percent(estimated_tokens, limit);
        ContextStatus {
            estimated_tokens,
            limit,
            usage_percent,
            is_overflow: estimated_tokens > limit,
            warning: usage_percent > self.warn_percent,
        }
    }

    /// Statistics for one session.
    pub fn stats(&self, session: &Session, limit: usize) -> SessionStats {
        let estimated_tokens = self.estimate_session_tokens(session);
        SessionStats {
            key: session.key.clone(),
            message_count: session.message_count(),
            estimated_tokens,
            context_limit: limit,
            usage_percent: usage_percent(estimated_tokens, limit),
        }
    }
}

fn is_cjk_ideograph(c: char) -> bool {
    ('\u{4E00}'..='\u{9FA5}').contains(&c)
}

fn usage_percent(tokens: usize, limit: usize) -> f64 {
    if limit == 0 {
        // An empty window is full as soon as anything is in it.
        return if tokens == 0 { 0.0 } else { f64::INFINITY };
    }
    tokens as f64 / limit as f64 * 100.0
}
