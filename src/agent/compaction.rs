//! Context compaction for oversized sessions.
//!
//! A session is split into its head (every System message, kept verbatim)
//! and its body. The body is walked from the newest message backward while
//! the accumulated estimate stays within the target budget; everything older
//! than that point is replaced by one `[Conversation Summary]` System
//! message placed right after the head.
//!
//! - **Summarize**: the prefix is condensed by the provider.
//! - **Truncate**: used when the provider fails, returns nothing, or returns
//!   a summary that would make the session larger. The prefix is dropped.
//!
//! The pure planning functions (`plan_cut`, `truncate_prefix`,
//! `summarize_prefix`) never touch the store; [`Compactor::compact`] wires
//! them to a provider and persists the result.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::providers::{CompletionRequest, LLMProvider};
use crate::session::history::split_head;
use crate::session::{Message, Role, Session, SessionStore};

use super::tokens::ContextAccountant;

/// Prefix of every synthetic summary message.
pub const SUMMARY_MARKER: &str = "[Conversation Summary]";

const SUMMARIZER_PROMPT: &str =
    "You compress conversation transcripts for an assistant that will continue the conversation.";

/// Outcome of one compaction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompactionResult {
    /// The prefix was summarized, or there was nothing to do. `false` when
    /// the history was truncated instead or could not be persisted.
    pub success: bool,
    /// Messages before compaction
    pub original_count: usize,
    /// Messages after compaction
    pub compacted_count: usize,
    /// Estimated tokens removed
    pub tokens_saved: usize,
}

impl CompactionResult {
    fn unchanged(count: usize) -> Self {
        Self {
            success: true,
            original_count: count,
            compacted_count: count,
            tokens_saved: 0,
        }
    }
}

/// Index into `body` of the first message to keep verbatim.
///
/// Messages are accumulated from the end while the running estimate stays
/// within `budget`. At least `recent_to_keep` messages, and never fewer than
/// one, are always kept. The kept tail never opens with a Tool message whose
/// call was cut away.
/// Returns 0 when nothing should be compacted.
pub fn plan_cut(
    accountant: &ContextAccountant,
    body: &[Message],
    budget: usize,
    recent_to_keep: usize,
) -> usize {
    if body.len() <= recent_to_keep {
        return 0;
    }

    let mut running = 0usize;
    let mut cut = body.len();
    for (index, msg) in body.iter().enumerate().rev() {
        running = running.saturating_add(accountant.estimate_message_tokens(msg));
        if running > budget {
            break;
        }
        cut = index;
    }

    let mut cut = cut.min(body.len().saturating_sub(recent_to_keep.max(1)));
    while cut > 0 && cut < body.len() && body[cut].role == Role::Tool {
        cut -= 1;
    }
    cut
}

/// Head plus the body from `cut` onward.
pub fn truncate_prefix(head: &[Message], body: &[Message], cut: usize) -> Vec<Message> {
    let mut out = Vec::with_capacity(head.len() + body.len() - cut);
    out.extend_from_slice(head);
    out.extend_from_slice(&body[cut..]);
    out
}

/// Head, one summary message, then the body from `cut` onward.
pub fn summarize_prefix(
    head: &[Message],
    body: &[Message],
    cut: usize,
    summary: &str,
) -> Vec<Message> {
    let mut out = Vec::with_capacity(head.len() + 1 + body.len() - cut);
    out.extend_from_slice(head);
    out.push(Message::system(&format!("{}\n{}", SUMMARY_MARKER, summary.trim())));
    out.extend_from_slice(&body[cut..]);
    out
}

/// Build the summarization prompt for `messages`.
///
/// # Example
/// ```
/// use taskclaw::session::Message;
/// use taskclaw::agent::compaction::build_summary_prompt;
///
/// let prompt = build_summary_prompt(&[Message::user("Hello"), Message::assistant("Hi!")], 256);
/// assert!(prompt.contains("at most 256 tokens"));
/// assert!(prompt.contains("user: Hello"));
/// ```
pub fn build_summary_prompt(messages: &[Message], max_tokens: u32) -> String {
    let mut transcript = String::new();
    for msg in messages {
        transcript.push_str(&format!("{}: {}\n", msg.role, msg.content));
    }

    format!(
        "Condense the following exchange into at most {} tokens. \
         Preserve decisions and unresolved items.\n\n{}",
        max_tokens, transcript
    )
}

/// Shrinks sessions that no longer fit their context budget.
#[derive(Debug, Clone)]
pub struct Compactor {
    accountant: ContextAccountant,
    summary_max_tokens: u32,
}

impl Compactor {
    pub fn new(accountant: ContextAccountant, summary_max_tokens: u32) -> Self {
        Self {
            accountant,
            summary_max_tokens,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ContextAccountant::from_config(config),
            config.compaction.summary_max_tokens,
        )
    }

    /// Compact `session` so its body fits `target_budget`, then persist it.
    ///
    /// Never fails: provider errors fall back to truncation and store errors
    /// leave the session untouched. Both cases report `success: false`.
    pub async fn compact(
        &self,
        store: &SessionStore,
        session: &Session,
        target_budget: usize,
        provider: &dyn LLMProvider,
        recent_turns_to_keep: usize,
    ) -> CompactionResult {
        let original_count = session.messages.len();
        let (head, body) = split_head(&session.messages);

        if body.len() <= recent_turns_to_keep
            || self.accountant.estimate_messages_tokens(&body) <= target_budget
        {
            debug!(session = %session.key, "Compaction not needed");
            return CompactionResult::unchanged(original_count);
        }

        let cut = plan_cut(&self.accountant, &body, target_budget, recent_turns_to_keep);
        if cut == 0 {
            debug!(session = %session.key, "Nothing to compact before the recent window");
            return CompactionResult::unchanged(original_count);
        }

        let original_tokens = self.accountant.estimate_session_tokens(session);
        let truncated = truncate_prefix(&head, &body, cut);

        let (compacted, summarized) = match self.summarize(&body[..cut], provider).await {
            Some(summary) => {
                let candidate = summarize_prefix(&head, &body, cut, &summary);
                if self.accountant.estimate_messages_tokens(&candidate) <= original_tokens {
                    (candidate, true)
                } else {
                    warn!(session = %session.key, "Summary larger than history, truncating instead");
                    (truncated, false)
                }
            }
            None => (truncated, false),
        };

        let compacted_count = compacted.len();
        let new_tokens = self.accountant.estimate_messages_tokens(&compacted);

        if let Err(e) = store.replace_history(&session.key, compacted).await {
            warn!(session = %session.key, error = %e, "Failed to persist compacted history");
            return CompactionResult {
                success: false,
                ..CompactionResult::unchanged(original_count)
            };
        }

        let tokens_saved = original_tokens.saturating_sub(new_tokens);
        info!(
            session = %session.key,
            summarized,
            original_count,
            compacted_count,
            tokens_saved,
            "Compacted session"
        );

        CompactionResult {
            success: summarized,
            original_count,
            compacted_count,
            tokens_saved,
        }
    }

    async fn summarize(&self, prefix: &[Message], provider: &dyn LLMProvider) -> Option<String> {
        let request = CompletionRequest::new(vec![Message::user(&build_summary_prompt(
            prefix,
            self.summary_max_tokens,
        ))])
        .with_system_prompt(SUMMARIZER_PROMPT)
        .with_max_tokens(self.summary_max_tokens);

        match provider.complete(request).await {
            Ok(response) if !response.content.trim().is_empty() => Some(response.content),
            Ok(_) => {
                warn!("Summarizer returned an empty summary, truncating");
                None
            }
            Err(e) => {
                warn!(error = %e, "Summarizer call failed, truncating");
                None
            }
        }
    }
}
