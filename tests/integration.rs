//! Integration tests for TaskClaw
//!
//! These tests verify that the components work together: the JSONL session
//! store under compaction, the session queue serializing agent runs, and
//! the agent loop compacting an overflowing session before calling the
//! provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Map;
use taskclaw::agent::compaction::SUMMARY_MARKER;
use taskclaw::agent::{AgentLoop, Compactor, ContextAccountant, RunRequest};
use taskclaw::config::Config;
use taskclaw::error::{Result, TaskClawError};
use taskclaw::providers::{CompletionRequest, CompletionResponse, LLMProvider};
use taskclaw::queue::{EnqueueOptions, SessionQueue};
use taskclaw::session::{Message, Role, SessionStore};
use tempfile::tempdir;

// ============================================================================
// Helpers
// ============================================================================

/// Answers summary requests with a fixed summary and everything else by
/// echoing the latest user message, optionally after a delay.
struct MockEchoProvider {
    summary: String,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    summary_calls: AtomicUsize,
}

impl MockEchoProvider {
    fn new(summary: &str) -> Arc<Self> {
        Self::with_delay(summary, Duration::ZERO)
    }

    fn with_delay(summary: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            summary: summary.to_string(),
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            summary_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LLMProvider for MockEchoProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        if last_user.starts_with("Condense") {
            self.summary_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(CompletionResponse::text(&self.summary));
        }
        Ok(CompletionResponse::text(&format!("re: {}", last_user)))
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    fn name(&self) -> &str {
        "mock-echo"
    }
}

/// Fill `key` with a catalogue message and `turns` user/assistant pairs of
/// 100 tokens each.
async fn seed_history(store: &SessionStore, key: &str, turns: usize) {
    store.create(key, Map::new()).await.unwrap();
    store
        .append(key, Message::system("## Available Tools\n\nNo tools are available."))
        .await
        .unwrap();
    for i in 0..turns {
        store
            .append(key, Message::user(&format!("{:u>400}", i)))
            .await
            .unwrap();
        store
            .append(key, Message::assistant(&format!("{:a>400}", i)))
            .await
            .unwrap();
    }
}

// ============================================================================
// Store + Compactor
// ============================================================================

#[tokio::test]
async fn test_compaction_persists_to_jsonl_and_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = SessionStore::with_path(dir.path().to_path_buf()).unwrap();
    seed_history(&store, "chat:42", 30).await;

    let accountant = ContextAccountant::default();
    let compactor = Compactor::new(accountant, 256);
    let provider = MockEchoProvider::new("User asked for numbered filler; assistant complied.");

    let session = store.get("chat:42").await.unwrap().unwrap();
    let before = accountant.estimate_session_tokens(&session);
    let result = compactor
        .compact(&store, &session, 1000, provider.as_ref(), 4)
        .await;

    assert!(result.success);
    assert_eq!(result.original_count, 61);
    assert!(result.compacted_count < result.original_count);
    assert!(result.tokens_saved > 0);

    // A fresh store sees exactly what was persisted.
    let reopened = SessionStore::with_path(dir.path().to_path_buf()).unwrap();
    let persisted = reopened.get("chat:42").await.unwrap().unwrap();
    assert_eq!(persisted.messages.len(), result.compacted_count);
    assert_eq!(persisted.messages[0].role, Role::System);
    assert!(persisted.messages[1].content.starts_with(SUMMARY_MARKER));
    assert_eq!(
        accountant.estimate_session_tokens(&persisted),
        before - result.tokens_saved
    );

    // Compacting again with the same budget changes nothing.
    let again = compactor
        .compact(&reopened, &persisted, 1000, provider.as_ref(), 4)
        .await;
    assert_eq!(again.compacted_count, again.original_count);
    assert_eq!(again.tokens_saved, 0);
    assert_eq!(provider.summary_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_compaction_never_increases_tokens() {
    let accountant = ContextAccountant::default();
    let compactor = Compactor::new(accountant, 256);
    // A summary longer than everything it replaces forces the truncation path.
    let provider = MockEchoProvider::new(&"long summary ".repeat(2000));

    for budget in [0usize, 150, 500, 1200, 5000] {
        let store = SessionStore::new_memory();
        seed_history(&store, "s", 12).await;
        let session = store.get("s").await.unwrap().unwrap();
        let before = accountant.estimate_session_tokens(&session);

        let result = compactor
            .compact(&store, &session, budget, provider.as_ref(), 2)
            .await;

        let after = accountant.estimate_session_tokens(&store.get("s").await.unwrap().unwrap());
        assert!(after <= before, "budget {budget}: {after} > {before}");
        assert_eq!(result.tokens_saved, before - after);
        assert!(!result.success || result.compacted_count == result.original_count);
    }
}

// ============================================================================
// Queue + AgentLoop
// ============================================================================

#[tokio::test]
async fn test_queue_serializes_runs_on_one_session() {
    let provider = MockEchoProvider::with_delay("unused", Duration::from_millis(20));
    let agent = Arc::new(AgentLoop::new(
        Config::default(),
        SessionStore::new_memory(),
        provider.clone(),
    ));
    let queue = SessionQueue::new();

    let submit = |text: &'static str| {
        let agent = Arc::clone(&agent);
        queue.enqueue(
            "chat:1",
            move || async move { agent.run(RunRequest::new("chat:1", text)).await },
            EnqueueOptions::new(),
        )
    };

    let (first, second, third) = tokio::join!(submit("one"), submit("two"), submit("three"));
    assert_eq!(first.unwrap().content, "re: one");
    assert_eq!(second.unwrap().content, "re: two");
    assert_eq!(third.unwrap().content, "re: three");
    assert_eq!(provider.max_in_flight.load(Ordering::SeqCst), 1);

    let transcript: Vec<String> = agent
        .store()
        .get_messages("chat:1")
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.role != Role::System)
        .map(|m| m.content)
        .collect();
    assert_eq!(
        transcript,
        vec!["one", "re: one", "two", "re: two", "three", "re: three"]
    );
}

#[tokio::test]
async fn test_queue_runs_different_sessions_in_parallel() {
    let provider = MockEchoProvider::with_delay("unused", Duration::from_millis(100));
    let agent = Arc::new(AgentLoop::new(
        Config::default(),
        SessionStore::new_memory(),
        provider.clone(),
    ));
    let queue = SessionQueue::new();

    let submit = |key: &'static str| {
        let agent = Arc::clone(&agent);
        queue.enqueue(
            key,
            move || async move { agent.run(RunRequest::new(key, "hi")).await },
            EnqueueOptions::new(),
        )
    };

    let (a, b) = tokio::join!(submit("chat:a"), submit("chat:b"));
    assert!(a.unwrap().success);
    assert!(b.unwrap().success);
    assert_eq!(provider.max_in_flight.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cleared_run_never_touches_session() {
    let provider = MockEchoProvider::with_delay("unused", Duration::from_millis(50));
    let agent = Arc::new(AgentLoop::new(
        Config::default(),
        SessionStore::new_memory(),
        provider,
    ));
    let queue = SessionQueue::new();

    let running = {
        let agent = Arc::clone(&agent);
        let queue = queue.clone();
        tokio::spawn(async move {
            queue
                .enqueue(
                    "chat:c",
                    move || async move { agent.run(RunRequest::new("chat:c", "first")).await },
                    EnqueueOptions::new(),
                )
                .await
        })
    };
    while queue.size("chat:c") == 0 {
        tokio::task::yield_now().await;
    }

    let pending = {
        let agent = Arc::clone(&agent);
        let queue = queue.clone();
        tokio::spawn(async move {
            queue
                .enqueue(
                    "chat:c",
                    move || async move { agent.run(RunRequest::new("chat:c", "second")).await },
                    EnqueueOptions::new(),
                )
                .await
        })
    };
    while queue.size("chat:c") < 2 {
        tokio::task::yield_now().await;
    }

    assert_eq!(queue.clear("chat:c"), 1);
    assert!(running.await.unwrap().unwrap().success);
    assert!(matches!(
        pending.await.unwrap(),
        Err(TaskClawError::Queue(_))
    ));

    let messages = agent.store().get_messages("chat:c").await.unwrap();
    assert!(messages.iter().all(|m| m.content != "second"));
}

// ============================================================================
// AgentLoop-driven compaction
// ============================================================================

#[tokio::test]
async fn test_overflowing_session_is_compacted_before_the_call() {
    let mut config = Config::default();
    config.context.context_limit = 2000;
    config.compaction.target_ratio = 0.5;
    config.compaction.recent_turns_to_keep = 4;

    let store = SessionStore::new_memory();
    seed_history(&store, "chat:long", 20).await;

    let provider = MockEchoProvider::new("Twenty filler turns were exchanged.");
    let agent = AgentLoop::new(config, store, provider.clone());

    let result = agent
        .run(RunRequest::new("chat:long", "what now?"))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.content, "re: what now?");
    assert_eq!(provider.summary_calls.load(Ordering::SeqCst), 1);

    let session = agent.store().get("chat:long").await.unwrap().unwrap();
    assert!(session
        .messages
        .iter()
        .any(|m| m.role == Role::System && m.content.starts_with(SUMMARY_MARKER)));
    let status = agent.accountant().check_window(&session, 2000);
    assert!(!status.is_overflow);
}
