//! Session module - durable, ordered conversation logs
//!
//! This module provides the `SessionStore`, which owns every session's
//! message log:
//! - In-memory cache with async access
//! - Optional JSONL persistence, one file per session
//! - Append-only mutation, with whole-log replacement reserved for compaction
//!
//! Exclusion of concurrent mutation on the *same* key is the caller's job
//! (see [`SessionQueue`](crate::queue::SessionQueue)).
//!
//! # Example
//!
//! ```
//! use taskclaw::session::{Message, SessionStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = SessionStore::new_memory();
//!     store.create("cli:default", Default::default()).await.unwrap();
//!     store.append("cli:default", Message::user("Hello!")).await.unwrap();
//!
//!     let messages = store.get_messages("cli:default").await.unwrap();
//!     assert_eq!(messages.len(), 1);
//! }
//! ```

pub mod history;
pub mod types;

pub use types::{Message, Role, Session, ToolCall, ToolResult};

use crate::config::{Config, SessionStorage};
use crate::error::{Result, TaskClawError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// File extension of persisted sessions.
const SESSION_EXT: &str = "jsonl";

// ============================================================================
// JSONL records
// ============================================================================

/// One line of a session file.
///
/// A file starts with a `session` header followed by `message` records in
/// append order. The newest timestamp in the file is the session's
/// `updated_at`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Record {
    Session {
        id: String,
        key: String,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        #[serde(default)]
        metadata: Map<String, Value>,
    },
    Message {
        at: DateTime<Utc>,
        message: Message,
    },
}

fn encode_session(session: &Session) -> Result<String> {
    let mut out = serde_json::to_string(&Record::Session {
        id: session.id.clone(),
        key: session.key.clone(),
        created_at: session.created_at,
        updated_at: session.updated_at,
        metadata: session.metadata.clone(),
    })?;
    out.push('\n');
    for message in &session.messages {
        out.push_str(&serde_json::to_string(&Record::Message {
            at: message.created_at,
            message: message.clone(),
        })?);
        out.push('\n');
    }
    Ok(out)
}

fn decode_session(path: &Path, content: &str) -> Option<Session> {
    let mut session: Option<Session> = None;

    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = match serde_json::from_str::<Record>(line) {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %e,
                    "Skipping undecodable session record"
                );
                continue;
            }
        };
        match record {
            Record::Session {
                id,
                key,
                created_at,
                updated_at,
                metadata,
            } => {
                let messages = session.take().map(|s| s.messages).unwrap_or_default();
                session = Some(Session {
                    id,
                    key,
                    messages,
                    created_at,
                    updated_at,
                    metadata,
                });
            }
            Record::Message { at, message } => match session.as_mut() {
                Some(s) => {
                    s.messages.push(message);
                    if at > s.updated_at {
                        s.updated_at = at;
                    }
                }
                None => {
                    warn!(path = %path.display(), "Message record before session header");
                }
            },
        }
    }

    if session.is_none() {
        warn!(path = %path.display(), "Session file has no header record");
    }
    session
}

// ============================================================================
// SessionStore
// ============================================================================

/// Store for conversation sessions.
///
/// The store keeps an in-memory cache and, when created with a path, one
/// JSONL file per session. Every mutating call updates `updated_at`, and a
/// `get` after any mutation reflects it.
///
/// # Thread Safety
///
/// The store uses `Arc<RwLock>` internally, so it is cheap to clone and
/// share across async tasks.
pub struct SessionStore {
    /// In-memory cache of sessions
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    /// Optional directory for JSONL persistence
    storage_path: Option<PathBuf>,
}

impl SessionStore {
    /// Create a store according to the session configuration.
    pub fn new(config: &Config) -> Result<Self> {
        match config.session.storage {
            SessionStorage::Memory => Ok(Self::new_memory()),
            SessionStorage::Jsonl => Self::with_path(config.sessions_dir()),
        }
    }

    /// Create an in-memory store without persistence.
    pub fn new_memory() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: None,
        }
    }

    /// Create a store persisting JSONL files under `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn with_path(path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&path)?;
        Ok(Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: Some(path),
        })
    }

    /// Directory used for persistence, if any.
    pub fn storage_path(&self) -> Option<&Path> {
        self.storage_path.as_deref()
    }

    /// Create a fresh session for `key`, replacing any existing one.
    pub async fn create(&self, key: &str, metadata: Map<String, Value>) -> Result<Session> {
        let session = Session::new(key, metadata);
        self.persist_full(&session).await?;
        self.sessions
            .write()
            .await
            .insert(key.to_string(), session.clone());
        info!(session = %key, id = %session.id, "Created session");
        Ok(session)
    }

    /// Get an existing session, or create an empty one.
    ///
    /// The flag is `true` when the session was created by this call.
    pub async fn get_or_create(&self, key: &str) -> Result<(Session, bool)> {
        if let Some(session) = self.get(key).await? {
            return Ok((session, false));
        }
        Ok((self.create(key, Map::new()).await?, true))
    }

    /// Get a session by key without creating it.
    ///
    /// Loads the session from disk into the cache when needed.
    pub async fn get(&self, key: &str) -> Result<Option<Session>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(key) {
                return Ok(Some(session.clone()));
            }
        }

        match self.load_from_disk(key).await? {
            Some(session) => {
                let mut sessions = self.sessions.write().await;
                let cached = sessions
                    .entry(key.to_string())
                    .or_insert(session)
                    .clone();
                Ok(Some(cached))
            }
            None => Ok(None),
        }
    }

    /// Append one message to a session.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` if the key is unknown.
    pub async fn append(&self, key: &str, message: Message) -> Result<()> {
        self.ensure_cached(key).await?;

        let at = Utc::now();
        let record = Record::Message {
            at,
            message: message.clone(),
        };
        {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(key)
                .ok_or_else(|| TaskClawError::SessionNotFound(key.to_string()))?;
            session.messages.push(message);
            session.updated_at = at;
        }

        if let Some(path) = self.file_path(key) {
            if path.exists() {
                let mut line = serde_json::to_string(&record)?;
                line.push('\n');
                let mut file = tokio::fs::OpenOptions::new()
                    .append(true)
                    .open(&path)
                    .await?;
                file.write_all(line.as_bytes()).await?;
                file.flush().await?;
            } else if let Some(session) = self.sessions.read().await.get(key).cloned() {
                self.persist_full(&session).await?;
            }
        }

        debug!(session = %key, "Appended message");
        Ok(())
    }

    /// Get the ordered messages of a session.
    pub async fn get_messages(&self, key: &str) -> Result<Vec<Message>> {
        self.get(key)
            .await?
            .map(|s| s.messages)
            .ok_or_else(|| TaskClawError::SessionNotFound(key.to_string()))
    }

    /// Atomically swap the full message list of a session.
    ///
    /// Reserved for compaction: it is the only permitted history rewrite.
    pub async fn replace_history(&self, key: &str, messages: Vec<Message>) -> Result<()> {
        self.rewrite(key, |session| session.messages = messages)
            .await
    }

    /// Remove every message from a session, keeping the session itself.
    pub async fn clear(&self, key: &str) -> Result<()> {
        self.rewrite(key, |session| session.messages.clear()).await?;
        info!(session = %key, "Cleared session");
        Ok(())
    }

    /// Delete a session from memory and disk.
    ///
    /// Returns `true` if anything was removed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let removed_cached = self.sessions.write().await.remove(key).is_some();

        let mut removed_file = false;
        if let Some(path) = self.file_path(key) {
            if path.exists() {
                tokio::fs::remove_file(&path).await?;
                removed_file = true;
            }
        }

        if removed_cached || removed_file {
            info!(session = %key, "Deleted session");
        }
        Ok(removed_cached || removed_file)
    }

    /// List every known session, sorted by key.
    ///
    /// Includes cached sessions and sessions that only exist on disk.
    pub async fn list(&self) -> Result<Vec<Session>> {
        let mut by_key: HashMap<String, Session> = self.sessions.read().await.clone();

        if let Some(ref storage_path) = self.storage_path {
            let mut entries = tokio::fs::read_dir(storage_path).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().map(|e| e == SESSION_EXT).unwrap_or(false) {
                    let content = match tokio::fs::read_to_string(&path).await {
                        Ok(c) => c,
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "Unreadable session file");
                            continue;
                        }
                    };
                    if let Some(session) = decode_session(&path, &content) {
                        by_key.entry(session.key.clone()).or_insert(session);
                    }
                }
            }
        }

        let mut sessions: Vec<Session> = by_key.into_values().collect();
        sessions.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(sessions)
    }

    /// Drop cached sessions idle for longer than `max_idle`.
    ///
    /// Persisted sessions remain on disk and reload on next access. For an
    /// in-memory store eviction is final. Returns the number evicted.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| {
            (now - s.updated_at)
                .to_std()
                .map(|age| age <= max_idle)
                .unwrap_or(true)
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, "Evicted idle sessions from cache");
        }
        evicted
    }

    /// Number of sessions currently cached in memory.
    pub async fn cache_size(&self) -> usize {
        self.sessions.read().await.len()
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn ensure_cached(&self, key: &str) -> Result<()> {
        match self.get(key).await? {
            Some(_) => Ok(()),
            None => Err(TaskClawError::SessionNotFound(key.to_string())),
        }
    }

    async fn rewrite<F>(&self, key: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Session),
    {
        self.ensure_cached(key).await?;
        let snapshot = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(key)
                .ok_or_else(|| TaskClawError::SessionNotFound(key.to_string()))?;
            mutate(session);
            session.updated_at = Utc::now();
            session.clone()
        };
        self.persist_full(&snapshot).await
    }

    async fn load_from_disk(&self, key: &str) -> Result<Option<Session>> {
        let Some(path) = self.file_path(key) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(decode_session(&path, &content))
    }

    /// Write the whole session through a temp file and rename, so readers
    /// never observe a half-written log.
    async fn persist_full(&self, session: &Session) -> Result<()> {
        let Some(path) = self.file_path(&session.key) else {
            return Ok(());
        };
        let tmp = path.with_extension(format!("{}.tmp", SESSION_EXT));
        tokio::fs::write(&tmp, encode_session(session)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    fn file_path(&self, key: &str) -> Option<PathBuf> {
        self.storage_path
            .as_ref()
            .map(|dir| dir.join(format!("{}.{}", sanitize_key(key), SESSION_EXT)))
    }
}

/// Percent-encode characters that are unsafe in file names.
///
/// `%` itself is encoded, so distinct keys never share a file.
fn sanitize_key(key: &str) -> String {
    let mut result = String::with_capacity(key.len() * 3);
    for c in key.chars() {
        match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '%' | '.' => {
                result.push_str(&format!("%{:02X}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}

impl Clone for SessionStore {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            storage_path: self.storage_path.clone(),
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new_memory()
    }
}
