//! Browser session storage.
//!
//! The pipeline only needs a string key/value map per browser session: the
//! `goto_url` saved before the SSO round trip, and the `authenticated` flag
//! and subject written once the assertion is accepted. On login the state
//! moves to a fresh session id.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

/// Session key holding `"true"` once the user is authenticated.
pub const AUTHENTICATED: &str = "authenticated";

/// Session key holding the URL to return to after login.
pub const GOTO_URL: &str = "goto_url";

/// Session key holding the authenticated subject's NameID.
pub const SUBJECT: &str = "subject";

/// Idle lifetime of an in-memory session.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Errors raised by session stores.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    /// The backing store failed.
    #[error("session storage error: {0}")]
    Storage(String),
}

/// Result type for session store operations.
pub type SessionStoreResult<T> = Result<T, SessionStoreError>;

/// Key/value storage scoped by browser session id.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Reads a value; unknown sessions and keys yield `None`.
    async fn get(&self, session_id: &str, key: &str) -> SessionStoreResult<Option<String>>;

    /// Writes a value, creating the session if needed.
    async fn set(&self, session_id: &str, key: &str, value: &str) -> SessionStoreResult<()>;

    /// Moves every value of `old_id` to `new_id`. `old_id` no longer
    /// exists afterwards.
    async fn rotate(&self, old_id: &str, new_id: &str) -> SessionStoreResult<()>;
}

#[derive(Debug)]
struct Entry {
    values: HashMap<String, String>,
    written: Instant,
}

impl Entry {
    fn new() -> Self {
        Self {
            values: HashMap::new(),
            written: Instant::now(),
        }
    }

    fn is_live(&self, ttl: Duration) -> bool {
        self.written.elapsed() < ttl
    }
}

/// Process-local session store.
///
/// A session expires `ttl` after its last write. Expired sessions read as
/// empty and are dropped on the next write to the store.
#[derive(Debug)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySessionStore {
    /// Creates an empty store with [`DEFAULT_SESSION_TTL`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_SESSION_TTL)
    }

    /// Creates an empty store whose sessions live for `ttl` after each write.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns the number of sessions held, expired ones included until the
    /// next write sweeps them.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns true if no session is held.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    fn sweep(&self, sessions: &mut HashMap<String, Entry>) {
        let before = sessions.len();
        sessions.retain(|_, entry| entry.is_live(self.ttl));
        let expired = before - sessions.len();
        if expired > 0 {
            tracing::debug!(expired, "expired sessions removed");
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str, key: &str) -> SessionStoreResult<Option<String>> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .filter(|entry| entry.is_live(self.ttl))
            .and_then(|entry| entry.values.get(key))
            .cloned())
    }

    async fn set(&self, session_id: &str, key: &str, value: &str) -> SessionStoreResult<()> {
        let mut sessions = self.sessions.write().await;
        self.sweep(&mut sessions);
        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(Entry::new);
        entry.values.insert(key.to_string(), value.to_string());
        entry.written = Instant::now();
        Ok(())
    }

    async fn rotate(&self, old_id: &str, new_id: &str) -> SessionStoreResult<()> {
        let mut sessions = self.sessions.write().await;
        self.sweep(&mut sessions);
        let mut entry = sessions.remove(old_id).unwrap_or_else(Entry::new);
        entry.written = Instant::now();
        sessions.insert(new_id.to_string(), entry);
        Ok(())
    }
}
