//! Per-user upload sessions
//!
//! A session exists only while an upload is pending: it is created when the
//! user sends the upload command and removed once the file has been handled
//! or the interaction timed out.
//!
//! The store is injected as `Arc<dyn SessionStore>` so tests and alternative
//! backends can replace the in-memory map. All access goes through one async
//! lock, which serializes updates for a key. Two messages from the same user
//! that race each other are still handled independently.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{ChatId, Command, MessageId, UserId};

/// Default time a user has to send the file after the upload command
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// An in-progress upload interaction
#[derive(Debug, Clone)]
pub struct Session {
    pub chat_id: ChatId,
    pub command: Command,
    /// Prompt message sent to the user, set once the send succeeded
    pub message_ref: Option<MessageId>,
    pub created_at: Instant,
}

impl Session {
    fn new(chat_id: ChatId, command: Command) -> Self {
        Self {
            chat_id,
            command,
            message_ref: None,
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self, timeout: Duration) -> bool {
        self.created_at.elapsed() > timeout
    }
}

/// Storage for upload sessions, keyed by user
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create or overwrite the user's session.
    ///
    /// Implementations may drop other users' expired sessions here; nothing
    /// else removes a session whose user never wrote back.
    async fn start(&self, user: UserId, chat: ChatId, command: Command);

    /// Remember the prompt message sent for this session
    async fn attach_message_ref(&self, user: UserId, message: MessageId) -> Result<()>;

    async fn chat_id(&self, user: UserId) -> Result<ChatId>;

    async fn message_ref(&self, user: UserId) -> Result<Option<MessageId>>;

    async fn active_command(&self, user: UserId) -> Result<Command>;

    /// Whether the session outlived the timeout window.
    ///
    /// Returns false when there is no session; callers that care about
    /// absence must check it separately.
    async fn is_expired(&self, user: UserId) -> bool;

    /// Restart the timeout window, keeping every other field
    async fn reset_timer(&self, user: UserId) -> Result<()>;

    /// Remove the session; no-op when absent
    async fn delete(&self, user: UserId);
}

/// Process-memory session store
#[derive(Debug)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<UserId, Session>>,
    timeout: Duration,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_SESSION_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Snapshot of a session, mostly for inspection in tests
    pub async fn get(&self, user: UserId) -> Option<Session> {
        self.sessions.read().await.get(&user).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn start(&self, user: UserId, chat: ChatId, command: Command) {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(self.timeout));
        if sessions.len() < before {
            debug!(pruned = before - sessions.len(), "Dropped expired sessions");
        }
        sessions.insert(user, Session::new(chat, command));
        debug!(user, chat, command = %command, "Started session");
    }

    async fn attach_message_ref(&self, user: UserId, message: MessageId) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&user)
            .ok_or(Error::SessionNotFound(user))?;
        session.message_ref = Some(message);
        Ok(())
    }

    async fn chat_id(&self, user: UserId) -> Result<ChatId> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&user)
            .map(|s| s.chat_id)
            .ok_or(Error::SessionNotFound(user))
    }

    async fn message_ref(&self, user: UserId) -> Result<Option<MessageId>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&user)
            .map(|s| s.message_ref)
            .ok_or(Error::SessionNotFound(user))
    }

    async fn active_command(&self, user: UserId) -> Result<Command> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&user)
            .map(|s| s.command)
            .ok_or(Error::SessionNotFound(user))
    }

    async fn is_expired(&self, user: UserId) -> bool {
        let sessions = self.sessions.read().await;
        sessions
            .get(&user)
            .map(|s| s.is_expired(self.timeout))
            .unwrap_or(false)
    }

    async fn reset_timer(&self, user: UserId) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&user)
            .ok_or(Error::SessionNotFound(user))?;
        session.created_at = Instant::now();
        Ok(())
    }

    async fn delete(&self, user: UserId) {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(&user).is_some() {
            debug!(user, "Deleted session");
        }
    }
}
