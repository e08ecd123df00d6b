//! In-memory session store for tests and single-process runs.

use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Session, SessionConfig, SessionError, SessionMessage, SessionStore};

/// DashMap-backed [`SessionStore`] with lazy TTL eviction.
pub struct InMemorySessionStore {
    sessions: DashMap<String, Entry>,
    config: SessionConfig,
}

struct Entry {
    session: Session,
    expires_at: Instant,
}

impl InMemorySessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    fn sweep(&self) {
        let now = Instant::now();
        self.sessions.retain(|_, entry| entry.expires_at > now);
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, metadata: Option<serde_json::Value>) -> Result<Session, SessionError> {
        let session = Session::fresh(metadata);
        self.sessions.insert(
            session.id.clone(),
            Entry {
                session: session.clone(),
                expires_at: Instant::now() + self.config.ttl,
            },
        );
        Ok(session)
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, SessionError> {
        self.sweep();
        Ok(self.sessions.get(id).map(|entry| entry.session.clone()))
    }

    async fn add_message(&self, id: &str, message: SessionMessage) -> Result<bool, SessionError> {
        self.sweep();
        let Some(mut entry) = self.sessions.get_mut(id) else {
            return Ok(false);
        };
        entry
            .session
            .push_trimmed(message, self.config.max_messages);
        entry.expires_at = Instant::now() + self.config.ttl;
        Ok(true)
    }

    async fn history(&self, id: &str) -> Result<Vec<SessionMessage>, SessionError> {
        Ok(self
            .get(id)
            .await?
            .map(|session| session.messages)
            .unwrap_or_default())
    }

    async fn delete(&self, id: &str) -> Result<(), SessionError> {
        self.sessions.remove(id);
        Ok(())
    }

    async fn active_count(&self) -> Result<usize, SessionError> {
        self.sweep();
        Ok(self.sessions.len())
    }
}
