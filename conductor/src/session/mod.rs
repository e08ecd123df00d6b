//! Multi-turn session state.
//!
//! A session is a sliding window of the most recent messages plus metadata,
//! kept alive by an inactivity TTL. The store trait is implemented over
//! Redis (shared across replicas) and in memory (tests, single process).

mod memory;
mod redis;

pub use self::redis::RedisSessionStore;
pub use memory::InMemorySessionStore;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author of a session message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn in a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Assistant turns carry request id and tools used here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl SessionMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// One conversation, newest state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Session {
    pub(crate) fn fresh(metadata: Option<serde_json::Value>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            metadata,
        }
    }

    /// Appends and trims to the sliding window, bumping `updated_at`.
    pub(crate) fn push_trimmed(&mut self, message: SessionMessage, max_messages: usize) {
        self.messages.push(message);
        if self.messages.len() > max_messages {
            let excess = self.messages.len() - max_messages;
            self.messages.drain(..excess);
        }
        self.updated_at = Utc::now();
    }
}

/// Store-level knobs shared by both backends.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    /// Sliding-window size; oldest messages drop first.
    pub max_messages: usize,
    /// Inactivity TTL; every write restarts it.
    pub ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_messages: 50,
            ttl: Duration::from_secs(1800),
        }
    }
}

/// Session store errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session backend: {0}")]
    Backend(String),
    #[error("session serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Per-session persistence with sliding-window retention.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates a new empty session.
    async fn create(&self, metadata: Option<serde_json::Value>) -> Result<Session, SessionError>;

    /// Fetches a session; `None` when unknown or expired.
    async fn get(&self, id: &str) -> Result<Option<Session>, SessionError>;

    /// Appends a message, trimming to the window. Returns false when the
    /// session does not exist.
    async fn add_message(&self, id: &str, message: SessionMessage) -> Result<bool, SessionError>;

    /// Message history, oldest first.
    async fn history(&self, id: &str) -> Result<Vec<SessionMessage>, SessionError>;

    /// Removes a session.
    async fn delete(&self, id: &str) -> Result<(), SessionError>;

    /// Number of live sessions, for health reporting.
    async fn active_count(&self) -> Result<usize, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: the window keeps only the most recent `max_messages`,
    /// dropping oldest first, and `updated_at` never precedes `created_at`.
    #[test]
    fn push_trimmed_keeps_newest() {
        let mut session = Session::fresh(None);
        for i in 0..7 {
            session.push_trimmed(SessionMessage::user(format!("m{i}")), 5);
        }
        assert_eq!(session.messages.len(), 5);
        assert_eq!(session.messages[0].content, "m2");
        assert_eq!(session.messages[4].content, "m6");
        assert!(session.updated_at >= session.created_at);
    }

    #[test]
    fn message_constructors_set_roles() {
        assert_eq!(SessionMessage::user("u").role, Role::User);
        assert_eq!(SessionMessage::assistant("a").role, Role::Assistant);
    }

    #[test]
    fn session_roundtrips_through_serde() {
        let mut session = Session::fresh(Some(serde_json::json!({"channel": "web"})));
        session.push_trimmed(
            SessionMessage::assistant("hello").with_metadata(serde_json::json!({
                "request_id": "req-1",
                "tools_used": ["weather-tool"],
            })),
            50,
        );
        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, session.id);
        assert_eq!(back.messages.len(), 1);
        assert_eq!(back.messages[0].content, "hello");
    }
}
