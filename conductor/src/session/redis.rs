//! Redis-backed session store.
//!
//! Sessions live under `sessions:<id>` in their own logical database,
//! disjoint from the `services:` registry namespace. Every write re-arms the
//! inactivity TTL; the sliding-window trim happens on the freshly read blob
//! inside one get-modify-set sequence so a concurrent trim cannot lose
//! messages. The single connection manager serializes per-session writes.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{Session, SessionConfig, SessionError, SessionMessage, SessionStore};

const KEY_PREFIX: &str = "sessions:";

/// [`SessionStore`] backed by an external Redis.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
    config: SessionConfig,
}

impl RedisSessionStore {
    /// Wraps an established connection manager. The connection should point
    /// at the sessions' logical database (e.g. `redis://host:6379/1`).
    pub fn new(conn: ConnectionManager, config: SessionConfig) -> Self {
        Self { conn, config }
    }

    /// Connects to `url` (expected to carry the sessions DB number).
    pub async fn connect(url: &str, config: SessionConfig) -> Result<Self, SessionError> {
        let client = redis::Client::open(url).map_err(|e| SessionError::Backend(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| SessionError::Backend(e.to_string()))?;
        Ok(Self::new(conn, config))
    }

    fn key(id: &str) -> String {
        format!("{KEY_PREFIX}{id}")
    }

    async fn write(&self, session: &Session) -> Result<(), SessionError> {
        let payload = serde_json::to_string(session)?;
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(Self::key(&session.id))
            .arg(payload)
            .arg("EX")
            .arg(self.config.ttl.as_secs())
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| SessionError::Backend(e.to_string()))
    }

    async fn read(&self, id: &str) -> Result<Option<Session>, SessionError> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn
            .get(Self::key(id))
            .await
            .map_err(|e| SessionError::Backend(e.to_string()))?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(&self, metadata: Option<serde_json::Value>) -> Result<Session, SessionError> {
        let session = Session::fresh(metadata);
        self.write(&session).await?;
        Ok(session)
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, SessionError> {
        self.read(id).await
    }

    async fn add_message(&self, id: &str, message: SessionMessage) -> Result<bool, SessionError> {
        let Some(mut session) = self.read(id).await? else {
            return Ok(false);
        };
        session.push_trimmed(message, self.config.max_messages);
        self.write(&session).await?;
        Ok(true)
    }

    async fn history(&self, id: &str) -> Result<Vec<SessionMessage>, SessionError> {
        Ok(self
            .read(id)
            .await?
            .map(|session| session.messages)
            .unwrap_or_default())
    }

    async fn delete(&self, id: &str) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(Self::key(id))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| SessionError::Backend(e.to_string()))
    }

    async fn active_count(&self) -> Result<usize, SessionError> {
        let mut conn = self.conn.clone();
        let mut iter = conn
            .scan_match::<_, String>(format!("{KEY_PREFIX}*"))
            .await
            .map_err(|e| SessionError::Backend(e.to_string()))?;
        let mut count = 0usize;
        while iter.next_item().await.is_some() {
            count += 1;
        }
        Ok(count)
    }
}
