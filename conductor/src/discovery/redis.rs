//! Redis-backed registry.
//!
//! Records live under `services:<id>` with a per-record TTL; heartbeats
//! refresh the TTL. Sessions use a different key namespace and logical
//! database (see `crate::session::redis`), so the two stores never collide.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{DiscoveryFilter, Registry, RegistryError, ServiceRecord};

const KEY_PREFIX: &str = "services:";

/// [`Registry`] backed by an external Redis.
#[derive(Clone)]
pub struct RedisRegistry {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisRegistry {
    /// Wraps an established connection manager. `ttl` is the per-record
    /// lifetime between heartbeats.
    pub fn new(conn: ConnectionManager, ttl: Duration) -> Self {
        Self { conn, ttl }
    }

    /// Connects to `url` and pings the server once.
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, RegistryError> {
        let client =
            redis::Client::open(url).map_err(|e| RegistryError::Backend(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| RegistryError::Backend(e.to_string()))?;
        Ok(Self::new(conn, ttl))
    }

    fn key(id: &str) -> String {
        format!("{KEY_PREFIX}{id}")
    }
}

fn backend(e: redis::RedisError) -> RegistryError {
    RegistryError::Backend(e.to_string())
}

#[async_trait]
impl Registry for RedisRegistry {
    async fn register(&self, mut record: ServiceRecord) -> Result<(), RegistryError> {
        record.last_seen = Utc::now();
        let payload = serde_json::to_string(&record)?;
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(Self::key(&record.id))
            .arg(payload)
            .arg("EX")
            .arg(self.ttl.as_secs())
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(backend)
    }

    async fn deregister(&self, id: &str) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(Self::key(id))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(backend)
    }

    async fn heartbeat(&self, id: &str) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        let refreshed: i64 = redis::cmd("EXPIRE")
            .arg(Self::key(id))
            .arg(self.ttl.as_secs())
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        if refreshed == 0 {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn discover(&self, filter: &DiscoveryFilter) -> Result<Vec<ServiceRecord>, RegistryError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = {
            let mut iter = conn
                .scan_match::<_, String>(format!("{KEY_PREFIX}*"))
                .await
                .map_err(backend)?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            // A record can expire between SCAN and GET; skip the gap.
            let payload: Option<String> = conn.get(&key).await.map_err(backend)?;
            let Some(payload) = payload else { continue };
            match serde_json::from_str::<ServiceRecord>(&payload) {
                Ok(record) if filter.matches(&record) => records.push(record),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "skipping unparsable service record");
                }
            }
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}
