//! In-memory registry for tests and single-process runs.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use super::{DiscoveryFilter, Registry, RegistryError, ServiceRecord};

/// DashMap-backed [`Registry`] with lazy TTL eviction.
pub struct InMemoryRegistry {
    services: DashMap<String, Entry>,
    ttl: Duration,
}

struct Entry {
    record: ServiceRecord,
    expires_at: Instant,
}

impl InMemoryRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            services: DashMap::new(),
            ttl,
        }
    }

    fn sweep(&self) {
        let now = Instant::now();
        self.services.retain(|_, entry| entry.expires_at > now);
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn register(&self, mut record: ServiceRecord) -> Result<(), RegistryError> {
        record.last_seen = Utc::now();
        self.services.insert(
            record.id.clone(),
            Entry {
                record,
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(())
    }

    async fn deregister(&self, id: &str) -> Result<(), RegistryError> {
        self.services.remove(id);
        Ok(())
    }

    async fn heartbeat(&self, id: &str) -> Result<(), RegistryError> {
        let mut entry = self
            .services
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        entry.expires_at = Instant::now() + self.ttl;
        entry.record.last_seen = Utc::now();
        Ok(())
    }

    async fn discover(&self, filter: &DiscoveryFilter) -> Result<Vec<ServiceRecord>, RegistryError> {
        self.sweep();
        let mut records: Vec<ServiceRecord> = self
            .services
            .iter()
            .filter(|entry| filter.matches(&entry.record))
            .map(|entry| entry.record.clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::record;
    use super::*;

    #[tokio::test]
    async fn register_discover_deregister() {
        let registry = InMemoryRegistry::default();
        registry
            .register(record("svc-1", "weather-tool", &["forecast"]))
            .await
            .unwrap();
        registry
            .register(record("svc-2", "geo-tool", &["geocode"]))
            .await
            .unwrap();

        let all = registry.discover(&DiscoveryFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        registry.deregister("svc-1").await.unwrap();
        let all = registry.discover(&DiscoveryFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "svc-2");
    }

    /// **Scenario**: re-registering the same id overwrites the record.
    #[tokio::test]
    async fn duplicate_id_overwrites() {
        let registry = InMemoryRegistry::default();
        registry
            .register(record("svc-1", "weather-tool", &["forecast"]))
            .await
            .unwrap();
        registry
            .register(record("svc-1", "weather-tool-v2", &["forecast"]))
            .await
            .unwrap();

        let all = registry.discover(&DiscoveryFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "weather-tool-v2");
    }

    /// **Scenario**: records expire after the TTL unless heartbeaten.
    #[tokio::test]
    async fn expiry_and_heartbeat() {
        let registry = InMemoryRegistry::new(Duration::from_millis(40));
        registry
            .register(record("svc-1", "weather-tool", &["forecast"]))
            .await
            .unwrap();
        registry
            .register(record("svc-2", "geo-tool", &["geocode"]))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(25)).await;
        registry.heartbeat("svc-2").await.unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;

        let all = registry.discover(&DiscoveryFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1, "svc-1 expired, svc-2 refreshed");
        assert_eq!(all[0].id, "svc-2");
    }

    #[tokio::test]
    async fn heartbeat_unknown_id_is_not_found() {
        let registry = InMemoryRegistry::default();
        let err = registry.heartbeat("ghost").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(id) if id == "ghost"));
    }
}
