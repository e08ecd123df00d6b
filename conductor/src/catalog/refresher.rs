//! Background refresher: periodically rebuilds the catalog snapshot from
//! discovery plus each service's capability manifest.
//!
//! A fetch failure keeps the service's previous snapshot entry
//! (stale-but-usable); the service is dropped only after
//! `failure_threshold` consecutive failures or when discovery no longer
//! lists it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{CatalogHandle, CatalogSnapshot};
use crate::discovery::{Capability, DiscoveryFilter, Registry, ServiceRecord};

/// Wire shape of `GET /api/capabilities`.
#[derive(Debug, Deserialize)]
struct CapabilityManifest {
    #[serde(default)]
    capabilities: Vec<Capability>,
}

/// Periodic catalog rebuild task.
pub struct CatalogRefresher {
    registry: Arc<dyn Registry>,
    handle: CatalogHandle,
    client: reqwest::Client,
    interval: Duration,
    failure_threshold: u32,
    failures: HashMap<String, u32>,
}

impl CatalogRefresher {
    /// Creates a refresher that runs every `interval` and tolerates
    /// `failure_threshold - 1` consecutive fetch failures per service.
    pub fn new(
        registry: Arc<dyn Registry>,
        handle: CatalogHandle,
        interval: Duration,
        failure_threshold: u32,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            registry,
            handle,
            client,
            interval,
            failure_threshold: failure_threshold.max(1),
            failures: HashMap::new(),
        }
    }

    /// Spawns the refresh loop. Returns a handle that can be aborted for
    /// shutdown. Runs one refresh immediately so the catalog is usable
    /// before the first interval elapses.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                self.refresh_once().await;
            }
        })
    }

    /// One refresh cycle: discover, fetch manifests, swap the snapshot.
    pub async fn refresh_once(&mut self) {
        let discovered = match self.registry.discover(&DiscoveryFilter::default()).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "discovery failed, keeping previous catalog");
                return;
            }
        };

        let previous = self.handle.load();
        let mut services = Vec::with_capacity(discovered.len());
        let mut live_ids = Vec::with_capacity(discovered.len());

        for mut record in discovered {
            live_ids.push(record.id.clone());
            match self.fetch_manifest(&record).await {
                Ok(capabilities) => {
                    self.failures.remove(&record.id);
                    record.capabilities = capabilities;
                    services.push(record);
                }
                Err(e) => {
                    let count = self.failures.entry(record.id.clone()).or_insert(0);
                    *count += 1;
                    if let Some(stale) = previous.service(&record.id) {
                        if *count < self.failure_threshold {
                            warn!(
                                service = %record.id,
                                consecutive_failures = *count,
                                error = %e,
                                "capability fetch failed, keeping stale entry"
                            );
                            services.push(stale.clone());
                            continue;
                        }
                    }
                    warn!(
                        service = %record.id,
                        consecutive_failures = *count,
                        error = %e,
                        "capability fetch failed, dropping service from catalog"
                    );
                }
            }
        }

        // Forget failure counts for services discovery no longer lists.
        self.failures.retain(|id, _| live_ids.contains(id));

        debug!(services = services.len(), "catalog snapshot rebuilt");
        self.handle.store(CatalogSnapshot::from_services(services));
    }

    async fn fetch_manifest(&self, record: &ServiceRecord) -> Result<Vec<Capability>, String> {
        let url = format!("{}/api/capabilities", record.base_url());
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        let manifest: CapabilityManifest = response.json().await.map_err(|e| e.to_string())?;
        Ok(manifest.capabilities)
    }
}
