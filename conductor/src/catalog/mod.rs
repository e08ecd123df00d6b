//! Capability catalog: the fleet as the planner sees it.
//!
//! The catalog is an immutable [`CatalogSnapshot`] rebuilt by the background
//! [`CatalogRefresher`] and published through [`CatalogHandle`] by atomic
//! `Arc` replacement. Readers clone the `Arc` and never observe a half-built
//! snapshot.

mod format;
mod refresher;

pub use format::{format_for_llm, CatalogProvider, DefaultCatalogProvider, SearchCatalogProvider};
pub use refresher::CatalogRefresher;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::discovery::{Capability, ServiceRecord, ServiceType};

/// Immutable view of the current fleet.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    services_by_id: HashMap<String, ServiceRecord>,
    capability_index: HashMap<String, Vec<String>>,
}

impl CatalogSnapshot {
    /// Builds a snapshot, indexing capabilities by name.
    pub fn from_services(services: Vec<ServiceRecord>) -> Self {
        let mut services_by_id = HashMap::with_capacity(services.len());
        let mut capability_index: HashMap<String, Vec<String>> = HashMap::new();
        for service in services {
            for capability in &service.capabilities {
                capability_index
                    .entry(capability.name.clone())
                    .or_default()
                    .push(service.id.clone());
            }
            services_by_id.insert(service.id.clone(), service);
        }
        for ids in capability_index.values_mut() {
            ids.sort();
        }
        Self {
            services_by_id,
            capability_index,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.services_by_id.is_empty()
    }

    pub fn len(&self) -> usize {
        self.services_by_id.len()
    }

    pub fn service(&self, id: &str) -> Option<&ServiceRecord> {
        self.services_by_id.get(id)
    }

    /// Looks a service up by its human name (what plans reference).
    pub fn service_by_name(&self, name: &str) -> Option<&ServiceRecord> {
        self.services_by_id.values().find(|s| s.name == name)
    }

    /// The capability `name` on the service named `service_name`, if both exist.
    pub fn capability(&self, service_name: &str, name: &str) -> Option<&Capability> {
        self.service_by_name(service_name)
            .and_then(|s| s.capabilities.iter().find(|c| c.name == name))
    }

    /// Service ids exposing the given capability name.
    pub fn providers_of(&self, capability: &str) -> &[String] {
        self.capability_index
            .get(capability)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All services sorted by name then id, for deterministic output.
    pub fn services_sorted(&self) -> Vec<&ServiceRecord> {
        let mut services: Vec<&ServiceRecord> = self.services_by_id.values().collect();
        services.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        services
    }

    /// Services of one type, sorted, for the `/discover` grouping.
    pub fn services_of_type(&self, service_type: ServiceType) -> Vec<&ServiceRecord> {
        self.services_sorted()
            .into_iter()
            .filter(|s| s.service_type == service_type)
            .collect()
    }
}

/// Shared handle to the active snapshot.
///
/// `load` clones the inner `Arc`; `store` swaps it. Neither holds the lock
/// while the snapshot is in use.
#[derive(Clone, Default)]
pub struct CatalogHandle {
    current: Arc<RwLock<Arc<CatalogSnapshot>>>,
}

impl CatalogHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle pre-populated with a snapshot (tests, static fleets).
    pub fn with_snapshot(snapshot: CatalogSnapshot) -> Self {
        let handle = Self::new();
        handle.store(snapshot);
        handle
    }

    /// Current snapshot; cheap, lock held only for the `Arc` clone.
    pub fn load(&self) -> Arc<CatalogSnapshot> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Publishes a new snapshot atomically.
    pub fn store(&self, snapshot: CatalogSnapshot) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(snapshot);
    }
}
