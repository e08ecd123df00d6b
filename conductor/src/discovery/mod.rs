//! Service discovery: the fleet model and the registry contract.
//!
//! A [`ServiceRecord`] describes one remote tool or agent and the
//! capabilities it exposes. Records live in a registry under a TTL and stay
//! alive through heartbeats; the capability catalog rebuilds its snapshot
//! from `discover` each refresh cycle.

mod memory;
mod redis;

pub use self::redis::RedisRegistry;
pub use memory::InMemoryRegistry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of remote service: a leaf tool, or an agent that may orchestrate
/// other services itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Tool,
    Agent,
}

/// Type/example hint for one input field of a capability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldHint {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Required/optional field hints for a capability's JSON body.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSummary {
    #[serde(default)]
    pub required: Vec<FieldHint>,
    #[serde(default)]
    pub optional: Vec<FieldHint>,
}

/// One named operation a service exposes over HTTP.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Explicit endpoint path; defaults to `/api/capabilities/<name>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema_summary: Option<SchemaSummary>,
    /// Free-text description of the response shape, shown in the catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
    /// Internal capabilities are callable but hidden from the LLM catalog,
    /// which keeps the orchestrator from routing requests to itself.
    #[serde(default)]
    pub internal: bool,
}

impl Capability {
    /// Path this capability is served at.
    pub fn endpoint_path(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("/api/capabilities/{}", self.name))
    }
}

/// One registered service instance.
///
/// The same `id` across replicas refers to the same logical service; a
/// registration with a duplicate `id` overwrites the previous record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    pub last_seen: DateTime<Utc>,
}

impl ServiceRecord {
    /// Base URL for invoking this service's capabilities.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

/// Selection criteria for [`Registry::discover`]. Empty filter matches all.
#[derive(Clone, Debug, Default)]
pub struct DiscoveryFilter {
    pub service_type: Option<ServiceType>,
    pub name: Option<String>,
    pub capability: Option<String>,
}

impl DiscoveryFilter {
    pub fn matches(&self, record: &ServiceRecord) -> bool {
        if let Some(t) = self.service_type {
            if record.service_type != t {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if &record.name != name {
                return false;
            }
        }
        if let Some(capability) = &self.capability {
            if !record.capabilities.iter().any(|c| &c.name == capability) {
                return false;
            }
        }
        true
    }
}

/// Registry backend errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry backend: {0}")]
    Backend(String),
    #[error("service not found: {0}")]
    NotFound(String),
    #[error("record serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Name→service-record mapping with TTL semantics.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Stores (or overwrites) a record and starts its TTL.
    async fn register(&self, record: ServiceRecord) -> Result<(), RegistryError>;

    /// Removes a record immediately.
    async fn deregister(&self, id: &str) -> Result<(), RegistryError>;

    /// Refreshes the TTL of an existing record.
    async fn heartbeat(&self, id: &str) -> Result<(), RegistryError>;

    /// Returns live records matching `filter`.
    async fn discover(&self, filter: &DiscoveryFilter) -> Result<Vec<ServiceRecord>, RegistryError>;
}
