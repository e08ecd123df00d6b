//! Catalog rendering for LLM prompts, and the provider seam.
//!
//! [`format_for_llm`] is a pure function of the snapshot: same snapshot,
//! same text. Internal capabilities are excluded so the orchestrator never
//! advertises itself to itself.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use super::{CatalogHandle, CatalogSnapshot};
use crate::discovery::{Capability, FieldHint, ServiceRecord};

/// Renders the non-internal part of a snapshot as the planner's catalog
/// block. Deterministic: services sorted by name then id, capabilities in
/// declaration order.
pub fn format_for_llm(snapshot: &CatalogSnapshot) -> String {
    let mut out = String::new();
    for service in snapshot.services_sorted() {
        let visible: Vec<&Capability> = service
            .capabilities
            .iter()
            .filter(|c| !c.internal)
            .collect();
        if visible.is_empty() {
            continue;
        }
        let _ = writeln!(out, "Agent: {} (id: {})", service.name, service.id);
        for capability in visible {
            let _ = writeln!(out, "  - Capability: {}", capability.name);
            if !capability.description.is_empty() {
                let _ = writeln!(out, "      Description: {}", capability.description);
            }
            if let Some(schema) = &capability.input_schema_summary {
                let mut params = Vec::new();
                for field in &schema.required {
                    params.push(render_field(field, "required"));
                }
                for field in &schema.optional {
                    params.push(render_field(field, "optional"));
                }
                if !params.is_empty() {
                    let _ = writeln!(out, "      Parameters: {}", params.join(", "));
                }
            }
            if let Some(returns) = &capability.returns {
                let _ = writeln!(out, "      Returns: {}", returns);
            }
        }
    }
    out
}

fn render_field(field: &FieldHint, requirement: &str) -> String {
    match &field.example {
        Some(example) => format!(
            "{} ({}, {}, example={})",
            field.name, field.field_type, requirement, example
        ),
        None => format!("{} ({}, {})", field.name, field.field_type, requirement),
    }
}

/// Catalog provider errors.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog search backend: {0}")]
    Search(String),
}

/// Source of the catalog text for one planning request.
///
/// The default provider emits the whole catalog; the search provider asks an
/// external semantic-search service for the capabilities most relevant to
/// the user query — useful once the fleet has hundreds of tools.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn catalog_for_request(&self, query: &str) -> Result<String, CatalogError>;
}

/// Emits the entire current snapshot, ignoring the query.
pub struct DefaultCatalogProvider {
    handle: CatalogHandle,
}

impl DefaultCatalogProvider {
    pub fn new(handle: CatalogHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl CatalogProvider for DefaultCatalogProvider {
    async fn catalog_for_request(&self, _query: &str) -> Result<String, CatalogError> {
        Ok(format_for_llm(&self.handle.load()))
    }
}

/// Forwards the query to a semantic-search endpoint and renders only the
/// top-K hits. Falls back to the full catalog when the search service is
/// unreachable, since a degraded catalog beats no catalog.
pub struct SearchCatalogProvider {
    handle: CatalogHandle,
    client: reqwest::Client,
    endpoint: String,
    top_k: usize,
}

#[derive(Debug, serde::Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    service_id: String,
    capability: String,
}

impl SearchCatalogProvider {
    pub fn new(handle: CatalogHandle, endpoint: String, top_k: usize) -> Self {
        Self {
            handle,
            client: reqwest::Client::new(),
            endpoint,
            top_k,
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, CatalogError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SearchRequest {
                query,
                top_k: self.top_k,
            })
            .send()
            .await
            .map_err(|e| CatalogError::Search(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CatalogError::Search(format!(
                "search endpoint returned {}",
                response.status()
            )));
        }
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Search(e.to_string()))?;
        Ok(parsed.results)
    }
}

#[async_trait]
impl CatalogProvider for SearchCatalogProvider {
    async fn catalog_for_request(&self, query: &str) -> Result<String, CatalogError> {
        let snapshot = self.handle.load();
        let hits = match self.search(query).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "catalog search failed, falling back to full catalog");
                return Ok(format_for_llm(&snapshot));
            }
        };

        // Rebuild a reduced snapshot holding only the matched capabilities,
        // then reuse the canonical formatter.
        let mut reduced: Vec<ServiceRecord> = Vec::new();
        for hit in hits {
            let Some(service) = snapshot.service(&hit.service_id) else {
                continue;
            };
            let Some(capability) = service
                .capabilities
                .iter()
                .find(|c| c.name == hit.capability && !c.internal)
            else {
                continue;
            };
            match reduced.iter_mut().find(|s| s.id == service.id) {
                Some(existing) => {
                    if !existing.capabilities.iter().any(|c| c.name == capability.name) {
                        existing.capabilities.push(capability.clone());
                    }
                }
                None => {
                    let mut trimmed = service.clone();
                    trimmed.capabilities = vec![capability.clone()];
                    reduced.push(trimmed);
                }
            }
        }
        Ok(format_for_llm(&CatalogSnapshot::from_services(reduced)))
    }
}
