//! Provider chain: ordered failover across LLM clients.
//!
//! The chain tries each provider in order and advances only on hard
//! failures (missing/rejected credentials, exhausted transport retries).
//! Cancellation fails fast, and a stream that has already produced content
//! is never restarted on a different provider.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use super::{GenerateOptions, LlmClient, LlmError, LlmResponse, MessageChunk};

/// Failover wrapper over an ordered list of providers.
pub struct ProviderChain {
    providers: Vec<Arc<dyn LlmClient>>,
    name: String,
}

impl ProviderChain {
    /// Builds a chain from an ordered, non-empty provider list.
    pub fn new(providers: Vec<Arc<dyn LlmClient>>) -> Result<Self, LlmError> {
        if providers.is_empty() {
            return Err(LlmError::NotConfigured("provider chain".to_string()));
        }
        let name = providers
            .iter()
            .map(|p| p.provider_name())
            .collect::<Vec<_>>()
            .join(",");
        Ok(Self { providers, name })
    }

    /// Provider names in chain order, for health output.
    pub fn chain_names(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl LlmClient for ProviderChain {
    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<LlmResponse, LlmError> {
        let mut last = None;
        for provider in &self.providers {
            match provider.generate(prompt, options).await {
                Ok(response) => return Ok(response),
                Err(LlmError::Cancelled) => return Err(LlmError::Cancelled),
                Err(err) if err.is_hard() => {
                    warn!(
                        provider = provider.provider_name(),
                        error = %err,
                        "provider failed hard, trying next in chain"
                    );
                    last = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last.unwrap_or_else(|| LlmError::NotConfigured("provider chain".to_string())))
    }

    async fn stream(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        chunk_tx: Option<mpsc::Sender<MessageChunk>>,
    ) -> Result<LlmResponse, LlmError> {
        let mut last = None;
        for provider in &self.providers {
            match provider.stream(prompt, options, chunk_tx.clone()).await {
                Ok(response) => return Ok(response),
                Err(LlmError::Cancelled) => return Err(LlmError::Cancelled),
                Err(err) if err.is_hard() => {
                    // Hard errors surface before any body bytes, so no
                    // partial content has reached the caller yet.
                    warn!(
                        provider = provider.provider_name(),
                        error = %err,
                        "provider failed hard before streaming, trying next in chain"
                    );
                    last = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last.unwrap_or_else(|| LlmError::NotConfigured("provider chain".to_string())))
    }
}
