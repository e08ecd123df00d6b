//! LLM client abstraction for planning and synthesis.
//!
//! The planner and synthesizer depend on a callable that turns a prompt into
//! assistant text; this module defines the trait, the request options, and
//! the concrete clients.
//!
//! # Streaming Support
//!
//! `LlmClient::stream()` accepts an optional `Sender<MessageChunk>` for
//! emitting tokens as they arrive. Implementations that support streaming
//! ([`OpenAiCompatClient`]) send each delta through the channel; others can
//! rely on the default implementation that calls `generate()` and sends the
//! full content as one chunk.

mod alias;
mod chain;
mod detect;
mod mock;
mod openai_compat;
mod providers;
mod sse_buffer;

pub use alias::resolve_model;
pub use chain::ProviderChain;
pub use detect::{detect_providers, DetectedProvider};
pub use mock::MockLlm;
pub use openai_compat::{OpenAiCompatClient, OpenAiCompatConfig};
pub use providers::{provider_spec, ProviderSpec};

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Request options for one LLM call.
///
/// `model` may be a concrete model name or an alias (`fast`, `smart`,
/// `code`, `vision`, `default`); aliases are resolved per provider by
/// [`resolve_model`] at request time.
#[derive(Clone, Debug)]
pub struct GenerateOptions {
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            model: None,
            system_prompt: None,
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

/// Token usage for one LLM call (prompt + completion).
#[derive(Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One delta of streamed assistant text.
#[derive(Clone, Debug)]
pub struct MessageChunk {
    pub content: String,
}

/// Response from an LLM completion.
///
/// When `partial` is true the call was interrupted mid-stream after some
/// content had been received; `content` holds everything seen so far.
#[derive(Clone, Debug)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub provider: String,
    pub usage: Option<LlmUsage>,
    pub finish_reason: Option<String>,
    pub partial: bool,
}

/// Errors from one LLM provider call.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The provider has no credentials and requires them.
    #[error("provider {0} is not configured")]
    NotConfigured(String),

    /// The provider rejected the credentials (401/403).
    #[error("authentication failed for {provider}: {message}")]
    Auth { provider: String, message: String },

    /// 429 from the provider; `retry_after` honors the response header.
    #[error("rate limited by {provider}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    /// Non-success HTTP status other than auth/rate-limit.
    #[error("HTTP {status} from {provider}: {message}")]
    Http {
        provider: String,
        status: u16,
        message: String,
    },

    /// Connection, DNS, or timeout failure.
    #[error("transport error talking to {provider}: {message}")]
    Transport { provider: String, message: String },

    /// The body did not match the expected wire shape.
    #[error("invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    /// Retries were exhausted on transient errors.
    #[error("{provider} failed after {attempts} attempt(s): {last}")]
    Exhausted {
        provider: String,
        attempts: u32,
        last: String,
    },

    /// The caller went away mid-call.
    #[error("llm call cancelled")]
    Cancelled,
}

impl LlmError {
    /// Hard failures make the provider chain advance to the next provider:
    /// missing/rejected credentials and exhausted transport retries. Rate
    /// limits and malformed bodies are provider-local conditions the caller
    /// may retry; cancellation always fails fast.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            LlmError::NotConfigured(_) | LlmError::Auth { .. } | LlmError::Exhausted { .. }
        )
    }
}

/// LLM client: prompt in, assistant text out, with optional token streaming.
///
/// Implementations: [`OpenAiCompatClient`] (real API), [`ProviderChain`]
/// (failover wrapper), [`MockLlm`] (scripted, for tests).
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name reported in responses and health output.
    fn provider_name(&self) -> &str;

    /// One complete round trip. Retries transient failures internally.
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<LlmResponse, LlmError>;

    /// Streaming variant. When `chunk_tx` is `Some`, implementations send
    /// each delta through the channel as it arrives; the returned response
    /// still carries the full content. Never retried once the response body
    /// has begun.
    ///
    /// Default implementation calls `generate()` and sends the full content
    /// as a single chunk.
    async fn stream(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        chunk_tx: Option<mpsc::Sender<MessageChunk>>,
    ) -> Result<LlmResponse, LlmError> {
        let response = self.generate(prompt, options).await?;
        if let Some(tx) = chunk_tx {
            if !response.content.is_empty() {
                let _ = tx
                    .send(MessageChunk {
                        content: response.content.clone(),
                    })
                    .await;
            }
        }
        Ok(response)
    }
}

/// Serializes tests that mutate process environment variables; the harness
/// runs tests on parallel threads and the environment is process-global.
#[cfg(test)]
pub(crate) fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
