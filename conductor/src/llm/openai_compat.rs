//! OpenAI-compatible chat completion adapter (`/chat/completions`).
//!
//! One adapter covers OpenAI and the compatible vendors in
//! [`super::providers`] (deepseek, groq, together, xai, qwen, local ollama).
//! All wire types are private to this module; callers see only
//! [`LlmClient`].
//!
//! Credential resolution is three-tier: explicit config, then the provider's
//! key environment variable, then the hardcoded default base URL for keyless
//! endpoints. Resolution reads the environment; it never writes it.
//!
//! Reasoning models (name prefixes `gpt-5`, `o1`, `o3`, `o4` by default) get
//! `max_completion_tokens` (caller budget × multiplier) instead of
//! `max_tokens`, no temperature field, and a `reasoning_content` fallback
//! when `content` comes back empty.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::sse_buffer::SseLineBuffer;
use super::{
    providers, resolve_model, GenerateOptions, LlmClient, LlmError, LlmResponse, LlmUsage,
    MessageChunk,
};

/// Configuration for one [`OpenAiCompatClient`].
#[derive(Clone, Debug)]
pub struct OpenAiCompatConfig {
    /// Vendor alias (`openai`, `groq`, ...). Empty means `openai`.
    pub provider_alias: String,
    /// Explicit API key; wins over the provider's key environment variable.
    pub api_key: Option<String>,
    /// Explicit base URL; wins over `<PROVIDER>_BASE_URL` and the default.
    pub base_url: Option<String>,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Retry budget for `generate` (transient errors only).
    pub max_retries: u32,
    /// Model-name prefixes treated as reasoning models (case-insensitive).
    pub reasoning_prefixes: Vec<String>,
    /// Multiplier applied to the caller token budget for reasoning models.
    pub reasoning_budget_multiplier: u32,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            provider_alias: "openai".to_string(),
            api_key: None,
            base_url: None,
            timeout: Duration::from_secs(120),
            max_retries: 3,
            reasoning_prefixes: vec![
                "gpt-5".to_string(),
                "o1".to_string(),
                "o3".to_string(),
                "o4".to_string(),
            ],
            reasoning_budget_multiplier: 5,
        }
    }
}

impl OpenAiCompatConfig {
    /// Config for a named vendor with everything else at defaults.
    pub fn for_provider(alias: impl Into<String>) -> Self {
        Self {
            provider_alias: alias.into(),
            ..Self::default()
        }
    }
}

/// Adapter for any HTTP endpoint implementing `/chat/completions`.
///
/// Cheap to clone; `reqwest::Client` is reference-counted internally.
#[derive(Clone, Debug)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    config: OpenAiCompatConfig,
    provider: String,
    base_url: String,
    api_key: Option<String>,
    key_required: bool,
}

impl OpenAiCompatClient {
    /// Builds a client, resolving base URL and credentials at construction.
    ///
    /// Unknown vendor aliases are accepted when an explicit `base_url` is
    /// given (bring-your-own endpoint); otherwise they fail with
    /// [`LlmError::NotConfigured`].
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, LlmError> {
        let provider = if config.provider_alias.is_empty() {
            "openai".to_string()
        } else {
            config.provider_alias.clone()
        };
        let spec = providers::provider_spec(&provider);

        let base_url = config
            .base_url
            .clone()
            .or_else(|| std::env::var(providers::base_url_env(&provider)).ok())
            .or_else(|| spec.map(|s| s.base_url.to_string()))
            .ok_or_else(|| LlmError::NotConfigured(provider.clone()))?;

        let key_env = spec.and_then(|s| s.key_env);
        let api_key = config
            .api_key
            .clone()
            .or_else(|| key_env.and_then(|var| std::env::var(var).ok()))
            .filter(|k| !k.is_empty());

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Transport {
                provider: provider.clone(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            // A vendor with a key_env entry requires credentials; explicit
            // base_url overrides (local gateways) do not.
            key_required: key_env.is_some() && config.base_url.is_none(),
            api_key,
            config,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// True when `model` is a reasoning model per the configured prefixes.
    pub fn is_reasoning_model(&self, model: &str) -> bool {
        let lower = model.to_lowercase();
        self.config
            .reasoning_prefixes
            .iter()
            .any(|p| lower.starts_with(&p.to_lowercase()))
    }

    /// Builds the request body for one call. Reasoning models swap
    /// `max_tokens` for a multiplied `max_completion_tokens` and drop the
    /// temperature field.
    fn build_request(&self, model: &str, prompt: &str, options: &GenerateOptions, stream: bool) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &options.system_prompt {
            messages.push(WireMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(WireMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        let reasoning = self.is_reasoning_model(model);
        ChatRequest {
            model: model.to_string(),
            messages,
            temperature: if reasoning { None } else { Some(options.temperature) },
            max_tokens: if reasoning { None } else { Some(options.max_tokens) },
            max_completion_tokens: if reasoning {
                Some(options.max_tokens * self.config.reasoning_budget_multiplier)
            } else {
                None
            },
            stream: stream.then_some(true),
            stream_options: stream.then_some(StreamOptions { include_usage: true }),
        }
    }

    fn resolved_model(&self, options: &GenerateOptions) -> String {
        let requested = options.model.as_deref().unwrap_or("default");
        resolve_model(&self.provider, requested)
    }

    fn require_key(&self) -> Result<(), LlmError> {
        if self.key_required && self.api_key.is_none() {
            return Err(LlmError::NotConfigured(self.provider.clone()));
        }
        Ok(())
    }

    async fn send(&self, body: &ChatRequest) -> Result<reqwest::Response, LlmError> {
        let mut req = self.client.post(self.chat_url()).json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req.send().await.map_err(|e| LlmError::Transport {
            provider: self.provider.clone(),
            message: e.to_string(),
        })
    }

    /// Classifies a non-success status into an error, consuming the body for
    /// the message.
    async fn status_error(&self, response: reqwest::Response) -> LlmError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);

        match status.as_u16() {
            401 | 403 => LlmError::Auth {
                provider: self.provider.clone(),
                message,
            },
            429 => LlmError::RateLimited {
                provider: self.provider.clone(),
                retry_after,
            },
            status => LlmError::Http {
                provider: self.provider.clone(),
                status,
                message,
            },
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(500u64.saturating_mul(1 << attempt.min(6)))
}

/// Transient errors worth another attempt within the same provider.
fn is_transient(err: &LlmError) -> bool {
    match err {
        LlmError::Transport { .. } | LlmError::RateLimited { .. } => true,
        LlmError::Http { status, .. } => *status >= 500,
        _ => false,
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    fn provider_name(&self) -> &str {
        &self.provider
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<LlmResponse, LlmError> {
        self.require_key()?;
        let model = self.resolved_model(options);
        let body = self.build_request(&model, prompt, options, false);

        let mut last: Option<LlmError> = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = match &last {
                    Some(LlmError::RateLimited {
                        retry_after: Some(d),
                        ..
                    }) => *d,
                    _ => backoff_delay(attempt - 1),
                };
                debug!(
                    provider = %self.provider,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying LLM request"
                );
                tokio::time::sleep(delay).await;
            }

            let err = match self.send(&body).await {
                Ok(response) if response.status().is_success() => {
                    let parsed: ChatResponse =
                        response.json().await.map_err(|e| LlmError::InvalidResponse {
                            provider: self.provider.clone(),
                            message: e.to_string(),
                        })?;
                    return Ok(complete_response(parsed, &model, &self.provider));
                }
                Ok(response) => self.status_error(response).await,
                Err(err) => err,
            };

            if !is_transient(&err) {
                return Err(err);
            }
            warn!(provider = %self.provider, attempt, error = %err, "transient LLM error");
            last = Some(err);
        }

        match last {
            Some(err @ LlmError::RateLimited { .. }) => Err(err),
            Some(err) => Err(LlmError::Exhausted {
                provider: self.provider.clone(),
                attempts: self.config.max_retries + 1,
                last: err.to_string(),
            }),
            None => Err(LlmError::Exhausted {
                provider: self.provider.clone(),
                attempts: 0,
                last: "no attempt made".to_string(),
            }),
        }
    }

    async fn stream(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        chunk_tx: Option<mpsc::Sender<MessageChunk>>,
    ) -> Result<LlmResponse, LlmError> {
        self.require_key()?;
        let model = self.resolved_model(options);
        let body = self.build_request(&model, prompt, options, true);

        let response = self.send(&body).await?;
        if !response.status().is_success() {
            return Err(self.status_error(response).await);
        }

        let mut response = response;
        let mut buffer = SseLineBuffer::new();
        let mut content = String::new();
        let mut usage: Option<LlmUsage> = None;
        let mut finish_reason: Option<String> = None;
        let mut done = false;

        'read: loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    // Mid-stream transport failure: keep what we have.
                    if content.is_empty() {
                        return Err(LlmError::Transport {
                            provider: self.provider.clone(),
                            message: e.to_string(),
                        });
                    }
                    warn!(provider = %self.provider, error = %e, "stream broke mid-response");
                    return Ok(LlmResponse {
                        content,
                        model,
                        provider: self.provider.clone(),
                        usage,
                        finish_reason,
                        partial: true,
                    });
                }
            };

            for line in buffer.feed(&chunk) {
                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                let data = data.trim();
                if data == "[DONE]" {
                    done = true;
                    break 'read;
                }
                let parsed: StreamChunk = match serde_json::from_str(data) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!(provider = %self.provider, error = %e, "malformed SSE line, skipping");
                        continue;
                    }
                };
                if let Some(u) = parsed.usage {
                    usage = Some(u.into());
                }
                let Some(choice) = parsed.choices.into_iter().next() else {
                    continue;
                };
                if let Some(reason) = choice.finish_reason {
                    finish_reason = Some(reason);
                }
                let delta = choice
                    .delta
                    .content
                    .filter(|c| !c.is_empty())
                    .or(choice.delta.reasoning_content)
                    .filter(|c| !c.is_empty());
                if let Some(delta) = delta {
                    content.push_str(&delta);
                    if let Some(tx) = &chunk_tx {
                        if tx.send(MessageChunk { content: delta }).await.is_err() {
                            // Receiver dropped: the caller cancelled. Content
                            // is non-empty here (this delta), so report what
                            // was seen rather than a bare cancellation.
                            return Ok(LlmResponse {
                                content,
                                model,
                                provider: self.provider.clone(),
                                usage,
                                finish_reason,
                                partial: true,
                            });
                        }
                    }
                }
            }
        }

        let partial = !done && finish_reason.is_none();
        Ok(LlmResponse {
            content,
            model,
            provider: self.provider.clone(),
            usage,
            finish_reason,
            partial,
        })
    }
}

fn complete_response(parsed: ChatResponse, model: &str, provider: &str) -> LlmResponse {
    let (content, finish_reason) = parsed
        .choices
        .into_iter()
        .next()
        .map(|c| {
            let text = c
                .message
                .content
                .filter(|s| !s.is_empty())
                .or(c.message.reasoning_content)
                .unwrap_or_default();
            (text, c.finish_reason)
        })
        .unwrap_or_default();
    LlmResponse {
        content,
        model: parsed.model.unwrap_or_else(|| model.to_string()),
        provider: provider.to_string(),
        usage: parsed.usage.map(Into::into),
        finish_reason,
        partial: false,
    }
}

// ── Private wire types ──

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<WireUsage> for LlmUsage {
    fn from(u: WireUsage) -> Self {
        LlmUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
