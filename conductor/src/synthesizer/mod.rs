//! Result synthesis: step outputs in, natural-language reply out.
//!
//! Two strategies share one entry point: with an LLM configured the reply is
//! generated with streaming token pass-through; without one (or when the
//! caller asks for it) a deterministic template join is used. A plan with no
//! steps synthesizes a direct answer from the raw request.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::error::OrchestratorError;
use crate::llm::{GenerateOptions, LlmClient, LlmError, LlmUsage, MessageChunk};
use crate::plan::{RoutingPlan, StepResult};

/// Synthesizer knobs.
#[derive(Clone, Debug)]
pub struct SynthesizerConfig {
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.5,
            max_tokens: 2048,
        }
    }
}

/// What synthesis produced, including streaming metrics.
#[derive(Clone, Debug)]
pub struct SynthesisOutput {
    pub text: String,
    pub chunks_delivered: u64,
    /// True when the stream ran to a clean finish.
    pub completed: bool,
    /// True when the stream broke after some content was delivered.
    pub partial: bool,
    pub finish_reason: Option<String>,
    pub usage: Option<LlmUsage>,
}

/// Combines step outputs into the final reply.
pub struct Synthesizer {
    llm: Option<Arc<dyn LlmClient>>,
    config: SynthesizerConfig,
}

impl Synthesizer {
    /// LLM-backed synthesis with streaming.
    pub fn llm(llm: Arc<dyn LlmClient>, config: SynthesizerConfig) -> Self {
        Self {
            llm: Some(llm),
            config,
        }
    }

    /// Deterministic template synthesis; used when no LLM is configured.
    pub fn template() -> Self {
        Self {
            llm: None,
            config: SynthesizerConfig::default(),
        }
    }

    /// Produces the reply, forwarding each delta to `chunk_tx` when given.
    pub async fn synthesize(
        &self,
        request: &str,
        plan: &RoutingPlan,
        results: &[StepResult],
        chunk_tx: Option<mpsc::Sender<MessageChunk>>,
    ) -> Result<SynthesisOutput, OrchestratorError> {
        let Some(llm) = &self.llm else {
            return Ok(Self::template_join(request, results, chunk_tx).await);
        };

        let prompt = build_synthesis_prompt(request, plan, results);
        let options = GenerateOptions {
            model: self.config.model.clone(),
            system_prompt: None,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        // Count deltas while forwarding them to the caller's channel. If the
        // caller hangs up, dropping the forwarder's receiver propagates the
        // closure to the LLM stream, which unwinds with a partial result.
        let delivered = Arc::new(AtomicU64::new(0));
        let (inner_tx, mut inner_rx) = mpsc::channel::<MessageChunk>(64);
        let forwarder = {
            let delivered = delivered.clone();
            tokio::spawn(async move {
                while let Some(chunk) = inner_rx.recv().await {
                    if let Some(tx) = &chunk_tx {
                        if tx.send(chunk).await.is_err() {
                            break;
                        }
                    }
                    delivered.fetch_add(1, Ordering::Relaxed);
                }
            })
        };

        let outcome = llm.stream(&prompt, &options, Some(inner_tx)).await;
        let _ = forwarder.await;
        let chunks_delivered = delivered.load(Ordering::Relaxed);

        match outcome {
            Ok(response) => Ok(SynthesisOutput {
                text: response.content,
                chunks_delivered,
                completed: !response.partial,
                partial: response.partial,
                finish_reason: response.finish_reason,
                usage: response.usage,
            }),
            Err(LlmError::Cancelled) => Err(OrchestratorError::Cancelled),
            Err(LlmError::RateLimited { .. }) => Err(OrchestratorError::RateLimited(
                "synthesis rate limited".to_string(),
            )),
            Err(e) => {
                warn!(error = %e, "synthesis failed before any content");
                Err(OrchestratorError::SynthesisFailed(e.to_string()))
            }
        }
    }

    /// Deterministic join of step outputs, delivered as one chunk.
    async fn template_join(
        request: &str,
        results: &[StepResult],
        chunk_tx: Option<mpsc::Sender<MessageChunk>>,
    ) -> SynthesisOutput {
        let mut text = String::new();
        if results.is_empty() {
            let _ = write!(text, "I don't have tool results for \"{request}\".");
        } else {
            let _ = writeln!(text, "Here is what I found:");
            for result in results {
                match (&result.success, &result.error) {
                    (true, _) => {
                        let _ = writeln!(
                            text,
                            "- {}: {}",
                            result.step_id,
                            compact_output(&result.output)
                        );
                    }
                    (false, Some(error)) => {
                        let _ = writeln!(text, "- {} failed: {}", result.step_id, error);
                    }
                    (false, None) => {
                        let _ = writeln!(text, "- {} failed", result.step_id);
                    }
                }
            }
        }
        let text = text.trim_end().to_string();

        let mut chunks_delivered = 0;
        if let Some(tx) = chunk_tx {
            if tx
                .send(MessageChunk {
                    content: text.clone(),
                })
                .await
                .is_ok()
            {
                chunks_delivered = 1;
            }
        }
        SynthesisOutput {
            text,
            chunks_delivered,
            completed: true,
            partial: false,
            finish_reason: Some("stop".to_string()),
            usage: None,
        }
    }
}

fn compact_output(output: &serde_json::Value) -> String {
    let rendered = match output {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    const LIMIT: usize = 400;
    if rendered.len() > LIMIT {
        let cut = rendered
            .char_indices()
            .take_while(|(i, _)| *i < LIMIT)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(LIMIT);
        format!("{}…", &rendered[..cut])
    } else {
        rendered
    }
}

fn build_synthesis_prompt(request: &str, plan: &RoutingPlan, results: &[StepResult]) -> String {
    let mut prompt = String::with_capacity(512);
    if results.is_empty() {
        let _ = write!(
            prompt,
            "Answer the user's request directly and concisely.\n\nRequest: {request}"
        );
        return prompt;
    }

    prompt.push_str(
        "Synthesize the tool results below into a clear, conversational answer to the user's \
         request. If a tool failed, acknowledge the missing piece instead of inventing data.\n\n",
    );
    let _ = writeln!(prompt, "Request: {request}\n");
    prompt.push_str("Tool results:\n");
    for result in results {
        let step = plan.step(&result.step_id);
        let label = step
            .map(|s| format!("{} via {}", s.capability, s.agent_name))
            .unwrap_or_else(|| result.step_id.clone());
        if result.success {
            let _ = writeln!(prompt, "- {label}: {}", compact_output(&result.output));
        } else {
            let _ = writeln!(
                prompt,
                "- {label}: FAILED ({})",
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    prompt
}
