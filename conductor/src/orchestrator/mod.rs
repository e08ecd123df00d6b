//! The per-request pipeline: history → plan → execute → synthesize.
//!
//! One [`Orchestrator::run_chat`] call drives a whole chat turn, emitting
//! [`ChatEvent`]s through an mpsc channel the SSE gateway writes out. Every
//! terminal outcome produces exactly one `done` or one `error` frame, never
//! both. Statistics accumulate for `/health`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use sse_event::{ChatEvent, StatusStep};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::OrchestratorError;
use crate::executor::Executor;
use crate::plan::{ExecutionResult, RoutingPlan, StepResult, StreamingStats};
use crate::planner::Planner;
use crate::session::{SessionMessage, SessionStore};
use crate::synthesizer::{SynthesisOutput, Synthesizer};

/// Orchestrator-level configuration.
#[derive(Clone, Debug, Default)]
pub struct OrchestratorConfig {
    /// Reported by `/health` alongside the stats.
    pub provider_name: String,
}

/// Process-lifetime request counters.
#[derive(Debug, Default)]
pub struct OrchestratorStats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
}

/// Serializable view of [`OrchestratorStats`] for `/health`.
#[derive(Clone, Debug, Serialize)]
pub struct StatsSnapshot {
    pub status: &'static str,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
}

impl OrchestratorStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            status: "running",
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
        }
    }
}

/// Drives chat requests through planning, execution, and synthesis.
pub struct Orchestrator {
    planner: Planner,
    executor: Executor,
    synthesizer: Synthesizer,
    sessions: Arc<dyn SessionStore>,
    stats: Arc<OrchestratorStats>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        planner: Planner,
        executor: Executor,
        synthesizer: Synthesizer,
        sessions: Arc<dyn SessionStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            planner,
            executor,
            synthesizer,
            sessions,
            stats: Arc::new(OrchestratorStats::default()),
            config,
        }
    }

    pub fn stats(&self) -> Arc<OrchestratorStats> {
        self.stats.clone()
    }

    pub fn provider_name(&self) -> &str {
        &self.config.provider_name
    }

    /// Runs one chat turn for an existing session.
    ///
    /// All progress is delivered through `events`; the final frame is `done`
    /// on success or `error` on any terminal failure. The return value
    /// mirrors the outcome for callers that want it (tests, non-streaming
    /// surfaces).
    pub async fn run_chat(
        &self,
        session_id: &str,
        message: &str,
        events: mpsc::Sender<ChatEvent>,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, OrchestratorError> {
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);
        let outcome = self
            .run_pipeline(session_id, message, &events, &cancel)
            .await;

        match &outcome {
            Ok(result) => {
                self.stats
                    .successful_requests
                    .fetch_add(1, Ordering::Relaxed);
                let _ = events
                    .send(ChatEvent::Done {
                        request_id: result.request_id.clone(),
                        tools_used: result.agents_involved.clone(),
                        total_duration_ms: result.execution_time_ms,
                    })
                    .await;
            }
            Err(error) => {
                self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
                warn!(code = error.code(), error = %error, "chat request failed");
                let _ = events.send(error.to_event()).await;
            }
        }
        outcome
    }

    async fn run_pipeline(
        &self,
        session_id: &str,
        message: &str,
        events: &mpsc::Sender<ChatEvent>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, OrchestratorError> {
        if message.trim().is_empty() {
            return Err(OrchestratorError::Validation(
                "message must not be empty".to_string(),
            ));
        }

        let request_id = format!("req-{}", Uuid::new_v4());
        let started = Instant::now();

        // History first, then the user turn, so the prompt does not repeat
        // the current request as context.
        let history = self
            .sessions
            .history(session_id)
            .await
            .map_err(|e| OrchestratorError::ServiceUnavailable(e.to_string()))?;
        if !self
            .sessions
            .add_message(session_id, SessionMessage::user(message))
            .await
            .map_err(|e| OrchestratorError::ServiceUnavailable(e.to_string()))?
        {
            return Err(OrchestratorError::Validation(format!(
                "unknown session: {session_id}"
            )));
        }

        // Planning.
        let _ = events
            .send(ChatEvent::Status {
                step: StatusStep::Planning,
                message: "analyzing request and selecting tools".to_string(),
            })
            .await;
        if cancel.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }
        let plan = tokio::select! {
            _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
            plan = self.planner.plan(message, &history) => plan?,
        };

        // Execution.
        let results = if plan.steps.is_empty() {
            Vec::new()
        } else {
            let _ = events
                .send(ChatEvent::Status {
                    step: StatusStep::Executing,
                    message: format!("running {} step(s)", plan.steps.len()),
                })
                .await;
            let step_events = events.clone();
            let callback = move |_index: usize,
                                 _total: usize,
                                 step: &crate::plan::RoutingStep,
                                 result: &StepResult| {
                let _ = step_events.try_send(ChatEvent::Step {
                    step_id: result.step_id.clone(),
                    tool: step.agent_name.clone(),
                    success: result.success,
                    duration_ms: result.duration_ms,
                });
            };
            self.executor
                .execute(&plan, &request_id, &HashMap::new(), cancel, Some(&callback))
                .await
        };
        if cancel.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        // Synthesis.
        let _ = events
            .send(ChatEvent::Status {
                step: StatusStep::Synthesizing,
                message: "composing the answer".to_string(),
            })
            .await;
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<crate::llm::MessageChunk>(64);
        let chunk_events = events.clone();
        let chunk_forwarder = tokio::spawn(async move {
            while let Some(chunk) = chunk_rx.recv().await {
                if chunk_events
                    .send(ChatEvent::Chunk {
                        text: chunk.content,
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        let synthesis = tokio::select! {
            _ = cancel.cancelled() => Err(OrchestratorError::Cancelled),
            synthesis = self
                .synthesizer
                .synthesize(message, &plan, &results, Some(chunk_tx)) => synthesis,
        };
        let _ = chunk_forwarder.await;
        let synthesis = synthesis?;
        if cancel.is_cancelled() {
            // The client went away mid-synthesis; whatever was produced is
            // discarded, nothing is persisted.
            return Err(OrchestratorError::Cancelled);
        }

        if synthesis.partial {
            self.persist_assistant_turn(session_id, &request_id, &plan, &results, &synthesis, true)
                .await;
            return Err(OrchestratorError::StreamPartiallyCompleted(format!(
                "{} chunk(s) delivered before the stream broke",
                synthesis.chunks_delivered
            )));
        }

        if let Some(usage) = synthesis.usage {
            let _ = events
                .send(ChatEvent::Usage {
                    prompt_tokens: usage.prompt_tokens,
                    completion_tokens: usage.completion_tokens,
                    total_tokens: usage.total_tokens,
                })
                .await;
        }
        if let Some(reason) = &synthesis.finish_reason {
            let _ = events
                .send(ChatEvent::Finish {
                    reason: reason.clone(),
                })
                .await;
        }

        self.persist_assistant_turn(session_id, &request_id, &plan, &results, &synthesis, false)
            .await;

        let successful = results.iter().filter(|r| r.success).count();
        let confidence = if results.is_empty() {
            1.0
        } else {
            successful as f64 / results.len() as f64
        };
        let result = ExecutionResult {
            request_id: request_id.clone(),
            response: synthesis.text.clone(),
            agents_involved: agents_involved(&plan, &results),
            confidence,
            execution_time_ms: started.elapsed().as_millis() as u64,
            results,
            streaming: Some(StreamingStats {
                chunks_delivered: synthesis.chunks_delivered,
                stream_completed: synthesis.completed,
                partial_content: synthesis.partial,
                finish_reason: synthesis.finish_reason.clone(),
                usage: synthesis.usage,
            }),
        };
        info!(
            request_id = %request_id,
            steps = result.results.len(),
            confidence = result.confidence,
            duration_ms = result.execution_time_ms,
            "chat request complete"
        );
        Ok(result)
    }

    async fn persist_assistant_turn(
        &self,
        session_id: &str,
        request_id: &str,
        plan: &RoutingPlan,
        results: &[StepResult],
        synthesis: &SynthesisOutput,
        partial: bool,
    ) {
        let metadata = serde_json::json!({
            "request_id": request_id,
            "tools_used": agents_involved(plan, results),
            "partial": partial,
        });
        let message = SessionMessage::assistant(&synthesis.text).with_metadata(metadata);
        if let Err(e) = self.sessions.add_message(session_id, message).await {
            warn!(session = %session_id, error = %e, "failed to persist assistant turn");
        }
    }
}

/// Service names that actually ran, in plan order, deduplicated.
fn agents_involved(plan: &RoutingPlan, results: &[StepResult]) -> Vec<String> {
    let mut agents = Vec::new();
    for result in results {
        if let Some(step) = plan.step(&result.step_id) {
            if !agents.contains(&step.agent_name) {
                agents.push(step.agent_name.clone());
            }
        }
    }
    agents
}
