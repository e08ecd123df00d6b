//! Plan execution: dependency levels, bounded parallelism, timeouts, retries.
//!
//! Steps run level by level: level 0 has no dependencies, level k depends
//! only on earlier levels. Within a level all steps run concurrently,
//! bounded by a semaphore. A failed step never aborts the plan; its
//! dependents fail at template resolution and independent branches keep
//! going. A per-step callback lets the gateway emit incremental `step`
//! events as results land.

mod template;

pub use template::{resolve_parameters, SubstitutionContext, TemplateError};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::catalog::{CatalogHandle, CatalogSnapshot};
use crate::plan::{dag, RoutingPlan, RoutingStep, StepResult};

/// Executor knobs.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Concurrent steps within one level.
    pub max_concurrency: usize,
    /// Deadline for one step attempt.
    pub step_timeout: Duration,
    /// Deadline for the whole plan; the tightest deadline wins.
    pub total_timeout: Duration,
    /// Extra attempts per step on transient errors.
    pub retry_attempts: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            step_timeout: Duration::from_secs(60),
            total_timeout: Duration::from_secs(180),
            retry_attempts: 2,
        }
    }
}

/// Per-step completion callback: `(completed_count, total, step, result)`.
pub type StepCallback = dyn Fn(usize, usize, &RoutingStep, &StepResult) + Send + Sync;

/// Executes validated plans against the current catalog snapshot.
pub struct Executor {
    client: reqwest::Client,
    catalog: CatalogHandle,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(catalog: CatalogHandle, config: ExecutorConfig) -> Self {
        // Deadlines are set per attempt on the request builder, not on the
        // shared client.
        let client = reqwest::Client::new();
        Self {
            client,
            catalog,
            config,
        }
    }

    /// Runs `plan` to completion (or cancellation/deadline), returning one
    /// result per step in plan order.
    pub async fn execute(
        &self,
        plan: &RoutingPlan,
        request_id: &str,
        inputs: &HashMap<String, Value>,
        cancel: &CancellationToken,
        on_step: Option<&StepCallback>,
    ) -> Vec<StepResult> {
        let total = plan.steps.len();
        let Some(levels) = dag::levels(&plan.steps) else {
            // Validation rejects cycles before execution; a cycle here means
            // the caller skipped validation.
            return plan
                .steps
                .iter()
                .map(|s| failed_result(&s.step_id, "substitution_error: dependency cycle"))
                .collect();
        };

        let snapshot = self.catalog.load();
        let deadline = Instant::now() + self.config.total_timeout;
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let completed = AtomicUsize::new(0);
        let mut outputs: HashMap<String, Value> = HashMap::new();
        let mut results_by_id: HashMap<String, StepResult> = HashMap::with_capacity(total);

        for level in levels {
            let level_outputs = Arc::new(outputs.clone());
            let level_results = Mutex::new(Vec::<StepResult>::new());

            let futures = level.iter().map(|step_id| {
                let step = plan
                    .step(step_id)
                    .expect("level ids come from the plan's own steps");
                let semaphore = semaphore.clone();
                let level_outputs = level_outputs.clone();
                let level_results = &level_results;
                let completed = &completed;
                let snapshot = &snapshot;
                async move {
                    let _permit = semaphore.acquire().await;
                    let result = self
                        .run_step(step, request_id, &level_outputs, inputs, snapshot, deadline, cancel)
                        .await;
                    let index = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(callback) = on_step {
                        callback(index, total, step, &result);
                    }
                    level_results
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .push(result);
                }
            });
            join_all(futures).await;

            for result in level_results
                .into_inner()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
            {
                if result.success {
                    outputs.insert(result.step_id.clone(), result.output.clone());
                }
                results_by_id.insert(result.step_id.clone(), result);
            }
        }

        plan.steps
            .iter()
            .map(|s| {
                results_by_id
                    .remove(&s.step_id)
                    .unwrap_or_else(|| failed_result(&s.step_id, "step never ran"))
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_step(
        &self,
        step: &RoutingStep,
        request_id: &str,
        outputs: &HashMap<String, Value>,
        inputs: &HashMap<String, Value>,
        snapshot: &CatalogSnapshot,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> StepResult {
        let started_at = Utc::now();
        let start = Instant::now();

        if cancel.is_cancelled() {
            return timed_failure(&step.step_id, "cancelled", started_at, start);
        }

        let ctx = SubstitutionContext { outputs, inputs };
        let parameters = match resolve_parameters(&step.parameters, &ctx) {
            Ok(parameters) => parameters,
            Err(e) => {
                return timed_failure(
                    &step.step_id,
                    &format!("substitution_error: {e}"),
                    started_at,
                    start,
                );
            }
        };

        let Some(service) = snapshot.service_by_name(&step.agent_name) else {
            return timed_failure(
                &step.step_id,
                &format!("step_transport_error: service '{}' left the catalog", step.agent_name),
                started_at,
                start,
            );
        };
        let Some(capability) = service.capabilities.iter().find(|c| c.name == step.capability)
        else {
            return timed_failure(
                &step.step_id,
                &format!(
                    "step_transport_error: capability '{}' no longer exposed by '{}'",
                    step.capability, step.agent_name
                ),
                started_at,
                start,
            );
        };
        let url = format!("{}{}", service.base_url(), capability.endpoint_path());

        if let Some(instruction) = &step.instruction {
            debug!(step = %step.step_id, instruction = %instruction, "executing step");
        }

        let mut last_error = String::new();
        for attempt in 0..=self.config.retry_attempts {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return timed_failure(
                    &step.step_id,
                    "step_timeout: plan deadline exceeded",
                    started_at,
                    start,
                );
            }
            let attempt_timeout = self.config.step_timeout.min(remaining);

            let request = self
                .client
                .post(&url)
                .header("x-request-id", request_id)
                .header("x-step-id", &step.step_id)
                .json(&parameters)
                .timeout(attempt_timeout)
                .send();

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    return timed_failure(&step.step_id, "cancelled", started_at, start);
                }
                outcome = request => outcome,
            };

            match outcome {
                Ok(response) if response.status().is_success() => {
                    let text = response.text().await.unwrap_or_default();
                    let output = serde_json::from_str::<Value>(&text)
                        .unwrap_or_else(|_| Value::String(text));
                    let finished_at = Utc::now();
                    return StepResult {
                        step_id: step.step_id.clone(),
                        success: true,
                        output,
                        error: None,
                        duration_ms: start.elapsed().as_millis() as u64,
                        started_at,
                        finished_at,
                    };
                }
                Ok(response) => {
                    let status = response.status();
                    let retry_after = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .map(Duration::from_secs);
                    last_error = format!("step_http_error: HTTP {status}");
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if !retryable || attempt == self.config.retry_attempts {
                        break;
                    }
                    let delay = retry_after
                        .unwrap_or_else(|| Duration::from_millis(500 * (1 << attempt.min(6))));
                    warn!(
                        step = %step.step_id,
                        status = status.as_u16(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "tool returned retryable status"
                    );
                    tokio::time::sleep(delay.min(deadline.saturating_duration_since(Instant::now())))
                        .await;
                }
                Err(e) => {
                    last_error = if e.is_timeout() {
                        format!("step_timeout: {e}")
                    } else {
                        format!("step_transport_error: {e}")
                    };
                    if attempt == self.config.retry_attempts {
                        break;
                    }
                    warn!(step = %step.step_id, attempt, error = %e, "tool call failed, retrying");
                    tokio::time::sleep(Duration::from_millis(500 * (1 << attempt.min(6)))).await;
                }
            }
        }

        timed_failure(&step.step_id, &last_error, started_at, start)
    }
}

fn failed_result(step_id: &str, error: &str) -> StepResult {
    let now = Utc::now();
    StepResult {
        step_id: step_id.to_string(),
        success: false,
        output: Value::Null,
        error: Some(error.to_string()),
        duration_ms: 0,
        started_at: now,
        finished_at: now,
    }
}

fn timed_failure(
    step_id: &str,
    error: &str,
    started_at: chrono::DateTime<Utc>,
    start: Instant,
) -> StepResult {
    StepResult {
        step_id: step_id.to_string(),
        success: false,
        output: Value::Null,
        error: Some(error.to_string()),
        duration_ms: start.elapsed().as_millis() as u64,
        started_at,
        finished_at: Utc::now(),
    }
}
