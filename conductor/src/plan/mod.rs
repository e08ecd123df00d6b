//! Routing plans: what the planner produces and the executor consumes.
//!
//! A plan is a DAG of capability invocations expressed with id lists, never
//! pointers: steps reference each other by `step_id` through `depends_on`.
//! Validation and level computation live in [`dag`].

pub mod dag;

pub use dag::{validate, PlanValidationError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::LlmUsage;

/// How the plan was produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanMode {
    /// Planned by the LLM for a free-form request.
    #[default]
    Autonomous,
    /// Supplied by the caller as a fixed workflow.
    Workflow,
}

/// One capability invocation inside a plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingStep {
    pub step_id: String,
    /// Service name in the catalog (not the id; plans are written against
    /// human names the LLM sees).
    pub agent_name: String,
    pub capability: String,
    /// JSON body for the invocation; values may contain template tokens
    /// resolved from dependency outputs.
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Human note carried into logs, never interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

/// A validated (or to-be-validated) DAG of steps for one request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutingPlan {
    pub plan_id: String,
    pub original_request: String,
    #[serde(default)]
    pub mode: PlanMode,
    pub steps: Vec<RoutingStep>,
    pub created_at: DateTime<Utc>,
}

impl RoutingPlan {
    pub fn step(&self, step_id: &str) -> Option<&RoutingStep> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }
}

/// Outcome of one executed step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub success: bool,
    /// Parsed JSON response when the tool returned JSON, else a string.
    pub output: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Synthesis streaming metrics for one request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StreamingStats {
    pub chunks_delivered: u64,
    pub stream_completed: bool,
    pub partial_content: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<LlmUsage>,
}

/// Final outcome of one orchestrated request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub request_id: String,
    /// Synthesized natural-language reply.
    pub response: String,
    /// Service names that participated, in first-use order.
    pub agents_involved: Vec<String>,
    /// Successful steps over total steps, in `[0, 1]`.
    pub confidence: f64,
    pub execution_time_ms: u64,
    pub results: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming: Option<StreamingStats>,
}
