//! Terminal orchestration errors and their wire mapping.
//!
//! Every failure that ends a chat request maps to exactly one SSE `error`
//! frame via [`OrchestratorError::code`] and [`OrchestratorError::retryable`].
//! Layer-local errors (LLM, registry, store) are defined next to their
//! modules and converted here at the pipeline boundary.

use thiserror::Error;

/// Terminal failure of one chat request.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The request itself was malformed (empty message, bad options).
    #[error("invalid request: {0}")]
    Validation(String),

    /// An upstream (LLM or tool) rate limit could not be absorbed by retries.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The planner exhausted its regeneration attempts.
    #[error("planning failed after {attempts} attempt(s): {reason}")]
    PlanningFailed { attempts: u32, reason: String },

    /// A step parameter template referenced output that does not exist.
    #[error("template substitution failed: {0}")]
    Substitution(String),

    /// Synthesis failed before any content was produced.
    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),

    /// Synthesis produced some content, then the stream broke.
    #[error("stream partially completed: {0}")]
    StreamPartiallyCompleted(String),

    /// The catalog is empty or the orchestrator is still initializing.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The caller cancelled the request (disconnect or explicit cancel).
    #[error("request cancelled")]
    Cancelled,
}

impl OrchestratorError {
    /// Stable wire code carried by the SSE `error` frame.
    pub fn code(&self) -> &'static str {
        match self {
            OrchestratorError::Validation(_) => "validation_error",
            OrchestratorError::RateLimited(_) => "rate_limited",
            OrchestratorError::PlanningFailed { .. } => "planning_failed",
            OrchestratorError::Substitution(_) => "substitution_error",
            OrchestratorError::SynthesisFailed(_) => "synthesis_failed",
            OrchestratorError::StreamPartiallyCompleted(_) => "stream_partially_completed",
            OrchestratorError::ServiceUnavailable(_) => "service_unavailable",
            OrchestratorError::Cancelled => "cancelled",
        }
    }

    /// Whether the client may usefully re-send the same message.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::RateLimited(_)
                | OrchestratorError::ServiceUnavailable(_)
                | OrchestratorError::StreamPartiallyCompleted(_)
        )
    }

    /// The SSE `error` frame for this failure.
    pub fn to_event(&self) -> sse_event::ChatEvent {
        sse_event::ChatEvent::Error {
            code: self.code().to_string(),
            message: self.to_string(),
            retryable: self.retryable(),
        }
    }
}
