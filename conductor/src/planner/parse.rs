//! Plan extraction from LLM output.
//!
//! Models wrap JSON in prose and code fences; the extractor finds the first
//! balanced JSON object and ignores everything around it. The wire shape
//! nests capability and parameters under `metadata`, matching the schema the
//! prompt asks for.

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::plan::{PlanMode, RoutingPlan, RoutingStep};

/// Why a response could not be turned into a plan.
#[derive(Debug, thiserror::Error)]
pub enum PlanParseError {
    #[error("no JSON object found in response")]
    NoJson,
    #[error("plan JSON did not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct WirePlan {
    #[serde(default)]
    plan_id: Option<String>,
    #[serde(default)]
    steps: Vec<WireStep>,
}

#[derive(Debug, Deserialize)]
struct WireStep {
    step_id: String,
    agent_name: String,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    metadata: WireStepMetadata,
    #[serde(default)]
    instruction: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireStepMetadata {
    #[serde(default)]
    capability: String,
    #[serde(default)]
    parameters: serde_json::Map<String, serde_json::Value>,
}

/// Returns the first balanced `{...}` object in `raw`, skipping string
/// literals and escapes, or `None` when there is none.
pub(crate) fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let bytes = raw.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses an LLM response into a [`RoutingPlan`].
pub(crate) fn parse_plan(raw: &str, original_request: &str) -> Result<RoutingPlan, PlanParseError> {
    let json = extract_json(raw).ok_or(PlanParseError::NoJson)?;
    let wire: WirePlan = serde_json::from_str(json)?;
    Ok(RoutingPlan {
        plan_id: wire
            .plan_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("plan-{}", Uuid::new_v4())),
        original_request: original_request.to_string(),
        mode: PlanMode::Autonomous,
        steps: wire
            .steps
            .into_iter()
            .map(|s| RoutingStep {
                step_id: s.step_id,
                agent_name: s.agent_name,
                capability: s.metadata.capability,
                parameters: s.metadata.parameters,
                depends_on: s.depends_on,
                instruction: s.instruction,
            })
            .collect(),
        created_at: Utc::now(),
    })
}
