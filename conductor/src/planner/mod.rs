//! Plan generation with validation and corrective regeneration.
//!
//! The planner renders the prompt, calls the LLM at low temperature, parses
//! the first JSON object out of the reply, and validates it against the
//! current catalog snapshot. A plan that fails parsing or validation is
//! regenerated with the failure appended to the prompt, up to
//! `max_plan_attempts` extra attempts; after that the request fails with
//! `planning_failed`.

mod parse;
mod prompt;

pub use prompt::{default_type_rules, TypeRule};

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::{CatalogHandle, CatalogProvider};
use crate::error::OrchestratorError;
use crate::llm::{GenerateOptions, LlmClient, LlmError};
use crate::plan::{dag, RoutingPlan};
use crate::session::SessionMessage;

/// Planner knobs.
#[derive(Clone)]
pub struct PlannerConfig {
    /// Sampling temperature; planning wants determinism.
    pub temperature: f32,
    /// Token cap for the plan response.
    pub max_tokens: u32,
    /// Extra attempts after the first failed generation.
    pub max_plan_attempts: u32,
    /// Model (or alias) used for planning.
    pub model: Option<String>,
    /// Domain-specific system instructions from the embedding agent.
    pub domain_instructions: Option<String>,
    /// Type rules injected into the prompt.
    pub type_rules: Vec<TypeRule>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 4096,
            max_plan_attempts: 2,
            model: None,
            domain_instructions: None,
            type_rules: default_type_rules(),
        }
    }
}

/// Turns one user request (plus history) into a validated [`RoutingPlan`].
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    catalog_provider: Arc<dyn CatalogProvider>,
    catalog: CatalogHandle,
    config: PlannerConfig,
}

impl Planner {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        catalog_provider: Arc<dyn CatalogProvider>,
        catalog: CatalogHandle,
        config: PlannerConfig,
    ) -> Self {
        Self {
            llm,
            catalog_provider,
            catalog,
            config,
        }
    }

    /// Generates and validates a plan for `request`.
    pub async fn plan(
        &self,
        request: &str,
        history: &[SessionMessage],
    ) -> Result<RoutingPlan, OrchestratorError> {
        let snapshot = self.catalog.load();
        if snapshot.is_empty() {
            return Err(OrchestratorError::ServiceUnavailable(
                "no services in catalog yet".to_string(),
            ));
        }

        let catalog_text = self
            .catalog_provider
            .catalog_for_request(request)
            .await
            .map_err(|e| OrchestratorError::ServiceUnavailable(e.to_string()))?;

        let base_prompt = prompt::build_planning_prompt(
            request,
            &catalog_text,
            history,
            self.config.domain_instructions.as_deref(),
            &self.config.type_rules,
        );
        let options = GenerateOptions {
            model: self.config.model.clone(),
            system_prompt: None,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let total_attempts = self.config.max_plan_attempts + 1;
        let mut correction: Option<String> = None;
        let mut last_failure = String::new();

        for attempt in 1..=total_attempts {
            let prompt = match &correction {
                Some(failure) => format!(
                    "{base_prompt}\n\nThe previous plan failed validation with: {failure}\nPlease correct the plan and respond with JSON only."
                ),
                None => base_prompt.clone(),
            };

            let response = self.llm.generate(&prompt, &options).await.map_err(|e| match e {
                LlmError::Cancelled => OrchestratorError::Cancelled,
                LlmError::RateLimited { .. } => OrchestratorError::RateLimited(e.to_string()),
                other => OrchestratorError::PlanningFailed {
                    attempts: attempt,
                    reason: other.to_string(),
                },
            })?;

            let failure = match parse::parse_plan(&response.content, request) {
                Ok(plan) => match dag::validate(&plan, &snapshot) {
                    Ok(()) => {
                        info!(
                            plan_id = %plan.plan_id,
                            steps = plan.steps.len(),
                            attempt,
                            "plan accepted"
                        );
                        return Ok(plan);
                    }
                    Err(e) => e.to_string(),
                },
                Err(e) => e.to_string(),
            };

            warn!(attempt, failure = %failure, "plan rejected");
            debug!(response = %response.content, "rejected plan response");
            last_failure = failure.clone();
            correction = Some(failure);
        }

        Err(OrchestratorError::PlanningFailed {
            attempts: total_attempts,
            reason: last_failure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogSnapshot, DefaultCatalogProvider};
    use crate::discovery::{Capability, ServiceRecord, ServiceType};
    use crate::llm::MockLlm;
    use chrono::Utc;

    fn catalog() -> CatalogHandle {
        let service = |id: &str, name: &str, caps: &[&str]| ServiceRecord {
            id: id.to_string(),
            name: name.to_string(),
            service_type: ServiceType::Tool,
            address: "127.0.0.1".to_string(),
            port: 9000,
            capabilities: caps
                .iter()
                .map(|c| Capability {
                    name: c.to_string(),
                    description: String::new(),
                    endpoint: None,
                    input_schema_summary: None,
                    returns: None,
                    internal: false,
                })
                .collect(),
            last_seen: Utc::now(),
        };
        CatalogHandle::with_snapshot(CatalogSnapshot::from_services(vec![
            service("svc-1", "geo-tool", &["geocode"]),
            service("svc-2", "weather-tool", &["forecast"]),
        ]))
    }

    fn planner_with(llm: Arc<MockLlm>) -> Planner {
        let catalog = catalog();
        Planner::new(
            llm,
            Arc::new(DefaultCatalogProvider::new(catalog.clone())),
            catalog,
            PlannerConfig::default(),
        )
    }

    const VALID_PLAN: &str = r#"{
        "plan_id": "p1",
        "steps": [
            {"step_id": "geocode", "agent_name": "geo-tool", "depends_on": [],
             "metadata": {"capability": "geocode", "parameters": {"city": "Tokyo"}}},
            {"step_id": "weather", "agent_name": "weather-tool", "depends_on": ["geocode"],
             "metadata": {"capability": "forecast",
                          "parameters": {"lat": "{{geocode.response.data.lat}}"}}}
        ]
    }"#;

    const INVALID_PLAN: &str = r#"{
        "plan_id": "p0",
        "steps": [
            {"step_id": "scan", "agent_name": "xray-tool", "depends_on": [],
             "metadata": {"capability": "scan", "parameters": {}}}
        ]
    }"#;

    #[tokio::test]
    async fn accepts_valid_plan_first_try() {
        let planner = planner_with(Arc::new(MockLlm::with_response(VALID_PLAN)));
        let plan = planner.plan("weather in tokyo", &[]).await.unwrap();
        assert_eq!(plan.steps.len(), 2);
    }

    /// **Scenario**: an invalid first plan triggers exactly one corrective
    /// regeneration carrying the validation failure, then succeeds.
    #[tokio::test]
    async fn regenerates_once_on_invalid_plan() {
        let llm = Arc::new(MockLlm::with_responses(vec![
            INVALID_PLAN.to_string(),
            VALID_PLAN.to_string(),
        ]));
        let planner = planner_with(llm.clone());
        let plan = planner.plan("weather in tokyo", &[]).await.unwrap();
        assert_eq!(plan.plan_id, "p1");
        assert_eq!(llm.call_count(), 2, "exactly one regeneration");
    }

    #[tokio::test]
    async fn corrective_prompt_mentions_failure() {
        let llm = Arc::new(MockLlm::with_responses(vec![
            INVALID_PLAN.to_string(),
            VALID_PLAN.to_string(),
        ]));
        let planner = planner_with(llm.clone());
        planner.plan("weather in tokyo", &[]).await.unwrap();
        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("failed validation with"));
        assert!(prompts[1].contains("xray-tool"));
    }

    /// **Scenario**: exhausting regenerations yields `planning_failed`.
    #[tokio::test]
    async fn exhausted_attempts_fail_planning() {
        let planner = planner_with(Arc::new(MockLlm::with_response(INVALID_PLAN)));
        let err = planner.plan("weather in tokyo", &[]).await.unwrap_err();
        match err {
            OrchestratorError::PlanningFailed { attempts, reason } => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("xray-tool"));
            }
            other => panic!("expected planning failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_catalog_is_service_unavailable() {
        let catalog = CatalogHandle::new();
        let planner = Planner::new(
            Arc::new(MockLlm::with_response(VALID_PLAN)),
            Arc::new(DefaultCatalogProvider::new(catalog.clone())),
            catalog,
            PlannerConfig::default(),
        );
        let err = planner.plan("anything", &[]).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn history_lines_reach_the_prompt() {
        let llm = Arc::new(MockLlm::with_response(VALID_PLAN));
        let planner = planner_with(llm.clone());
        let history = vec![SessionMessage::user("What's the weather in Kyoto?")];
        planner.plan("And Tokyo?", &history).await.unwrap();
        assert!(llm.prompts()[0].contains("User: What's the weather in Kyoto?"));
    }
}
