//! Planning prompt assembly.
//!
//! The prompt stacks: role preamble, optional domain instructions, the
//! type-rules block, the catalog, conversation context, the current request,
//! and the JSON schema the plan must satisfy.

use std::fmt::Write as _;

use crate::session::{Role, SessionMessage};

pub(crate) const ROLE_PREAMBLE: &str = "You orchestrate a multi-agent system. \
Given a user request and the catalog of available agents, produce an execution \
plan that routes the request through the right capabilities, or an empty step \
list when no tool is needed.";

pub(crate) const PLAN_SCHEMA: &str = r#"Respond with a single JSON object, no prose:
{
  "plan_id": "<short id>",
  "steps": [
    {
      "step_id": "<unique id>",
      "agent_name": "<agent name from the catalog>",
      "depends_on": ["<earlier step_id>", ...],
      "metadata": {
        "capability": "<capability name>",
        "parameters": { ... }
      }
    }
  ]
}
Steps may reference earlier step outputs in parameters with
{{<step_id>.response.data.<path>}}. List steps in dependency order."#;

/// One rule steering the LLM away from a recurring parameter mistake.
#[derive(Clone, Debug)]
pub struct TypeRule {
    /// Field names the rule applies to.
    pub fields: Vec<String>,
    /// Expected JSON type (`number`, `integer`, `boolean`, ...).
    pub json_type: String,
    /// A correct example fragment.
    pub correct: String,
    /// The anti-pattern to avoid.
    pub incorrect: String,
    /// Why the rule exists.
    pub reason: String,
}

impl TypeRule {
    pub fn new(
        fields: &[&str],
        json_type: &str,
        correct: &str,
        incorrect: &str,
        reason: &str,
    ) -> Self {
        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            json_type: json_type.to_string(),
            correct: correct.to_string(),
            incorrect: incorrect.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// The rules every deployment starts with. Embedding agents may extend the
/// list through [`PlannerConfig`](super::PlannerConfig).
pub fn default_type_rules() -> Vec<TypeRule> {
    vec![
        TypeRule::new(
            &["lat", "lon", "latitude", "longitude"],
            "number",
            r#""lat": 35.6762"#,
            r#""lat": "35.6762""#,
            "coordinates are numeric; quoting them breaks downstream tools",
        ),
        TypeRule::new(
            &["count", "limit", "top_k", "days"],
            "integer",
            r#""limit": 5"#,
            r#""limit": "5""#,
            "counts are integers, not strings",
        ),
        TypeRule::new(
            &["enabled", "include_details"],
            "boolean",
            r#""include_details": true"#,
            r#""include_details": "true""#,
            "flags are booleans, not strings",
        ),
    ]
}

fn render_type_rules(rules: &[TypeRule]) -> String {
    let mut out = String::from("Parameter type rules:\n");
    for rule in rules {
        let _ = writeln!(
            out,
            "- fields {} must be {}; correct: {}; incorrect: {}; because: {}",
            rule.fields.join(", "),
            rule.json_type,
            rule.correct,
            rule.incorrect,
            rule.reason
        );
    }
    out
}

fn render_history(history: &[SessionMessage]) -> String {
    let mut out = String::new();
    for message in history {
        let speaker = match message.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        let _ = writeln!(out, "{}: {}", speaker, message.content);
    }
    out
}

/// Builds the full planning prompt.
pub(crate) fn build_planning_prompt(
    request: &str,
    catalog: &str,
    history: &[SessionMessage],
    domain_instructions: Option<&str>,
    type_rules: &[TypeRule],
) -> String {
    let mut prompt = String::with_capacity(1024);
    prompt.push_str(ROLE_PREAMBLE);
    prompt.push_str("\n\n");
    if let Some(domain) = domain_instructions {
        prompt.push_str(domain);
        prompt.push_str("\n\n");
    }
    prompt.push_str(&render_type_rules(type_rules));
    prompt.push_str("\nAvailable agents:\n");
    prompt.push_str(catalog);
    prompt.push('\n');
    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        prompt.push_str(&render_history(history));
        prompt.push('\n');
    }
    let _ = writeln!(prompt, "Current request: {}", request);
    prompt.push('\n');
    prompt.push_str(PLAN_SCHEMA);
    prompt
}
