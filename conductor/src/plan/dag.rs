//! Plan validation and DAG level computation.
//!
//! A plan is valid iff every step names an existing service and capability
//! in the current snapshot, every `depends_on` references an **earlier**
//! `step_id`, and the graph is acyclic. Earlier-only references already rule
//! out cycles; the cycle check stays independent so workflow-mode plans that
//! bypass ordering are still caught. Validation never mutates the plan, so
//! it is idempotent by construction.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use super::{RoutingPlan, RoutingStep};
use crate::catalog::CatalogSnapshot;

/// Why a plan was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanValidationError {
    #[error("step {step_id}: duplicate step id")]
    DuplicateStepId { step_id: String },
    #[error("step {step_id}: unknown service '{agent_name}'")]
    UnknownService { step_id: String, agent_name: String },
    #[error("step {step_id}: service '{agent_name}' has no capability '{capability}'")]
    UnknownCapability {
        step_id: String,
        agent_name: String,
        capability: String,
    },
    #[error("step {step_id}: depends_on '{dependency}' does not reference an earlier step")]
    ForwardOrUnknownDependency { step_id: String, dependency: String },
    #[error("plan contains a dependency cycle")]
    Cycle,
}

/// Validates `plan` against the current catalog snapshot.
pub fn validate(plan: &RoutingPlan, snapshot: &CatalogSnapshot) -> Result<(), PlanValidationError> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(plan.steps.len());
    for step in &plan.steps {
        if !seen.insert(step.step_id.as_str()) {
            return Err(PlanValidationError::DuplicateStepId {
                step_id: step.step_id.clone(),
            });
        }
    }

    let mut earlier: HashSet<&str> = HashSet::with_capacity(plan.steps.len());
    for step in &plan.steps {
        let Some(service) = snapshot.service_by_name(&step.agent_name) else {
            return Err(PlanValidationError::UnknownService {
                step_id: step.step_id.clone(),
                agent_name: step.agent_name.clone(),
            });
        };
        if !service.capabilities.iter().any(|c| c.name == step.capability) {
            return Err(PlanValidationError::UnknownCapability {
                step_id: step.step_id.clone(),
                agent_name: step.agent_name.clone(),
                capability: step.capability.clone(),
            });
        }
        for dependency in &step.depends_on {
            if !earlier.contains(dependency.as_str()) {
                return Err(PlanValidationError::ForwardOrUnknownDependency {
                    step_id: step.step_id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
        earlier.insert(step.step_id.as_str());
    }

    if topological_order(&plan.steps).is_none() {
        return Err(PlanValidationError::Cycle);
    }
    Ok(())
}

/// Computes a topological order of step ids; `None` when the graph has a
/// cycle. Steps with no edges keep their declaration order.
pub fn topological_order(steps: &[RoutingStep]) -> Option<Vec<String>> {
    let ids: HashSet<&str> = steps.iter().map(|s| s.step_id.as_str()).collect();
    let mut in_degree: HashMap<&str, usize> = ids.iter().map(|id| (*id, 0)).collect();
    let mut out_edges: HashMap<&str, Vec<&str>> = HashMap::new();

    for step in steps {
        for dep in &step.depends_on {
            if !ids.contains(dep.as_str()) {
                continue;
            }
            out_edges
                .entry(dep.as_str())
                .or_default()
                .push(step.step_id.as_str());
            *in_degree.entry(step.step_id.as_str()).or_insert(0) += 1;
        }
    }

    let mut queue: Vec<&str> = steps
        .iter()
        .map(|s| s.step_id.as_str())
        .filter(|id| in_degree[id] == 0)
        .collect();
    let mut order = Vec::with_capacity(ids.len());
    let mut cursor = 0;
    while cursor < queue.len() {
        let id = queue[cursor];
        cursor += 1;
        order.push(id.to_string());
        for next in out_edges.remove(id).unwrap_or_default() {
            let d = in_degree.get_mut(next)?;
            *d -= 1;
            if *d == 0 {
                queue.push(next);
            }
        }
    }

    (order.len() == ids.len()).then_some(order)
}

/// Groups step ids into execution levels: level 0 has no dependencies; level
/// k depends only on levels < k. Steps inside one level are independent and
/// may run concurrently. `None` when the graph has a cycle.
pub fn levels(steps: &[RoutingStep]) -> Option<Vec<Vec<String>>> {
    let order = topological_order(steps)?;
    let by_id: HashMap<&str, &RoutingStep> =
        steps.iter().map(|s| (s.step_id.as_str(), s)).collect();

    let mut level_of: HashMap<&str, usize> = HashMap::with_capacity(order.len());
    let mut grouped: Vec<Vec<String>> = Vec::new();
    for id in &order {
        let step = by_id[id.as_str()];
        let level = step
            .depends_on
            .iter()
            .filter_map(|dep| level_of.get(dep.as_str()))
            .max()
            .map(|max| max + 1)
            .unwrap_or(0);
        level_of.insert(step.step_id.as_str(), level);
        if grouped.len() <= level {
            grouped.resize_with(level + 1, Vec::new);
        }
        grouped[level].push(id.clone());
    }
    Some(grouped)
}
