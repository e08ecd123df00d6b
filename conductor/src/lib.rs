//! # Conductor
//!
//! A conversational orchestration agent. One user message in, one streamed
//! answer out: conductor plans a DAG of remote tool calls with an LLM,
//! validates and executes the plan with dependency-aware parallelism, and
//! synthesizes the step outputs into a natural-language reply, emitting a
//! typed event stream along the way.
//!
//! ## Main modules
//!
//! - [`llm`]: [`LlmClient`] trait, the OpenAI-compatible adapter
//!   ([`OpenAiCompatClient`]), model-alias resolution, the failover
//!   [`ProviderChain`], environment detection, and [`MockLlm`] for tests.
//! - [`discovery`]: [`ServiceRecord`]/[`Capability`] model and the
//!   [`Registry`] trait with Redis and in-memory backends.
//! - [`catalog`]: immutable [`CatalogSnapshot`] with atomic swap, the
//!   background [`CatalogRefresher`], LLM catalog formatting, and
//!   [`CatalogProvider`] variants.
//! - [`session`]: multi-turn [`Session`] state behind the [`SessionStore`]
//!   trait (Redis and in-memory backends), sliding-window retention.
//! - [`plan`]: [`RoutingPlan`]/[`RoutingStep`] model, validation, and DAG
//!   level computation.
//! - [`planner`]: prompt assembly (type rules, catalog, history), plan
//!   generation, tolerant JSON extraction, corrective regeneration.
//! - [`executor`]: level-by-level plan execution with bounded parallelism,
//!   timeouts, retries, and `{{step.response.data.x}}` substitution.
//! - [`synthesizer`]: template and streaming-LLM result synthesis.
//! - [`orchestrator`]: the per-request pipeline emitting
//!   [`sse_event::ChatEvent`]s, plus process-lifetime statistics.
//!
//! Key types are re-exported at the crate root.

pub mod catalog;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod llm;
pub mod orchestrator;
pub mod plan;
pub mod planner;
pub mod session;
pub mod synthesizer;

pub use catalog::{
    format_for_llm, CatalogHandle, CatalogProvider, CatalogRefresher, CatalogSnapshot,
    DefaultCatalogProvider, SearchCatalogProvider,
};
pub use discovery::{
    Capability, DiscoveryFilter, InMemoryRegistry, RedisRegistry, Registry, ServiceRecord,
    ServiceType,
};
pub use error::OrchestratorError;
pub use executor::{Executor, ExecutorConfig};
pub use llm::{
    detect_providers, resolve_model, GenerateOptions, LlmClient, LlmError, LlmResponse, LlmUsage,
    MessageChunk, MockLlm, OpenAiCompatClient, OpenAiCompatConfig, ProviderChain,
};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorStats, StatsSnapshot};
pub use plan::{ExecutionResult, PlanMode, RoutingPlan, RoutingStep, StepResult, StreamingStats};
pub use planner::{Planner, PlannerConfig, TypeRule};
pub use session::{
    InMemorySessionStore, RedisSessionStore, Role, Session, SessionConfig, SessionMessage,
    SessionStore,
};
pub use synthesizer::{SynthesisOutput, Synthesizer, SynthesizerConfig};
