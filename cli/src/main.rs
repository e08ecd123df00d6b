//! `conductor` binary: load config, wire the components, run the gateway.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use conductor::{
    detect_providers, CatalogHandle, CatalogRefresher, DefaultCatalogProvider, Executor,
    ExecutorConfig, InMemoryRegistry, InMemorySessionStore, LlmClient, OpenAiCompatClient,
    OpenAiCompatConfig, Orchestrator, OrchestratorConfig, Planner, PlannerConfig, ProviderChain,
    RedisRegistry, RedisSessionStore, Registry, SessionConfig, SessionStore, Synthesizer,
    SynthesizerConfig,
};
use serve::ServerDeps;

const REGISTRY_TTL: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "conductor", about = "Conversational orchestration agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway.
    Serve {
        /// Listen address; defaults to 0.0.0.0:<PORT>.
        #[arg(long)]
        addr: Option<String>,
        /// Use in-memory registry and session store instead of Redis
        /// (single-process development mode).
        #[arg(long)]
        memory: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("conductor: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Err(e) = config::load_and_apply("conductor", None) {
        eprintln!("conductor: config load failed: {e}");
    }
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let Cli { command } = Cli::parse();
    match command {
        Command::Serve { addr, memory } => serve_command(addr, memory).await,
    }
}

async fn serve_command(
    addr: Option<String>,
    memory: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = config::Settings::from_env();

    let llm = build_provider_chain()?;
    let provider_name = llm.provider_name().to_string();
    info!(providers = %provider_name, "LLM provider chain ready");

    let session_config = SessionConfig {
        max_messages: settings.session_max_messages,
        ttl: Duration::from_secs(settings.session_ttl_secs),
    };

    let (registry, sessions, redis_status): (Arc<dyn Registry>, Arc<dyn SessionStore>, String) =
        if memory {
            warn!("running with in-memory stores; state will not survive a restart");
            (
                Arc::new(InMemoryRegistry::new(REGISTRY_TTL)),
                Arc::new(InMemorySessionStore::new(session_config)),
                "in-memory".to_string(),
            )
        } else {
            let url = settings.redis_url.clone().ok_or(
                "REDIS_URL is required (or pass --memory for single-process development)",
            )?;
            let registry = RedisRegistry::connect(&url, REGISTRY_TTL).await?;
            let sessions =
                RedisSessionStore::connect(&sessions_db_url(&url), session_config).await?;
            info!("connected to redis");
            (
                Arc::new(registry),
                Arc::new(sessions),
                "connected".to_string(),
            )
        };

    let catalog = CatalogHandle::new();
    let refresher = CatalogRefresher::new(
        registry,
        catalog.clone(),
        Duration::from_secs(settings.catalog_refresh_secs),
        settings.catalog_failure_threshold,
    );
    let _refresher_handle = refresher.spawn();

    let planner = Planner::new(
        llm.clone(),
        Arc::new(DefaultCatalogProvider::new(catalog.clone())),
        catalog.clone(),
        PlannerConfig::default(),
    );
    let executor = Executor::new(catalog.clone(), ExecutorConfig::default());
    let synthesizer = Synthesizer::llm(llm, SynthesizerConfig::default());
    let orchestrator = Arc::new(Orchestrator::new(
        planner,
        executor,
        synthesizer,
        sessions.clone(),
        OrchestratorConfig { provider_name },
    ));

    let deps = ServerDeps {
        orchestrator,
        sessions,
        catalog,
        session_config,
        redis_status,
    };

    let addr = addr.unwrap_or_else(|| format!("0.0.0.0:{}", settings.port));
    serve::run_serve(Some(&addr), deps).await
}

/// Builds the failover chain from every provider configured in the
/// environment, in detection priority order.
fn build_provider_chain() -> Result<Arc<dyn LlmClient>, Box<dyn std::error::Error + Send + Sync>> {
    let detected = detect_providers();
    if detected.is_empty() {
        return Err("no LLM provider configured (set OPENAI_API_KEY, GROQ_API_KEY, ...)".into());
    }
    let mut clients: Vec<Arc<dyn LlmClient>> = Vec::with_capacity(detected.len());
    for provider in &detected {
        match OpenAiCompatClient::new(OpenAiCompatConfig::for_provider(provider.alias)) {
            Ok(client) => clients.push(Arc::new(client)),
            Err(e) => warn!(provider = provider.alias, error = %e, "skipping provider"),
        }
    }
    Ok(Arc::new(ProviderChain::new(clients)?))
}

/// Sessions live in logical database 1, disjoint from the registry's
/// database 0. A URL that already names a database is left alone.
fn sessions_db_url(redis_url: &str) -> String {
    let after_scheme = redis_url.split("://").nth(1).unwrap_or(redis_url);
    if after_scheme.contains('/') {
        redis_url.to_string()
    } else {
        format!("{redis_url}/1")
    }
}
