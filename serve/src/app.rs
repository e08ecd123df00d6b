//! Axum app: state, router, CORS.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use conductor::{CatalogHandle, Orchestrator, SessionConfig, SessionStore};

/// Everything the server needs, assembled by the caller (CLI or tests).
pub struct ServerDeps {
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Arc<dyn SessionStore>,
    pub catalog: CatalogHandle,
    pub session_config: SessionConfig,
    /// Health-report string for the KV backend (`connected`, `in-memory`).
    pub redis_status: String,
}

pub(crate) struct AppState {
    pub(crate) orchestrator: Arc<Orchestrator>,
    pub(crate) sessions: Arc<dyn SessionStore>,
    pub(crate) catalog: CatalogHandle,
    pub(crate) session_config: SessionConfig,
    pub(crate) redis_status: String,
}

impl AppState {
    pub(crate) fn new(deps: ServerDeps) -> Self {
        Self {
            orchestrator: deps.orchestrator,
            sessions: deps.sessions,
            catalog: deps.catalog,
            session_config: deps.session_config,
            redis_status: deps.redis_status,
        }
    }
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .route("/chat/stream", post(crate::chat::chat_stream))
        .route("/chat/session", post(crate::sessions::create_session))
        .route("/chat/session/:id", get(crate::sessions::session_meta))
        .route(
            "/chat/session/:id/history",
            get(crate::sessions::session_history),
        )
        .route("/health", get(crate::health::health))
        .route("/discover", get(crate::discover::discover))
        .layer(cors)
        .with_state(state)
}
