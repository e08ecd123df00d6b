//! `GET /health`: liveness plus orchestrator statistics.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::app::AppState;

pub(crate) async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let active_sessions = state.sessions.active_count().await.unwrap_or(0);
    let stats = state.orchestrator.stats().snapshot();
    Json(serde_json::json!({
        "status": "healthy",
        "redis": state.redis_status,
        "ai_provider": state.orchestrator.provider_name(),
        "orchestrator": stats,
        "active_sessions": active_sessions,
    }))
}
