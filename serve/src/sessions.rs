//! Session REST: create, metadata, history.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::app::AppState;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CreateSessionRequest {
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

/// `POST /chat/session` → `{session_id, created_at, expires_at}`.
pub(crate) async fn create_session(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CreateSessionRequest>>,
) -> Response {
    let metadata = body.and_then(|Json(b)| b.metadata);
    match state.sessions.create(metadata).await {
        Ok(session) => {
            let expires_at = session.created_at
                + chrono::Duration::from_std(state.session_config.ttl)
                    .unwrap_or_else(|_| chrono::Duration::seconds(1800));
            (
                StatusCode::CREATED,
                Json(serde_json::json!({
                    "session_id": session.id,
                    "created_at": session.created_at,
                    "expires_at": expires_at,
                })),
            )
                .into_response()
        }
        Err(e) => backend_error(e),
    }
}

/// `GET /chat/session/{id}` → session metadata.
pub(crate) async fn session_meta(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.sessions.get(&id).await {
        Ok(Some(session)) => Json(serde_json::json!({
            "session_id": session.id,
            "created_at": session.created_at,
            "updated_at": session.updated_at,
            "message_count": session.messages.len(),
            "metadata": session.metadata,
        }))
        .into_response(),
        Ok(None) => not_found(&id),
        Err(e) => backend_error(e),
    }
}

/// `GET /chat/session/{id}/history` → `{session_id, messages, count}`.
pub(crate) async fn session_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.sessions.get(&id).await {
        Ok(Some(session)) => Json(serde_json::json!({
            "session_id": session.id,
            "messages": session.messages,
            "count": session.messages.len(),
        }))
        .into_response(),
        Ok(None) => not_found(&id),
        Err(e) => backend_error(e),
    }
}

fn not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "code": "validation_error",
            "message": format!("unknown session: {id}"),
            "retryable": false,
        })),
    )
        .into_response()
}

fn backend_error(e: conductor::session::SessionError) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({
            "code": "service_unavailable",
            "message": e.to_string(),
            "retryable": true,
        })),
    )
        .into_response()
}
