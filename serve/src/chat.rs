//! `POST /chat/stream`: the SSE chat gateway.
//!
//! Resolves (or creates) the session, announces it, spawns the pipeline
//! task, and streams [`ChatEvent`] frames as they arrive. Client disconnect
//! drops the body stream, which trips a drop guard that cancels the
//! pipeline: in-flight step calls and the synthesis stream unwind, nothing
//! further is persisted, and no `done` frame is ever produced.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde::Deserialize;
use sse_event::ChatEvent;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::app::AppState;

/// Queue depth between the pipeline and the SSE writer.
const EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Deserialize)]
pub(crate) struct ChatStreamRequest {
    #[serde(default)]
    session_id: Option<String>,
    message: String,
    /// Reserved for per-request options; accepted and currently unused.
    #[serde(default)]
    #[allow(dead_code)]
    options: Option<serde_json::Value>,
}

pub(crate) async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatStreamRequest>,
) -> Response {
    // Session continuity: reuse a live session, otherwise create one and
    // announce it as the first frame.
    let (session_id, created) = match &request.session_id {
        Some(id) => match state.sessions.get(id).await {
            Ok(Some(session)) => (session.id, false),
            Ok(None) => match state.sessions.create(None).await {
                Ok(session) => (session.id, true),
                Err(e) => return store_error(e),
            },
            Err(e) => return store_error(e),
        },
        None => match state.sessions.create(None).await {
            Ok(session) => (session.id, true),
            Err(e) => return store_error(e),
        },
    };

    let (events_tx, events_rx) = mpsc::channel::<ChatEvent>(EVENT_QUEUE_CAPACITY);
    if created {
        // Queued before the pipeline starts, so `session` precedes `status`.
        let _ = events_tx
            .send(ChatEvent::Session {
                id: session_id.clone(),
            })
            .await;
    }

    let cancel = CancellationToken::new();
    let pipeline_cancel = cancel.clone();
    let orchestrator = state.orchestrator.clone();
    let message = request.message.clone();
    let pipeline_session = session_id.clone();
    tokio::spawn(async move {
        let _ = orchestrator
            .run_chat(&pipeline_session, &message, events_tx, pipeline_cancel)
            .await;
    });

    info!(session = %session_id, created, "chat stream started");

    // The guard lives inside the body stream; when the client disconnects the
    // stream is dropped and the pipeline is cancelled.
    let guard = cancel.drop_guard();
    let body_stream = ReceiverStream::new(events_rx).map(move |event| {
        let _ = &guard;
        debug!(event = event.event_type(), "sse frame");
        Ok::<_, Infallible>(event.frame())
    });

    match Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(body_stream))
    {
        Ok(response) => response,
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to build response: {e}"),
        )
            .into_response(),
    }
}

fn store_error(e: conductor::session::SessionError) -> Response {
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
