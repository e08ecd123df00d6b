//! HTTP server for conductor (axum).
//!
//! Routes: `POST /chat/stream` (SSE pipeline), session REST under
//! `/chat/session`, `GET /health`, `GET /discover`. CORS is permissive by
//! default so browser chat UIs can talk to the gateway directly.
//!
//! **Public API**: [`ServerDeps`], [`run_serve`], [`run_serve_on_listener`].

mod app;
mod chat;
mod discover;
mod health;
mod sessions;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

pub use app::ServerDeps;

use app::{router, AppState};

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Runs the server on an existing listener. Used by tests (bind to
/// `127.0.0.1:0`, then pass the listener in).
pub async fn run_serve_on_listener(
    listener: TcpListener,
    deps: ServerDeps,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("conductor gateway listening on http://{}", addr);
    let state = Arc::new(AppState::new(deps));
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Binds `addr` (default `0.0.0.0:8080`) and serves until the process exits.
pub async fn run_serve(
    addr: Option<&str>,
    deps: ServerDeps,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr.unwrap_or(DEFAULT_ADDR)).await?;
    run_serve_on_listener(listener, deps).await
}
