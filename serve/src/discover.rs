//! `GET /discover`: the current catalog snapshot, grouped by service type.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use conductor::ServiceType;

use crate::app::AppState;

pub(crate) async fn discover(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let snapshot = state.catalog.load();
    let tools = snapshot.services_of_type(ServiceType::Tool);
    let agents = snapshot.services_of_type(ServiceType::Agent);
    Json(serde_json::json!({
        "tools": tools,
        "agents": agents,
    }))
}
