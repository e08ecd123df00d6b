//! REST surface: session lifecycle, health, discover, and input validation.

use super::common::{chat_and_collect, spawn_mock_server, spawn_tool, tool_record};

async fn any_server() -> (String, std::sync::Arc<conductor::InMemorySessionStore>) {
    let port = spawn_tool(
        "forecast",
        serde_json::json!({"success": true, "response": {"data": {"temp_c": 20}}}),
    )
    .await;
    let (base, sessions, _llm) = spawn_mock_server(
        vec![
            r#"{"plan_id": "p1", "steps": []}"#.to_string(),
            "Answer.".to_string(),
        ],
        vec![tool_record("svc-weather", "weather-tool", "forecast", port)],
    )
    .await;
    (base, sessions)
}

#[tokio::test]
async fn session_create_meta_history_roundtrip() {
    let (base, _sessions) = any_server().await;
    let client = reqwest::Client::new();

    let created: serde_json::Value = client
        .post(format!("{base}/chat/session"))
        .json(&serde_json::json!({"metadata": {"channel": "web"}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let session_id = created["session_id"].as_str().unwrap();
    assert!(created["created_at"].is_string());
    assert!(created["expires_at"].is_string());

    let meta: serde_json::Value = client
        .get(format!("{base}/chat/session/{session_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(meta["session_id"], session_id);
    assert_eq!(meta["message_count"], 0);
    assert_eq!(meta["metadata"]["channel"], "web");

    let history: serde_json::Value = client
        .get(format!("{base}/chat/session/{session_id}/history"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["count"], 0);
    assert_eq!(history["messages"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn history_reflects_chat_turns() {
    let (base, _sessions) = any_server().await;
    let frames = chat_and_collect(&base, None, "hello").await;
    let session_id = frames[0].data["id"].as_str().unwrap();

    let history: serde_json::Value = reqwest::Client::new()
        .get(format!("{base}/chat/session/{session_id}/history"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["count"], 2);
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "hello");
    assert_eq!(messages[1]["role"], "assistant");
}

#[tokio::test]
async fn unknown_session_is_404() {
    let (base, _sessions) = any_server().await;
    let response = reqwest::get(format!("{base}/chat/session/no-such-session"))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn health_reports_stats_and_backends() {
    let (base, _sessions) = any_server().await;
    let _ = chat_and_collect(&base, None, "hello").await;

    let health: serde_json::Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["redis"], "in-memory");
    assert_eq!(health["ai_provider"], "mock");
    assert_eq!(health["orchestrator"]["total_requests"], 1);
    assert_eq!(health["orchestrator"]["successful_requests"], 1);
    assert!(health["active_sessions"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn discover_groups_tools_and_agents() {
    let (base, _sessions) = any_server().await;
    let discover: serde_json::Value = reqwest::get(format!("{base}/discover"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let tools = discover["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "weather-tool");
    assert_eq!(discover["agents"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn malformed_chat_body_is_client_error() {
    let (base, _sessions) = any_server().await;
    let response = reqwest::Client::new()
        .post(format!("{base}/chat/stream"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn cors_preflight_is_permissive() {
    let (base, _sessions) = any_server().await;
    let response = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("{base}/chat/stream"))
        .header("origin", "http://localhost:3000")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
