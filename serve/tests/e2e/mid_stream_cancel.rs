//! Client disconnect mid-synthesis: the pipeline is cancelled, nothing is
//! persisted, and no `done` frame is produced.

use std::sync::Arc;
use std::time::Duration;

use conductor::SessionStore;

use super::common::{
    post_chat, read_until_event, spawn_server, spawn_tool, tool_record, SlowStreamLlm,
};

/// **Scenario**: the client closes the SSE connection after the first
/// `chunk`; the in-flight LLM stream is cancelled promptly and no assistant
/// message is written to the session.
#[tokio::test]
async fn disconnect_after_first_chunk_cancels_pipeline() {
    let port = spawn_tool(
        "forecast",
        serde_json::json!({"success": true, "response": {"data": {"temp_c": 20}}}),
    )
    .await;
    let plan = r#"{
        "plan_id": "p1",
        "steps": [
            {"step_id": "forecast", "agent_name": "weather-tool", "depends_on": [],
             "metadata": {"capability": "forecast", "parameters": {"city": "Tokyo"}}}
        ]
    }"#;
    let llm = Arc::new(SlowStreamLlm {
        plan: plan.to_string(),
    });
    let (base, sessions) = spawn_server(
        llm,
        vec![tool_record("svc-weather", "weather-tool", "forecast", port)],
    )
    .await;

    let mut response = post_chat(&base, None, "weather in tokyo").await;
    assert_eq!(response.status(), 200);

    // Read until the first chunk frame, remember the session, then hang up.
    let frames = read_until_event(&mut response, "chunk").await;
    assert!(
        frames.iter().any(|f| f.event == "chunk"),
        "stream ended before any chunk: {frames:?}"
    );
    let session_id = frames
        .iter()
        .find(|f| f.event == "session")
        .and_then(|f| f.data["id"].as_str())
        .expect("session frame")
        .to_string();
    assert!(frames.iter().all(|f| f.event != "done"));
    drop(response);

    // Give the drop guard time to propagate the cancellation.
    tokio::time::sleep(Duration::from_millis(400)).await;

    let history = sessions.history(&session_id).await.unwrap();
    assert_eq!(history.len(), 1, "only the user turn is persisted");
    assert!(matches!(history[0].role, conductor::Role::User));
}
