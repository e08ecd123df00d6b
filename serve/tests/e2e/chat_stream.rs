//! Chat stream scenarios: dependency plans, parallel branches, plan
//! regeneration, and graceful tool-outage degradation.

use conductor::SessionStore;

use super::common::{
    chat_and_collect, spawn_failing_tool, spawn_mock_server, spawn_tool, tool_record,
};

const GEO_WEATHER_PLAN: &str = r#"{
    "plan_id": "p1",
    "steps": [
        {"step_id": "geocode", "agent_name": "geocoding-tool", "depends_on": [],
         "metadata": {"capability": "geocode", "parameters": {"city": "Tokyo"}}},
        {"step_id": "weather", "agent_name": "weather-tool", "depends_on": ["geocode"],
         "metadata": {"capability": "forecast", "parameters": {
             "lat": "{{geocode.response.data.lat}}",
             "lon": "{{geocode.response.data.lon}}"
         }}}
    ]
}"#;

/// **Scenario**: "What's the weather in Tokyo?" resolves through geocoding
/// into a weather call; the SSE sequence is session, status(planning),
/// status(executing), step, step, chunk+, usage, done.
#[tokio::test]
async fn weather_with_geocoding_dependency() {
    let geo_port = spawn_tool(
        "geocode",
        serde_json::json!({"success": true, "response": {"data": {"lat": 35.6762, "lon": 139.6503}}}),
    )
    .await;
    let weather_port = spawn_tool(
        "forecast",
        serde_json::json!({"success": true, "response": {"data": {"temp_c": 21, "conditions": "sunny"}}}),
    )
    .await;

    let (base, _sessions, llm) = spawn_mock_server(
        vec![
            GEO_WEATHER_PLAN.to_string(),
            "It's 21°C and sunny in Tokyo.".to_string(),
        ],
        vec![
            tool_record("svc-geo", "geocoding-tool", "geocode", geo_port),
            tool_record("svc-weather", "weather-tool", "forecast", weather_port),
        ],
    )
    .await;

    let frames = chat_and_collect(&base, None, "What's the weather in Tokyo?").await;
    let events: Vec<&str> = frames.iter().map(|f| f.event.as_str()).collect();

    assert_eq!(events[0], "session");
    assert_eq!(events[1], "status");
    assert_eq!(frames[1].data["step"], "planning");

    let steps: Vec<(&str, bool)> = frames
        .iter()
        .filter(|f| f.event == "step")
        .map(|f| {
            (
                f.data["tool"].as_str().unwrap(),
                f.data["success"].as_bool().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        steps,
        [("geocoding-tool", true), ("weather-tool", true)],
        "geocode completes before its dependent"
    );

    assert!(events.contains(&"chunk"));
    assert!(events.contains(&"usage"));
    assert_eq!(events.last(), Some(&"done"));
    assert!(!events.contains(&"error"));

    let done = frames.last().unwrap();
    let tools: Vec<&str> = done.data["tools_used"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(tools, ["geocoding-tool", "weather-tool"]);
    assert_eq!(llm.call_count(), 2, "one plan, one synthesis");
}

/// **Scenario**: independent country-info and news steps run in the same
/// level; both step events arrive (either order) before synthesis.
#[tokio::test]
async fn parallel_independent_steps() {
    let plan = r#"{
        "plan_id": "p1",
        "steps": [
            {"step_id": "country", "agent_name": "country-tool", "depends_on": [],
             "metadata": {"capability": "country_info", "parameters": {"country": "Japan"}}},
            {"step_id": "news", "agent_name": "news-tool", "depends_on": [],
             "metadata": {"capability": "headlines", "parameters": {"country": "Japan"}}}
        ]
    }"#;
    let country_port = spawn_tool(
        "country_info",
        serde_json::json!({"success": true, "response": {"data": {"currency": "JPY"}}}),
    )
    .await;
    let news_port = spawn_tool(
        "headlines",
        serde_json::json!({"success": true, "response": {"data": {"items": ["headline one"]}}}),
    )
    .await;

    let (base, _sessions, _llm) = spawn_mock_server(
        vec![
            plan.to_string(),
            "Japan uses the yen; here are today's headlines.".to_string(),
        ],
        vec![
            tool_record("svc-country", "country-tool", "country_info", country_port),
            tool_record("svc-news", "news-tool", "headlines", news_port),
        ],
    )
    .await;

    let frames = chat_and_collect(&base, None, "Tell me about Japan — currency and news.").await;

    let chunk_index = frames.iter().position(|f| f.event == "chunk").unwrap();
    let step_frames: Vec<usize> = frames
        .iter()
        .enumerate()
        .filter(|(_, f)| f.event == "step")
        .map(|(i, _)| i)
        .collect();
    assert_eq!(step_frames.len(), 2);
    assert!(step_frames.iter().all(|i| *i < chunk_index));

    let mut tools: Vec<String> = frames
        .iter()
        .filter(|f| f.event == "step")
        .map(|f| f.data["tool"].as_str().unwrap().to_string())
        .collect();
    tools.sort();
    assert_eq!(tools, ["country-tool", "news-tool"]);
    assert!(frames
        .iter()
        .filter(|f| f.event == "step")
        .all(|f| f.data["success"] == true));
    assert_eq!(frames.last().unwrap().event, "done");
}

/// **Scenario**: the first plan references a tool that does not exist; the
/// orchestrator regenerates exactly once and the request still succeeds.
#[tokio::test]
async fn invalid_plan_triggers_one_regeneration() {
    let bad_plan = r#"{
        "plan_id": "p0",
        "steps": [
            {"step_id": "scan", "agent_name": "xray-tool", "depends_on": [],
             "metadata": {"capability": "scan", "parameters": {}}}
        ]
    }"#;
    let good_plan = r#"{
        "plan_id": "p1",
        "steps": [
            {"step_id": "forecast", "agent_name": "weather-tool", "depends_on": [],
             "metadata": {"capability": "forecast", "parameters": {"city": "Tokyo"}}}
        ]
    }"#;
    let weather_port = spawn_tool(
        "forecast",
        serde_json::json!({"success": true, "response": {"data": {"temp_c": 18}}}),
    )
    .await;

    let (base, _sessions, llm) = spawn_mock_server(
        vec![
            bad_plan.to_string(),
            good_plan.to_string(),
            "18°C in Tokyo right now.".to_string(),
        ],
        vec![tool_record("svc-weather", "weather-tool", "forecast", weather_port)],
    )
    .await;

    let frames = chat_and_collect(&base, None, "weather in tokyo").await;
    assert_eq!(frames.last().unwrap().event, "done");
    assert_eq!(
        llm.call_count(),
        3,
        "plan, one corrective regeneration, synthesis"
    );
    assert!(llm.prompts()[1].contains("xray-tool"));
}

/// **Scenario**: the currency tool is down (503) but the other step
/// succeeds; the stream degrades gracefully and ends with `done`, not
/// `error`.
#[tokio::test]
async fn tool_outage_degrades_gracefully() {
    let plan = r#"{
        "plan_id": "p1",
        "steps": [
            {"step_id": "convert", "agent_name": "currency-tool", "depends_on": [],
             "metadata": {"capability": "convert", "parameters": {"from": "USD", "to": "JPY"}}},
            {"step_id": "country", "agent_name": "country-tool", "depends_on": [],
             "metadata": {"capability": "country_info", "parameters": {"country": "Japan"}}}
        ]
    }"#;
    let currency_port = spawn_failing_tool("convert", 503).await;
    let country_port = spawn_tool(
        "country_info",
        serde_json::json!({"success": true, "response": {"data": {"capital": "Tokyo"}}}),
    )
    .await;

    let (base, _sessions, _llm) = spawn_mock_server(
        vec![
            plan.to_string(),
            "Country info is in, but currency rates are unavailable right now.".to_string(),
        ],
        vec![
            tool_record("svc-currency", "currency-tool", "convert", currency_port),
            tool_record("svc-country", "country-tool", "country_info", country_port),
        ],
    )
    .await;

    let frames = chat_and_collect(&base, None, "Japan currency info please").await;

    let currency_step = frames
        .iter()
        .find(|f| f.event == "step" && f.data["tool"] == "currency-tool")
        .expect("currency step event");
    assert_eq!(currency_step.data["success"], false);

    let country_step = frames
        .iter()
        .find(|f| f.event == "step" && f.data["tool"] == "country-tool")
        .expect("country step event");
    assert_eq!(country_step.data["success"], true);

    assert!(frames.iter().any(|f| f.event == "chunk"));
    assert_eq!(frames.last().unwrap().event, "done");
    assert!(frames.iter().all(|f| f.event != "error"));
}

/// **Scenario**: reusing a session id keeps history; the second request sees
/// no new `session` frame and the store accumulates both turns.
#[tokio::test]
async fn session_continuity_across_turns() {
    let plan = r#"{"plan_id": "p1", "steps": []}"#;
    let (base, sessions, _llm) = spawn_mock_server(
        vec![
            plan.to_string(),
            "First answer.".to_string(),
            plan.to_string(),
            "Second answer.".to_string(),
        ],
        vec![tool_record(
            "svc-any",
            "any-tool",
            "noop",
            spawn_tool("noop", serde_json::json!({})).await,
        )],
    )
    .await;

    let first = chat_and_collect(&base, None, "hello").await;
    assert_eq!(first[0].event, "session");
    let session_id = first[0].data["id"].as_str().unwrap().to_string();

    let second = chat_and_collect(&base, Some(&session_id), "hello again").await;
    assert!(second.iter().all(|f| f.event != "session"));

    let history = sessions.history(&session_id).await.unwrap();
    let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        contents,
        ["hello", "First answer.", "hello again", "Second answer."]
    );
}

/// **Scenario**: a plan with no steps still produces a direct streamed
/// answer and `done`, with no step frames.
#[tokio::test]
async fn empty_plan_answers_directly() {
    let (base, _sessions, _llm) = spawn_mock_server(
        vec![
            r#"{"plan_id": "p1", "steps": []}"#.to_string(),
            "Hello! How can I help?".to_string(),
        ],
        vec![tool_record(
            "svc-any",
            "any-tool",
            "noop",
            spawn_tool("noop", serde_json::json!({})).await,
        )],
    )
    .await;

    let frames = chat_and_collect(&base, None, "hi there").await;
    assert!(frames.iter().all(|f| f.event != "step"));
    assert!(frames.iter().any(|f| f.event == "chunk"));
    assert_eq!(frames.last().unwrap().event, "done");
}
