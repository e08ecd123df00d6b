//! Shared helpers for e2e tests. Received frames are logged with
//! `[e2e] frame: ...`; run with `--nocapture` to see them.

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::post, Json, Router};
use chrono::Utc;
use tokio::net::TcpListener;

use conductor::{
    Capability, CatalogHandle, CatalogSnapshot, DefaultCatalogProvider, Executor, ExecutorConfig,
    InMemorySessionStore, LlmClient, MockLlm, Orchestrator, OrchestratorConfig, Planner,
    PlannerConfig, ServiceRecord, ServiceType, SessionConfig, Synthesizer, SynthesizerConfig,
};
use serve::ServerDeps;

/// One parsed SSE frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub event: String,
    pub data: serde_json::Value,
}

/// Spawns a stub tool serving `POST /api/capabilities/<capability>` with a
/// fixed JSON body. Returns the port.
pub async fn spawn_tool(capability: &str, body: serde_json::Value) -> u16 {
    let app = Router::new().route(
        &format!("/api/capabilities/{capability}"),
        post(move || {
            let body = body.clone();
            async move { Json(body) }
        }),
    );
    spawn_router(app).await
}

/// Spawns a stub tool that always answers with the given status code.
pub async fn spawn_failing_tool(capability: &str, status: u16) -> u16 {
    let status = axum::http::StatusCode::from_u16(status).expect("valid status");
    let app = Router::new().route(
        &format!("/api/capabilities/{capability}"),
        post(move || async move { status }),
    );
    spawn_router(app).await
}

pub async fn spawn_router(app: Router) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    port
}

pub fn tool_record(id: &str, name: &str, capability: &str, port: u16) -> ServiceRecord {
    ServiceRecord {
        id: id.to_string(),
        name: name.to_string(),
        service_type: ServiceType::Tool,
        address: "127.0.0.1".to_string(),
        port,
        capabilities: vec![Capability {
            name: capability.to_string(),
            description: format!("{capability} capability"),
            endpoint: None,
            input_schema_summary: None,
            returns: None,
            internal: false,
        }],
        last_seen: Utc::now(),
    }
}

/// Builds a full server around the given LLM and fleet, binds an ephemeral
/// port, and returns its base URL plus the shared session store.
pub async fn spawn_server(
    llm: Arc<dyn LlmClient>,
    services: Vec<ServiceRecord>,
) -> (String, Arc<InMemorySessionStore>) {
    let catalog = CatalogHandle::with_snapshot(CatalogSnapshot::from_services(services));
    let sessions = Arc::new(InMemorySessionStore::default());
    let planner = Planner::new(
        llm.clone(),
        Arc::new(DefaultCatalogProvider::new(catalog.clone())),
        catalog.clone(),
        PlannerConfig::default(),
    );
    let executor = Executor::new(
        catalog.clone(),
        ExecutorConfig {
            retry_attempts: 0,
            ..ExecutorConfig::default()
        },
    );
    let synthesizer = Synthesizer::llm(llm, SynthesizerConfig::default());
    let orchestrator = Arc::new(Orchestrator::new(
        planner,
        executor,
        synthesizer,
        sessions.clone(),
        OrchestratorConfig {
            provider_name: "mock".to_string(),
        },
    ));

    let deps = ServerDeps {
        orchestrator,
        sessions: sessions.clone(),
        catalog,
        session_config: SessionConfig::default(),
        redis_status: "in-memory".to_string(),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = serve::run_serve_on_listener(listener, deps).await;
    });
    (format!("http://{addr}"), sessions)
}

/// Convenience: a mock-LLM server.
pub async fn spawn_mock_server(
    responses: Vec<String>,
    services: Vec<ServiceRecord>,
) -> (String, Arc<InMemorySessionStore>, Arc<MockLlm>) {
    let llm = Arc::new(MockLlm::with_responses(responses));
    let (base, sessions) = spawn_server(llm.clone(), services).await;
    (base, sessions, llm)
}

/// Sends one chat message and reads the whole SSE stream to completion.
pub async fn chat_and_collect(
    base_url: &str,
    session_id: Option<&str>,
    message: &str,
) -> Vec<Frame> {
    let response = post_chat(base_url, session_id, message).await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );
    let body = response.text().await.unwrap();
    let frames = parse_frames(&body);
    for frame in &frames {
        eprintln!("[e2e] frame: {} {}", frame.event, frame.data);
    }
    frames
}

pub async fn post_chat(
    base_url: &str,
    session_id: Option<&str>,
    message: &str,
) -> reqwest::Response {
    let mut payload = serde_json::json!({ "message": message });
    if let Some(id) = session_id {
        payload["session_id"] = serde_json::json!(id);
    }
    reqwest::Client::new()
        .post(format!("{base_url}/chat/stream"))
        .json(&payload)
        .send()
        .await
        .expect("chat request")
}

/// Parses `event:`/`data:` pairs out of an SSE body.
pub fn parse_frames(body: &str) -> Vec<Frame> {
    let mut frames = Vec::new();
    let mut event: Option<String> = None;
    for line in body.lines() {
        if let Some(name) = line.strip_prefix("event: ") {
            event = Some(name.to_string());
        } else if let Some(data) = line.strip_prefix("data: ") {
            frames.push(Frame {
                event: event.take().unwrap_or_default(),
                data: serde_json::from_str(data).unwrap_or(serde_json::Value::Null),
            });
        }
    }
    frames
}

/// Reads frames from a live response until one with the given event name
/// arrives (or the stream ends), returning everything seen so far. The rest
/// of the stream is left unconsumed so the caller can drop the response to
/// simulate a client disconnect.
pub async fn read_until_event(response: &mut reqwest::Response, event: &str) -> Vec<Frame> {
    let mut buffer = String::new();
    loop {
        let chunk = tokio::time::timeout(Duration::from_secs(10), response.chunk())
            .await
            .expect("frame timeout")
            .expect("stream error");
        let Some(chunk) = chunk else {
            return parse_frames(&buffer);
        };
        buffer.push_str(&String::from_utf8_lossy(&chunk));
        let frames = parse_frames(&buffer);
        if frames.iter().any(|f| f.event == event) {
            return frames;
        }
    }
}

/// LLM whose synthesis streams slowly, for cancellation tests. `generate`
/// answers with the scripted plan; `stream` emits small chunks forever until
/// the receiver hangs up.
pub struct SlowStreamLlm {
    pub plan: String,
}

#[async_trait::async_trait]
impl LlmClient for SlowStreamLlm {
    fn provider_name(&self) -> &str {
        "slow-mock"
    }

    async fn generate(
        &self,
        _prompt: &str,
        _options: &conductor::GenerateOptions,
    ) -> Result<conductor::LlmResponse, conductor::LlmError> {
        Ok(conductor::LlmResponse {
            content: self.plan.clone(),
            model: "slow-mock".to_string(),
            provider: "slow-mock".to_string(),
            usage: None,
            finish_reason: Some("stop".to_string()),
            partial: false,
        })
    }

    async fn stream(
        &self,
        _prompt: &str,
        _options: &conductor::GenerateOptions,
        chunk_tx: Option<tokio::sync::mpsc::Sender<conductor::MessageChunk>>,
    ) -> Result<conductor::LlmResponse, conductor::LlmError> {
        let Some(tx) = chunk_tx else {
            return Err(conductor::LlmError::Cancelled);
        };
        let mut content = String::new();
        for i in 0..200 {
            let delta = format!("token{i} ");
            if tx
                .send(conductor::MessageChunk {
                    content: delta.clone(),
                })
                .await
                .is_err()
            {
                return Ok(conductor::LlmResponse {
                    content,
                    model: "slow-mock".to_string(),
                    provider: "slow-mock".to_string(),
                    usage: None,
                    finish_reason: None,
                    partial: true,
                });
            }
            content.push_str(&delta);
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        Ok(conductor::LlmResponse {
            content,
            model: "slow-mock".to_string(),
            provider: "slow-mock".to_string(),
            usage: None,
            finish_reason: Some("stop".to_string()),
            partial: false,
        })
    }
}
