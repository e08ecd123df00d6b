//! Wire shape for one chat stream event: type + payload.
//!
//! The `type` tag names the SSE event; the remaining fields are the `data:`
//! JSON. `done` and `error` are terminal and mutually exclusive; the server
//! closes the stream after either.

use serde::{Deserialize, Serialize};

/// Pipeline phase announced by a `status` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusStep {
    Planning,
    Executing,
    Synthesizing,
}

impl StatusStep {
    /// Wire name of the phase (matches the serde rename).
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusStep::Planning => "planning",
            StatusStep::Executing => "executing",
            StatusStep::Synthesizing => "synthesizing",
        }
    }
}

/// Protocol event: one frame on a `/chat/stream` response.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A new session was created for this request.
    Session { id: String },
    /// Pipeline phase change.
    Status { step: StatusStep, message: String },
    /// One executor step completed (success or failure).
    Step {
        step_id: String,
        tool: String,
        success: bool,
        duration_ms: u64,
    },
    /// A run of synthesis tokens.
    Chunk { text: String },
    /// Token usage reported at the end of synthesis.
    Usage {
        prompt_tokens: u32,
        completion_tokens: u32,
        total_tokens: u32,
    },
    /// Model-reported stop reason.
    Finish { reason: String },
    /// Pipeline complete. Terminal; mutually exclusive with `error`.
    Done {
        request_id: String,
        tools_used: Vec<String>,
        total_duration_ms: u64,
    },
    /// Terminal failure. Always the last frame when emitted.
    Error {
        code: String,
        message: String,
        retryable: bool,
    },
}

impl ChatEvent {
    /// SSE event name (the serde tag).
    pub fn event_type(&self) -> &'static str {
        match self {
            ChatEvent::Session { .. } => "session",
            ChatEvent::Status { .. } => "status",
            ChatEvent::Step { .. } => "step",
            ChatEvent::Chunk { .. } => "chunk",
            ChatEvent::Usage { .. } => "usage",
            ChatEvent::Finish { .. } => "finish",
            ChatEvent::Done { .. } => "done",
            ChatEvent::Error { .. } => "error",
        }
    }

    /// True for `done` and `error`: no frame may follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::Done { .. } | ChatEvent::Error { .. })
    }

    /// Renders the SSE wire form: `event: <type>\ndata: <json>\n\n`.
    ///
    /// The `type` tag is carried by the `event:` line, not duplicated in the
    /// data payload.
    pub fn frame(&self) -> String {
        let mut value =
            serde_json::to_value(self).expect("chat event serialization is infallible");
        if let Some(map) = value.as_object_mut() {
            map.remove("type");
        }
        format!("event: {}\ndata: {}\n\n", self.event_type(), value)
    }
}
