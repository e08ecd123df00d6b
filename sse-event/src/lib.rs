//! Chat stream event protocol for the orchestration gateway.
//!
//! One enum, [`ChatEvent`], covers every frame the gateway can emit over a
//! `/chat/stream` response; [`ChatEvent::frame`] renders the SSE wire form
//! (`event: <type>\ndata: <json>\n\n`). The envelope (HTTP headers, stream
//! lifecycle) is applied by the server crate.

mod event;

pub use event::{ChatEvent, StatusStep};
