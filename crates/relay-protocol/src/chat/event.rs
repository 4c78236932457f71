use bytes::Bytes;
use serde::Serialize;

use crate::claude::create_message::{
    BetaMessageRole, BetaStreamMessageDelta, BetaStreamUsage, JsonValue,
};
use crate::sse::encode_frame;

/// One frame of the relay's outbound event stream.
///
/// Serializes to the frame's `data` payload; the frame's `event` name comes
/// from [`OutboundEvent::name`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundEvent {
    MessageStart {
        id: String,
        model: String,
        role: BetaMessageRole,
        usage: BetaStreamUsage,
    },
    ContentBlockStart {
        index: u32,
        content_block: JsonValue,
    },
    WebSearchStart {
        index: u32,
        tool_use_id: String,
    },
    WebSearchResult {
        index: u32,
        tool_use_id: String,
        results: JsonValue,
    },
    TextDelta {
        index: u32,
        text: String,
    },
    ThinkingDelta {
        index: u32,
        text: String,
    },
    ToolInputDelta {
        index: u32,
        partial_json: String,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        delta: BetaStreamMessageDelta,
        usage: BetaStreamUsage,
    },
    MessageStop {},
    Ping {},
    /// Upstream finished normally.
    Done {},
    /// Terminal failure after the response was committed.
    Error {
        error: String,
        status: u16,
    },
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::MessageStart { .. } => "message_start",
            OutboundEvent::ContentBlockStart { .. } => "content_block_start",
            OutboundEvent::WebSearchStart { .. } => "web_search_start",
            OutboundEvent::WebSearchResult { .. } => "web_search_result",
            OutboundEvent::TextDelta { .. } => "text_delta",
            OutboundEvent::ThinkingDelta { .. } => "thinking_delta",
            OutboundEvent::ToolInputDelta { .. } => "tool_input_delta",
            OutboundEvent::ContentBlockStop { .. } => "content_block_stop",
            OutboundEvent::MessageDelta { .. } => "message_delta",
            OutboundEvent::MessageStop {} => "message_stop",
            OutboundEvent::Ping {} => "ping",
            OutboundEvent::Done {} => "done",
            OutboundEvent::Error { .. } => "error",
        }
    }

    pub fn error(message: impl Into<String>, status: u16) -> Self {
        OutboundEvent::Error {
            error: message.into(),
            status,
        }
    }

    pub fn to_frame(&self) -> Result<Bytes, serde_json::Error> {
        encode_frame(self.name(), self)
    }
}
