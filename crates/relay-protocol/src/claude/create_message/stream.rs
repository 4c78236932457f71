use serde::{Deserialize, Serialize};

use crate::claude::create_message::types::{BetaMessageRole, JsonObject, JsonValue, Model};
use crate::claude::error::ErrorDetail;
use crate::claude::types::RequestId;

/// Token counts, forwarded exactly as received (explicit `null`s included).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BetaStreamUsage(pub JsonObject);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetaStreamMessage {
    pub id: String,
    pub model: Model,
    pub role: BetaMessageRole,
    #[serde(default)]
    pub usage: BetaStreamUsage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BetaStreamMessageDelta {
    pub stop_reason: Option<String>,
    pub stop_sequence: Option<String>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// Typed view over a `content_block_start` block.
///
/// The block itself travels as raw JSON so it can be forwarded untouched;
/// this view only exists to recognise the blocks that need extra events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BetaStreamContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    RedactedThinking {
        data: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    ServerToolUse {
        id: String,
        name: String,
    },
    WebSearchToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: JsonValue,
    },
    #[serde(other)]
    Other,
}

impl BetaStreamContentBlock {
    pub fn from_value(value: &JsonValue) -> Self {
        Self::deserialize(value).unwrap_or(Self::Other)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BetaStreamContentBlockDelta {
    TextDelta {
        text: String,
    },
    /// Partial JSON string; accumulate and parse after content_block_stop.
    InputJsonDelta {
        partial_json: String,
    },
    CitationsDelta {
        citation: JsonValue,
    },
    /// Older API revisions put the text under `text`, current ones under `thinking`.
    ThinkingDelta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thinking: Option<String>,
    },
    SignatureDelta {
        signature: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BetaStreamEventKnown {
    MessageStart {
        message: BetaStreamMessage,
    },
    ContentBlockStart {
        index: u32,
        content_block: JsonValue,
    },
    ContentBlockDelta {
        index: u32,
        delta: BetaStreamContentBlockDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        #[serde(default)]
        delta: BetaStreamMessageDelta,
        /// Token counts are cumulative for the stream so far.
        #[serde(default)]
        usage: BetaStreamUsage,
    },
    MessageStop,
    Ping,
    Error {
        error: ErrorDetail,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
#[allow(clippy::large_enum_variant)]
pub enum BetaStreamEvent {
    Known(BetaStreamEventKnown),
    Unknown(JsonValue),
}
