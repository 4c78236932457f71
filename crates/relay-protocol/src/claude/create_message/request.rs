use serde::{Deserialize, Serialize};

use crate::claude::create_message::types::{
    BetaMessageParam, BetaThinkingConfigParam, BetaTool, Model,
};
use crate::claude::types::AnthropicHeaders;

pub type CreateMessageHeaders = AnthropicHeaders;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMessageRequestBody {
    /// Maximum tokens to generate; model-specific maximums apply.
    pub max_tokens: u32,
    pub messages: Vec<BetaMessageParam>,
    pub model: Model,
    /// If true, the response is streamed as SSE events instead of a single message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<BetaThinkingConfigParam>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<BetaTool>>,
}

#[derive(Debug, Clone)]
pub struct CreateMessageRequest {
    pub headers: CreateMessageHeaders,
    pub body: CreateMessageRequestBody,
}
