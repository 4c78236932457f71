use bytes::Bytes;
use relay_protocol::chat::{ChatRequest, Role};
use relay_protocol::claude::create_message::{
    BetaMessageParam, BetaMessageRole, BetaThinkingConfigParam, BetaTool, BetaWebSearchTool,
    CreateMessageHeaders, CreateMessageRequest, CreateMessageRequestBody,
};

use crate::headers::{Headers, header_set};
use crate::upstream_client::UpstreamHttpRequest;

pub const MODEL: &str = "claude-sonnet-4-20250514";
pub const MAX_TOKENS: u32 = 16384;
pub const DEFAULT_THINKING_BUDGET: u32 = 10_000;
pub const WEB_SEARCH_TOOL_NAME: &str = "web_search";
pub const WEB_SEARCH_MAX_USES: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Anthropic API key not configured")]
pub struct ConfigurationError;

/// Maps validated chat payloads onto Messages API requests.
///
/// The API key is fixed at construction; an absent key is only reported when
/// a request is built, so a misconfigured process still answers preflights
/// and validation errors.
#[derive(Clone)]
pub struct UpstreamRequestBuilder {
    api_key: Option<String>,
    base_url: String,
}

impl std::fmt::Debug for UpstreamRequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamRequestBuilder")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// A built request plus the key it must be sent with.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    api_key: String,
    pub request: CreateMessageRequest,
}

impl UpstreamRequestBuilder {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        let api_key = api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn build(&self, chat: &ChatRequest) -> Result<UpstreamRequest, ConfigurationError> {
        let api_key = self.api_key.clone().ok_or(ConfigurationError)?;
        Ok(UpstreamRequest {
            api_key,
            request: CreateMessageRequest {
                headers: CreateMessageHeaders::default(),
                body: build_body(chat),
            },
        })
    }

    pub fn build_http(&self, chat: &ChatRequest) -> Result<UpstreamHttpRequest, BuildError> {
        let upstream = self.build(chat)?;
        Ok(upstream.into_http(&self.base_url)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("failed to encode upstream request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl UpstreamRequest {
    pub fn into_http(self, base_url: &str) -> Result<UpstreamHttpRequest, serde_json::Error> {
        let body = serde_json::to_vec(&self.request.body)?;
        let mut headers: Headers = Vec::new();
        header_set(&mut headers, "x-api-key", self.api_key);
        header_set(&mut headers, "content-type", "application/json");
        header_set(&mut headers, "accept", "text/event-stream");
        for (name, value) in self.request.headers.pairs() {
            header_set(&mut headers, name, value);
        }
        Ok(UpstreamHttpRequest {
            url: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            headers,
            body: Bytes::from(body),
        })
    }
}

fn build_body(chat: &ChatRequest) -> CreateMessageRequestBody {
    let messages = chat
        .messages
        .iter()
        .map(|message| BetaMessageParam {
            role: match message.role {
                Role::User => BetaMessageRole::User,
                Role::Assistant => BetaMessageRole::Assistant,
            },
            content: message.content.clone(),
        })
        .collect();

    let system = chat
        .system
        .as_ref()
        .filter(|system| !system.trim().is_empty())
        .cloned();

    let thinking = (chat.enable_thinking == Some(true)).then(|| BetaThinkingConfigParam::Enabled {
        budget_tokens: chat.thinking_budget.unwrap_or(DEFAULT_THINKING_BUDGET),
    });

    let tools = (chat.enable_web_search == Some(true)).then(|| {
        vec![BetaTool::WebSearch20250305(BetaWebSearchTool {
            name: WEB_SEARCH_TOOL_NAME.to_string(),
            allowed_domains: None,
            blocked_domains: None,
            max_uses: Some(WEB_SEARCH_MAX_USES),
        })]
    });

    CreateMessageRequestBody {
        max_tokens: MAX_TOKENS,
        messages,
        model: MODEL.to_string(),
        stream: Some(true),
        system,
        thinking,
        tools,
    }
}
