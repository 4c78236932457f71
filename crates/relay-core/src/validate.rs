//! Inbound chat payload validation.
//!
//! Checks run in a fixed order and stop at the first failure; the `Display`
//! text of each [`ValidationError`] is the exact message sent to the client.

use relay_protocol::chat::{ChatRequest, Message, Role};
use serde_json::{Map, Value};

pub const MAX_MESSAGES: usize = 50;
pub const MIN_THINKING_BUDGET: u32 = 1024;
pub const MAX_THINKING_BUDGET: u32 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid JSON")]
    MalformedBody,
    #[error(
        "Invalid request body. Expected {{ messages: Array, system?: string, enableThinking?: boolean, thinkingBudget?: number, enableWebSearch?: boolean }}"
    )]
    MissingMessages,
    #[error("Messages array cannot be empty")]
    EmptyMessages,
    #[error("Each message must have role and content properties")]
    MalformedMessage,
    #[error("Message role must be either \"user\" or \"assistant\"")]
    InvalidRole,
    #[error("Message content must be a non-empty string")]
    EmptyContent,
    #[error("Conversation history too long. Maximum 50 messages allowed.")]
    HistoryTooLong,
    #[error("enableThinking must be a boolean")]
    InvalidThinkingFlag,
    #[error("thinkingBudget must be a number between 1024 and 100000")]
    InvalidThinkingBudget,
    #[error("enableWebSearch must be a boolean")]
    InvalidWebSearchFlag,
}

pub fn validate_body(body: &[u8]) -> Result<ChatRequest, ValidationError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| ValidationError::MalformedBody)?;
    validate_value(&value)
}

pub fn validate_value(body: &Value) -> Result<ChatRequest, ValidationError> {
    let Some(object) = body.as_object() else {
        return Err(ValidationError::MissingMessages);
    };
    let Some(raw_messages) = object.get("messages").and_then(Value::as_array) else {
        return Err(ValidationError::MissingMessages);
    };
    if raw_messages.is_empty() {
        return Err(ValidationError::EmptyMessages);
    }

    let messages = raw_messages
        .iter()
        .map(validate_message)
        .collect::<Result<Vec<_>, _>>()?;

    if messages.len() > MAX_MESSAGES {
        return Err(ValidationError::HistoryTooLong);
    }

    let enable_thinking = optional_bool(object, "enableThinking")
        .map_err(|_| ValidationError::InvalidThinkingFlag)?;
    let thinking_budget = optional_budget(object)?;
    let enable_web_search = optional_bool(object, "enableWebSearch")
        .map_err(|_| ValidationError::InvalidWebSearchFlag)?;

    Ok(ChatRequest {
        messages,
        system: object
            .get("system")
            .and_then(Value::as_str)
            .map(str::to_string),
        enable_thinking,
        thinking_budget,
        enable_web_search,
    })
}

fn validate_message(message: &Value) -> Result<Message, ValidationError> {
    let role = message.get("role");
    let content = message.get("content");
    if !role.is_some_and(is_truthy) || !content.is_some_and(is_truthy) {
        return Err(ValidationError::MalformedMessage);
    }

    let role = role
        .and_then(Value::as_str)
        .and_then(Role::parse)
        .ok_or(ValidationError::InvalidRole)?;

    let content = content
        .and_then(Value::as_str)
        .filter(|text| !trim_js(text).is_empty())
        .ok_or(ValidationError::EmptyContent)?;

    Ok(Message {
        role,
        content: content.to_string(),
    })
}

/// `Ok(None)` when the key is absent; an explicit `null` is not a boolean.
fn optional_bool(object: &Map<String, Value>, key: &str) -> Result<Option<bool>, ()> {
    match object.get(key) {
        None => Ok(None),
        Some(Value::Bool(flag)) => Ok(Some(*flag)),
        Some(_) => Err(()),
    }
}

fn optional_budget(object: &Map<String, Value>) -> Result<Option<u32>, ValidationError> {
    let Some(value) = object.get("thinkingBudget") else {
        return Ok(None);
    };
    let budget = value
        .as_f64()
        .filter(|n| n.fract() == 0.0)
        .filter(|n| (f64::from(MIN_THINKING_BUDGET)..=f64::from(MAX_THINKING_BUDGET)).contains(n))
        .ok_or(ValidationError::InvalidThinkingBudget)?;
    Ok(Some(budget as u32))
}

/// JavaScript truthiness for JSON values.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// `String.prototype.trim`: ECMAScript WhiteSpace and LineTerminator.
fn trim_js(text: &str) -> &str {
    text.trim_matches(is_js_whitespace)
}

fn is_js_whitespace(c: char) -> bool {
    matches!(
        c,
        '\u{0009}'..='\u{000D}'
            | '\u{0020}'
            | '\u{00A0}'
            | '\u{1680}'
            | '\u{2000}'..='\u{200A}'
            | '\u{2028}'
            | '\u{2029}'
            | '\u{202F}'
            | '\u{205F}'
            | '\u{3000}'
            | '\u{FEFF}'
    )
}
