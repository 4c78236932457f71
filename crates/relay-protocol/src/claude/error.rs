use serde::{Deserialize, Serialize};

use crate::claude::types::RequestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorTypeKnown {
    #[serde(rename = "invalid_request_error")]
    InvalidRequestError,
    #[serde(rename = "authentication_error")]
    AuthenticationError,
    #[serde(rename = "permission_error")]
    PermissionError,
    #[serde(rename = "not_found_error")]
    NotFoundError,
    #[serde(rename = "request_too_large")]
    RequestTooLarge,
    #[serde(rename = "rate_limit_error")]
    RateLimitError,
    #[serde(rename = "api_error")]
    ApiError,
    #[serde(rename = "overloaded_error")]
    OverloadedError,
}

impl ErrorTypeKnown {
    /// HTTP status the provider pairs with this error type.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorTypeKnown::InvalidRequestError => 400,
            ErrorTypeKnown::AuthenticationError => 401,
            ErrorTypeKnown::PermissionError => 403,
            ErrorTypeKnown::NotFoundError => 404,
            ErrorTypeKnown::RequestTooLarge => 413,
            ErrorTypeKnown::RateLimitError => 429,
            ErrorTypeKnown::ApiError => 500,
            ErrorTypeKnown::OverloadedError => 529,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorType {
    Known(ErrorTypeKnown),
    Custom(String),
}

impl ErrorType {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorType::Known(kind) => kind.status_code(),
            ErrorType::Custom(_) => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub r#type: ErrorType,
    pub message: String,
}

/// Body of a non-2xx response from the Messages API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
}
