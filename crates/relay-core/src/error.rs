use bytes::Bytes;
use http::StatusCode;

use crate::builder::BuildError;
use crate::validate::ValidationError;

/// An error that is still reportable as an HTTP status, i.e. the response has
/// not been committed yet.
#[derive(Debug)]
pub struct RelayError {
    pub status: StatusCode,
    pub body: Bytes,
}

impl RelayError {
    pub fn new(status: StatusCode, message: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    }

    pub fn internal(message: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn message(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamTransportErrorKind {
    Timeout,
    Connect,
    Dns,
    Tls,
    Body,
    Other,
}

impl UpstreamTransportErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UpstreamTransportErrorKind::Timeout => "timeout",
            UpstreamTransportErrorKind::Connect => "connect",
            UpstreamTransportErrorKind::Dns => "dns",
            UpstreamTransportErrorKind::Tls => "tls",
            UpstreamTransportErrorKind::Body => "body",
            UpstreamTransportErrorKind::Other => "transport",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamFailure {
    /// Non-2xx response to the initial request.
    #[error("{message}")]
    Http { status: u16, message: String },
    /// The connection failed, before or during the stream.
    #[error("{message}")]
    Transport {
        kind: UpstreamTransportErrorKind,
        message: String,
    },
    /// The provider sent an `error` event inside the stream.
    #[error("{message}")]
    Stream { status: u16, message: String },
    #[error("invalid upstream event: {0}")]
    Decode(String),
}

impl UpstreamFailure {
    /// Status reported to the client for this failure.
    pub fn status(&self) -> u16 {
        match self {
            UpstreamFailure::Http { status, .. } | UpstreamFailure::Stream { status, .. } => {
                *status
            }
            UpstreamFailure::Transport { .. } | UpstreamFailure::Decode(_) => 500,
        }
    }

    /// Short failure class for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamFailure::Http { .. } => "http",
            UpstreamFailure::Transport { kind, .. } => kind.as_str(),
            UpstreamFailure::Stream { .. } => "provider_error",
            UpstreamFailure::Decode(_) => "decode",
        }
    }
}

impl From<UpstreamFailure> for RelayError {
    fn from(value: UpstreamFailure) -> Self {
        let status = StatusCode::from_u16(value.status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        RelayError::new(status, value.to_string())
    }
}

impl From<ValidationError> for RelayError {
    fn from(value: ValidationError) -> Self {
        RelayError::bad_request(value.to_string())
    }
}

impl From<BuildError> for RelayError {
    fn from(value: BuildError) -> Self {
        match value {
            BuildError::Configuration(err) => RelayError::internal(err.to_string()),
            BuildError::Encode(err) => RelayError::internal(format!("Internal server error: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_status_passthrough() {
        let err: RelayError = UpstreamFailure::Http {
            status: 429,
            message: "Number of request tokens has exceeded your rate limit".to_string(),
        }
        .into();
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert!(err.message().starts_with("Number of request tokens"));
    }

    #[test]
    fn provider_specific_status_survives() {
        let err: RelayError = UpstreamFailure::Http {
            status: 529,
            message: "Overloaded".to_string(),
        }
        .into();
        assert_eq!(err.status.as_u16(), 529);
    }

    #[test]
    fn transport_failures_are_500() {
        let failure = UpstreamFailure::Transport {
            kind: UpstreamTransportErrorKind::Connect,
            message: "connection refused".to_string(),
        };
        assert_eq!(failure.status(), 500);
        assert_eq!(failure.to_string(), "connection refused");
        assert_eq!(failure.kind(), "connect");
    }

    #[test]
    fn failure_kinds_for_logs() {
        let timeout = UpstreamFailure::Transport {
            kind: UpstreamTransportErrorKind::Timeout,
            message: "operation timed out".to_string(),
        };
        assert_eq!(timeout.kind(), "timeout");
        let stream = UpstreamFailure::Stream {
            status: 529,
            message: "Overloaded".to_string(),
        };
        assert_eq!(stream.kind(), "provider_error");
        assert_eq!(UpstreamFailure::Decode("x".to_string()).kind(), "decode");
    }

    #[test]
    fn missing_key_is_500_with_fixed_message() {
        let err: RelayError = BuildError::from(crate::builder::ConfigurationError).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "Anthropic API key not configured");
    }
}
