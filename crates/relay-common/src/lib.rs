use std::fmt;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RelayConfigError {
    #[error("invalid relay config field {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

/// Final, merged configuration used by the running process.
///
/// Merge order: CLI > ENV > defaults.
#[derive(Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Absent is allowed: the server still starts and every chat request
    /// fails with a configuration error.
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,
    /// Optional outbound proxy (for upstream egress).
    pub proxy: Option<String>,
    pub connect_timeout_secs: u64,
}

impl RelayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field(
                "anthropic_api_key",
                &self.anthropic_api_key.as_ref().map(|_| "***"),
            )
            .field("anthropic_base_url", &self.anthropic_base_url)
            .field("proxy", &self.proxy)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Optional layer used for merging config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: Option<String>,
    pub proxy: Option<String>,
    pub connect_timeout_secs: Option<u64>,
}

impl RelayConfigPatch {
    pub fn overlay(&mut self, other: RelayConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.anthropic_api_key.is_some() {
            self.anthropic_api_key = other.anthropic_api_key;
        }
        if other.anthropic_base_url.is_some() {
            self.anthropic_base_url = other.anthropic_base_url;
        }
        if other.proxy.is_some() {
            self.proxy = other.proxy;
        }
        if other.connect_timeout_secs.is_some() {
            self.connect_timeout_secs = other.connect_timeout_secs;
        }
    }

    pub fn into_config(self) -> Result<RelayConfig, RelayConfigError> {
        let anthropic_base_url = self
            .anthropic_base_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string());
        if anthropic_base_url.is_empty() {
            return Err(RelayConfigError::InvalidField {
                field: "anthropic_base_url",
                reason: "must not be empty",
            });
        }
        let connect_timeout_secs = self
            .connect_timeout_secs
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
        if connect_timeout_secs == 0 {
            return Err(RelayConfigError::InvalidField {
                field: "connect_timeout_secs",
                reason: "must be greater than zero",
            });
        }
        Ok(RelayConfig {
            host: self.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: self.port.unwrap_or(DEFAULT_PORT),
            anthropic_api_key: non_blank(self.anthropic_api_key),
            anthropic_base_url,
            proxy: non_blank(self.proxy),
            connect_timeout_secs,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = RelayConfigPatch::default().into_config().unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:8787");
        assert_eq!(config.anthropic_base_url, DEFAULT_ANTHROPIC_BASE_URL);
        assert_eq!(config.anthropic_api_key, None);
    }

    #[test]
    fn overlay_prefers_later_layer() {
        let mut patch = RelayConfigPatch {
            port: Some(1),
            anthropic_api_key: Some("env-key".to_string()),
            ..Default::default()
        };
        patch.overlay(RelayConfigPatch {
            port: Some(2),
            ..Default::default()
        });
        let config = patch.into_config().unwrap();
        assert_eq!(config.port, 2);
        assert_eq!(config.anthropic_api_key.as_deref(), Some("env-key"));
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let config = RelayConfigPatch {
            anthropic_api_key: Some("   ".to_string()),
            anthropic_base_url: Some("https://example.test/".to_string()),
            ..Default::default()
        }
        .into_config()
        .unwrap();
        assert_eq!(config.anthropic_api_key, None);
        assert_eq!(config.anthropic_base_url, "https://example.test");
    }

    #[test]
    fn debug_redacts_key() {
        let config = RelayConfigPatch {
            anthropic_api_key: Some("sk-secret".to_string()),
            ..Default::default()
        }
        .into_config()
        .unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn zero_connect_timeout_is_rejected() {
        let err = RelayConfigPatch {
            connect_timeout_secs: Some(0),
            ..Default::default()
        }
        .into_config()
        .unwrap_err();
        assert!(matches!(
            err,
            RelayConfigError::InvalidField {
                field: "connect_timeout_secs",
                ..
            }
        ));
    }
}
