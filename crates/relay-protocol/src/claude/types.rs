use serde::{Deserialize, Serialize};

pub type RequestId = String;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnthropicHeaders {
    #[serde(rename = "anthropic-version")]
    pub anthropic_version: AnthropicVersion,
}

impl AnthropicHeaders {
    pub fn pairs(&self) -> [(&'static str, &'static str); 1] {
        [("anthropic-version", self.anthropic_version.as_str())]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AnthropicVersion {
    #[default]
    #[serde(rename = "2023-06-01")]
    V20230601,
}

impl AnthropicVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            AnthropicVersion::V20230601 => "2023-06-01",
        }
    }
}
