use clap::Parser;
use relay_common::RelayConfigPatch;

#[derive(Parser, Debug)]
#[command(name = "relay", about = "Streams Anthropic chat completions to browsers as SSE.")]
pub(crate) struct Cli {
    #[arg(long, env = "RELAY_HOST")]
    pub(crate) host: Option<String>,
    #[arg(long, env = "RELAY_PORT")]
    pub(crate) port: Option<u16>,
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub(crate) anthropic_api_key: Option<String>,
    #[arg(long, env = "ANTHROPIC_BASE_URL")]
    pub(crate) anthropic_base_url: Option<String>,
    /// Outbound proxy for upstream requests.
    #[arg(long, env = "RELAY_PROXY")]
    pub(crate) proxy: Option<String>,
    #[arg(long, env = "RELAY_CONNECT_TIMEOUT_SECS")]
    pub(crate) connect_timeout_secs: Option<u64>,
}

impl Cli {
    pub(crate) fn into_patch(self) -> RelayConfigPatch {
        RelayConfigPatch {
            host: self.host,
            port: self.port,
            anthropic_api_key: self.anthropic_api_key,
            anthropic_base_url: self.anthropic_base_url,
            proxy: self.proxy,
            connect_timeout_secs: self.connect_timeout_secs,
        }
    }
}
