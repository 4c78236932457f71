use std::pin::Pin;
use std::sync::Arc;

use futures_util::Stream;
use relay_common::RelayConfig;
use relay_protocol::claude::create_message::BetaStreamEvent;

use crate::builder::UpstreamRequestBuilder;
use crate::decode::decode_events;
use crate::error::UpstreamFailure;
use crate::upstream_client::{
    UpstreamClient, UpstreamClientConfig, UpstreamHttpRequest, WreqUpstreamClient, open_stream,
};

pub type UpstreamEvents =
    Pin<Box<dyn Stream<Item = Result<BetaStreamEvent, UpstreamFailure>> + Send>>;

/// Shared, read-only state for the chat endpoints.
#[derive(Clone)]
pub struct RelayState {
    pub builder: UpstreamRequestBuilder,
    pub upstream: Arc<dyn UpstreamClient>,
}

impl RelayState {
    pub fn new(builder: UpstreamRequestBuilder, upstream: Arc<dyn UpstreamClient>) -> Self {
        Self { builder, upstream }
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self, wreq::Error> {
        let client = WreqUpstreamClient::new(UpstreamClientConfig::from_relay(config))?;
        Ok(Self::new(
            UpstreamRequestBuilder::new(
                config.anthropic_api_key.clone(),
                config.anthropic_base_url.clone(),
            ),
            Arc::new(client),
        ))
    }

    /// Opens the upstream stream and decodes it into chunks.
    pub async fn open_events(
        &self,
        request: UpstreamHttpRequest,
    ) -> Result<UpstreamEvents, UpstreamFailure> {
        let chunks = open_stream(self.upstream.as_ref(), request).await?;
        Ok(Box::pin(decode_events(chunks)))
    }
}
