pub mod builder;
pub mod decode;
pub mod error;
pub mod headers;
pub mod state;
pub mod translate;
pub mod upstream_client;
pub mod validate;

pub use builder::{BuildError, ConfigurationError, UpstreamRequest, UpstreamRequestBuilder};
pub use error::{RelayError, UpstreamFailure, UpstreamTransportErrorKind};
pub use state::{RelayState, UpstreamEvents};
pub use translate::{FrameSink, RelaySummary, SinkClosed, emit_failure, frame_bytes, relay_events, translate};
pub use upstream_client::{
    UpstreamBody, UpstreamClient, UpstreamClientConfig, UpstreamHttpRequest, UpstreamHttpResponse,
    WreqUpstreamClient,
};
pub use validate::{ValidationError, validate_body};
