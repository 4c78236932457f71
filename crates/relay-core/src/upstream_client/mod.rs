use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use relay_common::RelayConfig;
use relay_protocol::claude::error::ErrorResponse;
use tokio::sync::mpsc;
use wreq::{Client, Method, Proxy};

use crate::error::{UpstreamFailure, UpstreamTransportErrorKind};
use crate::headers::Headers;

const STREAM_CHANNEL_CAPACITY: usize = 16;
const FALLBACK_ERROR_MESSAGE: &str = "Anthropic API error";

/// A POST to the Messages API.
#[derive(Debug, Clone)]
pub struct UpstreamHttpRequest {
    pub url: String,
    pub headers: Headers,
    pub body: Bytes,
}

pub type UpstreamChunks = mpsc::Receiver<Result<Bytes, UpstreamFailure>>;

#[derive(Debug)]
pub enum UpstreamBody {
    Bytes(Bytes),
    Stream(UpstreamChunks),
}

#[derive(Debug)]
pub struct UpstreamHttpResponse {
    pub status: u16,
    pub body: UpstreamBody,
}

pub trait UpstreamClient: Send + Sync {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>;
}

/// Sends `req` and hands back its body chunks, or the failure that prevented
/// the stream from starting (including non-2xx responses).
pub async fn open_stream(
    client: &dyn UpstreamClient,
    req: UpstreamHttpRequest,
) -> Result<UpstreamChunks, UpstreamFailure> {
    let resp = client.send(req).await?;
    let is_success = (200..300).contains(&resp.status);
    match resp.body {
        UpstreamBody::Stream(rx) if is_success => Ok(rx),
        UpstreamBody::Bytes(body) if is_success => {
            // Some gateways answer a streaming request with a buffered body.
            let (tx, rx) = mpsc::channel(1);
            let _ = tx.try_send(Ok(body));
            Ok(rx)
        }
        UpstreamBody::Bytes(body) => Err(UpstreamFailure::Http {
            status: resp.status,
            message: error_message(resp.status, &body),
        }),
        UpstreamBody::Stream(mut rx) => {
            let mut body = Vec::new();
            while let Some(Ok(chunk)) = rx.recv().await {
                body.extend_from_slice(&chunk);
            }
            Err(UpstreamFailure::Http {
                status: resp.status,
                message: error_message(resp.status, &body),
            })
        }
    }
}

/// Human-readable message for a non-2xx Messages API response.
pub fn error_message(status: u16, body: &[u8]) -> String {
    if let Ok(parsed) = serde_json::from_slice::<ErrorResponse>(body) {
        return parsed.error.message;
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if !text.is_empty() {
        return text.to_string();
    }
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or(FALLBACK_ERROR_MESSAGE)
        .to_string()
}

#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    pub proxy: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl UpstreamClientConfig {
    pub fn from_relay(config: &RelayConfig) -> Self {
        Self {
            proxy: config.proxy.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            ..Self::default()
        }
    }
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(86400),
        }
    }
}

#[derive(Clone)]
pub struct WreqUpstreamClient {
    client: Client,
}

impl WreqUpstreamClient {
    pub fn new(config: UpstreamClientConfig) -> Result<Self, wreq::Error> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout);

        if let Some(proxy) = normalize_proxy(config.proxy) {
            builder = builder.proxy(Proxy::all(proxy.as_str())?);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

fn normalize_proxy(value: Option<String>) -> Option<String> {
    value
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
}

impl UpstreamClient for WreqUpstreamClient {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>
    {
        Box::pin(async move {
            let mut builder = self.client.request(Method::POST, &req.url);
            for (k, v) in &req.headers {
                builder = builder.header(k, v);
            }
            let resp = builder
                .body(req.body)
                .send()
                .await
                .map_err(map_wreq_error)?;
            convert_response(resp).await
        })
    }
}

async fn convert_response(resp: wreq::Response) -> Result<UpstreamHttpResponse, UpstreamFailure> {
    let status = resp.status().as_u16();

    if !(200..300).contains(&status) {
        let body = resp.bytes().await.map_err(map_wreq_error)?;
        return Ok(UpstreamHttpResponse {
            status,
            body: UpstreamBody::Bytes(body),
        });
    }

    let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut stream = resp.bytes_stream();
        while let Some(item) = stream.next().await {
            let item = item.map_err(|err| {
                let mut failure = map_wreq_error(err);
                if let UpstreamFailure::Transport { kind, .. } = &mut failure {
                    if *kind == UpstreamTransportErrorKind::Other {
                        *kind = UpstreamTransportErrorKind::Body;
                    }
                }
                failure
            });
            let failed = item.is_err();
            if tx.send(item).await.is_err() || failed {
                break;
            }
        }
    });

    Ok(UpstreamHttpResponse {
        status,
        body: UpstreamBody::Stream(rx),
    })
}

fn map_wreq_error(err: wreq::Error) -> UpstreamFailure {
    let kind = classify_wreq_error(&err);
    UpstreamFailure::Transport {
        kind,
        message: err.to_string(),
    }
}

fn classify_wreq_error(err: &wreq::Error) -> UpstreamTransportErrorKind {
    let message = err.to_string().to_ascii_lowercase();
    if err.is_timeout() {
        return UpstreamTransportErrorKind::Timeout;
    }
    if err.is_connect() {
        if message.contains("dns") || message.contains("resolve") {
            return UpstreamTransportErrorKind::Dns;
        }
        if message.contains("tls") || message.contains("ssl") {
            return UpstreamTransportErrorKind::Tls;
        }
        return UpstreamTransportErrorKind::Connect;
    }
    if message.contains("tls") || message.contains("ssl") {
        return UpstreamTransportErrorKind::Tls;
    }
    UpstreamTransportErrorKind::Other
}
