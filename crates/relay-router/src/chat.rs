use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use bytes::Bytes;
use futures_util::StreamExt;
use relay_core::upstream_client::UpstreamHttpRequest;
use relay_core::{
    FrameSink, RelayError, RelayState, RelaySummary, SinkClosed, emit_failure, frame_bytes,
    relay_events, validate_body,
};
use relay_protocol::chat::OutboundEvent;
use relay_protocol::sse;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

pub const CHAT_SERVER_PATH: &str = "/api/chat";
pub const CHAT_EDGE_PATH: &str = "/api/chat-edge";
pub const REQUEST_ID_HEADER: &str = "x-relay-request-id";

const VARIANT_SERVER: &str = "server";
const VARIANT_EDGE: &str = "edge";

pub fn chat_router(state: RelayState) -> Router {
    Router::new()
        .route(
            CHAT_SERVER_PATH,
            post(chat_server)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route(
            CHAT_EDGE_PATH,
            post(chat_edge)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .layer(DefaultBodyLimit::disable())
        .with_state(Arc::new(state))
}

/// Opens the upstream call before answering, so a failed open is reported
/// with the provider's status.
pub async fn chat_server(State(state): State<Arc<RelayState>>, body: Bytes) -> Response {
    let trace_id = Uuid::now_v7().to_string();
    let started_at = Instant::now();
    let request = match prepare(&state, &body, &trace_id, VARIANT_SERVER) {
        Ok(request) => request,
        Err(err) => return error_response(err, &trace_id),
    };

    let events = match state.open_events(request).await {
        Ok(events) => events,
        Err(failure) => {
            warn!(
                event = "upstream_failed",
                trace_id = %trace_id,
                status = failure.status(),
                kind = failure.kind(),
                message = %failure,
                in_band = false
            );
            return error_response(failure.into(), &trace_id);
        }
    };
    info!(event = "upstream_opened", trace_id = %trace_id, variant = VARIANT_SERVER);

    let (tx, rx) = mpsc::channel::<Bytes>(1);
    let span = info_span!("chat_stream", trace_id = %trace_id, variant = VARIANT_SERVER);
    tokio::spawn(
        async move {
            let mut sink = ServerSink { tx };
            log_outcome(relay_events(events, &mut sink).await, started_at);
        }
        .instrument(span),
    );

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    sse_response(Body::from_stream(stream), &trace_id)
}

/// Commits the event stream immediately; every upstream failure, including a
/// failed open, arrives as an `error` frame.
pub async fn chat_edge(State(state): State<Arc<RelayState>>, body: Bytes) -> Response {
    let trace_id = Uuid::now_v7().to_string();
    let started_at = Instant::now();
    let request = match prepare(&state, &body, &trace_id, VARIANT_EDGE) {
        Ok(request) => request,
        Err(err) => return error_response(err, &trace_id),
    };

    let (tx, rx) = mpsc::unbounded_channel::<Bytes>();
    let span = info_span!("chat_stream", trace_id = %trace_id, variant = VARIANT_EDGE);
    tokio::spawn(
        async move {
            let mut sink = EdgeSink { tx };
            let result = match state.open_events(request).await {
                Ok(events) => {
                    info!(event = "upstream_opened");
                    relay_events(events, &mut sink).await
                }
                Err(failure) => emit_failure(&mut sink, &failure).await.map(|()| RelaySummary {
                    frames: 1,
                    failure: Some(failure),
                }),
            };
            log_outcome(result, started_at);
        }
        .instrument(span),
    );

    let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);
    sse_response(Body::from_stream(stream), &trace_id)
}

/// Writes suspend until the response body has taken the previous frame.
struct ServerSink {
    tx: mpsc::Sender<Bytes>,
}

#[async_trait]
impl FrameSink for ServerSink {
    async fn emit(&mut self, event: &OutboundEvent) -> Result<(), SinkClosed> {
        self.tx
            .send(frame_bytes(event))
            .await
            .map_err(|_| SinkClosed)
    }
}

/// Enqueue never suspends.
struct EdgeSink {
    tx: mpsc::UnboundedSender<Bytes>,
}

#[async_trait]
impl FrameSink for EdgeSink {
    async fn emit(&mut self, event: &OutboundEvent) -> Result<(), SinkClosed> {
        self.tx.send(frame_bytes(event)).map_err(|_| SinkClosed)
    }
}

fn prepare(
    state: &RelayState,
    body: &[u8],
    trace_id: &str,
    variant: &'static str,
) -> Result<UpstreamHttpRequest, RelayError> {
    let chat = validate_body(body)?;
    info!(
        event = "downstream_received",
        trace_id = %trace_id,
        variant = variant,
        messages = chat.messages.len(),
        thinking = chat.enable_thinking == Some(true),
        web_search = chat.enable_web_search == Some(true)
    );
    Ok(state.builder.build_http(&chat)?)
}

fn log_outcome(result: Result<RelaySummary, SinkClosed>, started_at: Instant) {
    match result {
        Ok(summary) => info!(
            event = "stream_finished",
            frames = summary.frames,
            failed = summary.failure.is_some(),
            elapsed_ms = started_at.elapsed().as_millis()
        ),
        Err(SinkClosed) => debug!(
            event = "client_disconnected",
            elapsed_ms = started_at.elapsed().as_millis()
        ),
    }
}

async fn preflight() -> Response {
    let mut resp = StatusCode::OK.into_response();
    let headers = resp.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    resp
}

async fn method_not_allowed() -> Response {
    let trace_id = Uuid::now_v7().to_string();
    error_response(RelayError::method_not_allowed(), &trace_id)
}

fn sse_response(body: Body, trace_id: &str) -> Response {
    let mut resp = Response::new(body);
    let headers = resp.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(sse::CONTENT_TYPE),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Cache-Control"),
    );
    insert_request_id(&mut resp, trace_id);
    resp
}

fn error_response(err: RelayError, trace_id: &str) -> Response {
    warn!(
        event = "downstream_rejected",
        trace_id = %trace_id,
        status = err.status.as_u16(),
        message = %err.message()
    );
    let mut resp = (
        err.status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        err.body,
    )
        .into_response();
    insert_request_id(&mut resp, trace_id);
    resp
}

fn insert_request_id(resp: &mut Response, trace_id: &str) {
    if let Ok(value) = HeaderValue::from_str(trace_id) {
        resp.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
}
