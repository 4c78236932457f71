use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use bytes::Bytes;
use relay_core::builder::UpstreamRequestBuilder;
use relay_core::headers::header_get;
use relay_core::upstream_client::{
    UpstreamBody, UpstreamClient, UpstreamHttpRequest, UpstreamHttpResponse,
};
use relay_core::{RelayState, UpstreamFailure, UpstreamTransportErrorKind};
use relay_protocol::sse::{SseEvent, SseParser};
use relay_router::{CHAT_EDGE_PATH, CHAT_SERVER_PATH, REQUEST_ID_HEADER, chat_router};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower::ServiceExt;

enum Script {
    Respond {
        status: u16,
        chunks: Vec<Result<Bytes, UpstreamFailure>>,
    },
    Fail(UpstreamFailure),
}

struct ScriptedUpstream {
    script: Mutex<Option<Script>>,
    calls: AtomicUsize,
    last_request: Mutex<Option<UpstreamHttpRequest>>,
}

impl ScriptedUpstream {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(Some(script)),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    fn streaming(chunks: &[&'static str]) -> Arc<Self> {
        Self::new(Script::Respond {
            status: 200,
            chunks: chunks.iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))).collect(),
        })
    }
}

impl UpstreamClient for ScriptedUpstream {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>
    {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(req);
        let script = self.script.lock().unwrap().take().expect("upstream called twice");
        Box::pin(async move {
            match script {
                Script::Fail(failure) => Err(failure),
                Script::Respond { status, chunks } if status >= 400 => {
                    let body: Vec<u8> = chunks
                        .into_iter()
                        .filter_map(Result::ok)
                        .flat_map(|chunk| chunk.to_vec())
                        .collect();
                    Ok(UpstreamHttpResponse {
                        status,
                        body: UpstreamBody::Bytes(Bytes::from(body)),
                    })
                }
                Script::Respond { status, chunks } => {
                    let (tx, rx) = mpsc::channel(chunks.len().max(1));
                    for chunk in chunks {
                        tx.try_send(chunk).unwrap();
                    }
                    Ok(UpstreamHttpResponse {
                        status,
                        body: UpstreamBody::Stream(rx),
                    })
                }
            }
        })
    }
}

const TEXT_TURN: &[&str] = &[
    "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"type\":\"message\",\"role\":\"assistant\",\"model\":\"claude-sonnet-4-20250514\",\"content\":[],\"usage\":{\"input_tokens\":3,\"output_tokens\":1}}}\n\n",
    "event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
    "event: ping\ndata: {\"type\": \"ping\"}\n\n",
    "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"hi\"}}\n\n",
    "event: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
    "event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\",\"stop_sequence\":null},\"usage\":{\"output_tokens\":2}}\n\n",
    "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
];

fn app(upstream: Arc<ScriptedUpstream>) -> Router {
    app_with_key(upstream, Some("sk-test"))
}

fn app_with_key(upstream: Arc<ScriptedUpstream>, key: Option<&str>) -> Router {
    let builder = UpstreamRequestBuilder::new(key.map(str::to_string), "http://upstream.test");
    chat_router(RelayState::new(builder, upstream))
}

fn hello() -> Value {
    json!({"messages": [{"role": "user", "content": "hello"}]})
}

async fn post(app: Router, path: &str, body: impl Into<Body>) -> Response {
    let req = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap();
    app.oneshot(req).await.unwrap()
}

async fn body_text(resp: Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn frames(resp: Response) -> Vec<SseEvent> {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let mut parser = SseParser::new();
    let mut out = parser.push_bytes(&bytes);
    out.extend(parser.finish());
    out
}

fn names(frames: &[SseEvent]) -> Vec<&str> {
    frames
        .iter()
        .map(|frame| frame.event.as_deref().unwrap_or(""))
        .collect()
}

fn data(frame: &SseEvent) -> Value {
    serde_json::from_str(&frame.data).unwrap()
}

fn header_str<'a>(resp: &'a Response, name: &str) -> Option<&'a str> {
    resp.headers().get(name).and_then(|value| value.to_str().ok())
}

#[tokio::test]
async fn streams_translated_frames_on_both_variants() {
    for path in [CHAT_SERVER_PATH, CHAT_EDGE_PATH] {
        let upstream = ScriptedUpstream::streaming(TEXT_TURN);
        let resp = post(app(upstream.clone()), path, hello().to_string()).await;

        assert_eq!(resp.status(), StatusCode::OK, "{path}");
        assert_eq!(header_str(&resp, "content-type"), Some("text/event-stream"));
        assert_eq!(header_str(&resp, "cache-control"), Some("no-cache"));
        assert_eq!(header_str(&resp, "connection"), Some("keep-alive"));
        assert_eq!(header_str(&resp, "access-control-allow-origin"), Some("*"));
        assert_eq!(
            header_str(&resp, "access-control-allow-headers"),
            Some("Cache-Control")
        );
        assert!(header_str(&resp, REQUEST_ID_HEADER).is_some());

        let frames = frames(resp).await;
        assert_eq!(
            names(&frames),
            vec![
                "message_start",
                "content_block_start",
                "ping",
                "text_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
                "done",
            ],
            "{path}"
        );
        assert_eq!(data(&frames[3]), json!({"index": 0, "text": "hi"}));
        assert_eq!(data(&frames[2]), json!({}));
        assert_eq!(data(&frames[7]), json!({}));
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn upstream_request_carries_key_and_flags() {
    let upstream = ScriptedUpstream::streaming(TEXT_TURN);
    let body = json!({
        "messages": [{"role": "user", "content": "search this"}],
        "enableThinking": true,
        "enableWebSearch": true
    });
    let resp = post(app(upstream.clone()), CHAT_SERVER_PATH, body.to_string()).await;
    let _ = frames(resp).await;

    let sent = upstream.last_request.lock().unwrap().take().unwrap();
    assert_eq!(sent.url, "http://upstream.test/v1/messages");
    assert_eq!(header_get(&sent.headers, "x-api-key"), Some("sk-test"));
    let sent_body: Value = serde_json::from_slice(&sent.body).unwrap();
    assert_eq!(sent_body["thinking"]["budget_tokens"], 10000);
    assert_eq!(sent_body["tools"][0]["max_uses"], 10);
    assert_eq!(sent_body["stream"], true);
}

#[tokio::test]
async fn validation_failures_are_plain_400() {
    let too_long = json!({
        "messages": (0..51).map(|_| json!({"role": "user", "content": "x"})).collect::<Vec<_>>()
    });
    let cases = [
        ("{oops".to_string(), "Invalid JSON"),
        (json!({"messages": []}).to_string(), "Messages array cannot be empty"),
        (
            json!({"messages": [{"role": "system", "content": "x"}]}).to_string(),
            "Message role must be either \"user\" or \"assistant\"",
        ),
        (
            too_long.to_string(),
            "Conversation history too long. Maximum 50 messages allowed.",
        ),
        (
            json!({"messages": [{"role": "user", "content": "x"}], "thinkingBudget": 1023})
                .to_string(),
            "thinkingBudget must be a number between 1024 and 100000",
        ),
    ];
    for path in [CHAT_SERVER_PATH, CHAT_EDGE_PATH] {
        for (body, message) in &cases {
            let upstream = ScriptedUpstream::streaming(TEXT_TURN);
            let resp = post(app(upstream.clone()), path, body.clone()).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{path} {body}");
            assert_eq!(body_text(resp).await, *message);
            assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
        }
    }
}

#[tokio::test]
async fn large_history_is_not_size_limited() {
    let content = "x".repeat(50_000);
    let body = json!({
        "messages": (0..50)
            .map(|i| {
                let role = if i % 2 == 0 { "user" } else { "assistant" };
                json!({"role": role, "content": content})
            })
            .collect::<Vec<_>>()
    })
    .to_string();
    assert!(body.len() > 2 * 1024 * 1024);

    for path in [CHAT_SERVER_PATH, CHAT_EDGE_PATH] {
        let upstream = ScriptedUpstream::streaming(TEXT_TURN);
        let resp = post(app(upstream.clone()), path, body.clone()).await;
        assert_eq!(resp.status(), StatusCode::OK, "{path}");
        let frames = frames(resp).await;
        assert_eq!(names(&frames).last(), Some(&"done"));
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn missing_key_is_500_before_upstream() {
    for path in [CHAT_SERVER_PATH, CHAT_EDGE_PATH] {
        let upstream = ScriptedUpstream::streaming(TEXT_TURN);
        let resp = post(app_with_key(upstream.clone(), None), path, hello().to_string()).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(resp).await, "Anthropic API key not configured");
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
    }
}

fn rate_limited() -> Arc<ScriptedUpstream> {
    ScriptedUpstream::new(Script::Respond {
        status: 429,
        chunks: vec![Ok(Bytes::from_static(
            br#"{"type":"error","error":{"type":"rate_limit_error","message":"Rate limited"}}"#,
        ))],
    })
}

#[tokio::test]
async fn server_reports_open_failure_as_http_status() {
    let resp = post(app(rate_limited()), CHAT_SERVER_PATH, hello().to_string()).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_text(resp).await, "Rate limited");
}

#[tokio::test]
async fn edge_reports_open_failure_in_band() {
    let resp = post(app(rate_limited()), CHAT_EDGE_PATH, hello().to_string()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let frames = frames(resp).await;
    assert_eq!(names(&frames), vec!["error"]);
    assert_eq!(
        data(&frames[0]),
        json!({"error": "Rate limited", "status": 429})
    );
}

#[tokio::test]
async fn server_transport_failure_is_500() {
    let upstream = ScriptedUpstream::new(Script::Fail(UpstreamFailure::Transport {
        kind: UpstreamTransportErrorKind::Connect,
        message: "connection refused".to_string(),
    }));
    let resp = post(app(upstream), CHAT_SERVER_PATH, hello().to_string()).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(resp).await, "connection refused");
}

#[tokio::test]
async fn mid_stream_failure_ends_with_error_frame() {
    for path in [CHAT_SERVER_PATH, CHAT_EDGE_PATH] {
        let upstream = ScriptedUpstream::new(Script::Respond {
            status: 200,
            chunks: vec![
                Ok(Bytes::from_static(TEXT_TURN[0].as_bytes())),
                Ok(Bytes::from_static(TEXT_TURN[1].as_bytes())),
                Err(UpstreamFailure::Transport {
                    kind: UpstreamTransportErrorKind::Body,
                    message: "stream reset".to_string(),
                }),
            ],
        });
        let resp = post(app(upstream), path, hello().to_string()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let frames = frames(resp).await;
        assert_eq!(
            names(&frames),
            vec!["message_start", "content_block_start", "error"],
            "{path}"
        );
        assert_eq!(
            data(&frames[2]),
            json!({"error": "stream reset", "status": 500})
        );
    }
}

#[tokio::test]
async fn in_band_provider_error_is_forwarded() {
    let upstream = ScriptedUpstream::streaming(&[
        TEXT_TURN[0],
        "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
    ]);
    let resp = post(app(upstream), CHAT_SERVER_PATH, hello().to_string()).await;
    let frames = frames(resp).await;
    assert_eq!(names(&frames), vec!["message_start", "error"]);
    assert_eq!(
        data(&frames[1]),
        json!({"error": "Overloaded", "status": 529})
    );
}

#[tokio::test]
async fn preflight_answers_with_cors_headers() {
    for path in [CHAT_SERVER_PATH, CHAT_EDGE_PATH] {
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri(path)
            .body(Body::from("ignored payload"))
            .unwrap();
        let resp = app(ScriptedUpstream::streaming(TEXT_TURN))
            .oneshot(req)
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(header_str(&resp, "access-control-allow-origin"), Some("*"));
        assert_eq!(
            header_str(&resp, "access-control-allow-methods"),
            Some("POST, OPTIONS")
        );
        assert_eq!(
            header_str(&resp, "access-control-allow-headers"),
            Some("Content-Type")
        );
        assert!(body_text(resp).await.is_empty());
    }
}

#[tokio::test]
async fn other_methods_are_405() {
    for method in [Method::GET, Method::PUT, Method::DELETE] {
        let req = Request::builder()
            .method(method.clone())
            .uri(CHAT_EDGE_PATH)
            .body(Body::empty())
            .unwrap();
        let resp = app(ScriptedUpstream::streaming(TEXT_TURN))
            .oneshot(req)
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
        assert_eq!(body_text(resp).await, "Method not allowed");
    }
}
