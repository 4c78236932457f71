use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use relay_protocol::chat::OutboundEvent;
use relay_protocol::claude::create_message::{
    BetaStreamContentBlock, BetaStreamContentBlockDelta, BetaStreamEvent, BetaStreamEventKnown,
};
use tracing::{debug, warn};

use crate::builder::WEB_SEARCH_TOOL_NAME;
use crate::error::UpstreamFailure;

/// The receiving side of an outbound event stream went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("downstream closed")]
pub struct SinkClosed;

/// Where translated events go. Implementations write one frame per call, in
/// call order.
#[async_trait]
pub trait FrameSink: Send {
    async fn emit(&mut self, event: &OutboundEvent) -> Result<(), SinkClosed>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySummary {
    /// Frames emitted, including the terminal one.
    pub frames: usize,
    /// Set when the stream ended with an `error` frame.
    pub failure: Option<UpstreamFailure>,
}

/// Maps one upstream chunk onto the outbound events it produces.
///
/// A provider `error` chunk is returned as the failure that ends the stream.
pub fn translate(event: BetaStreamEvent) -> Result<Vec<OutboundEvent>, UpstreamFailure> {
    let known = match event {
        BetaStreamEvent::Known(known) => known,
        BetaStreamEvent::Unknown(_) => return Ok(Vec::new()),
    };

    let events = match known {
        BetaStreamEventKnown::MessageStart { message } => vec![OutboundEvent::MessageStart {
            id: message.id,
            model: message.model,
            role: message.role,
            usage: message.usage,
        }],
        BetaStreamEventKnown::ContentBlockStart {
            index,
            content_block,
        } => {
            let extra = match BetaStreamContentBlock::from_value(&content_block) {
                BetaStreamContentBlock::ServerToolUse { id, name } if name == WEB_SEARCH_TOOL_NAME => {
                    Some(OutboundEvent::WebSearchStart {
                        index,
                        tool_use_id: id,
                    })
                }
                BetaStreamContentBlock::WebSearchToolResult {
                    tool_use_id,
                    content,
                } => Some(OutboundEvent::WebSearchResult {
                    index,
                    tool_use_id,
                    results: content,
                }),
                _ => None,
            };
            let mut events = vec![OutboundEvent::ContentBlockStart {
                index,
                content_block,
            }];
            events.extend(extra);
            events
        }
        BetaStreamEventKnown::ContentBlockDelta { index, delta } => match delta {
            BetaStreamContentBlockDelta::TextDelta { text } => {
                vec![OutboundEvent::TextDelta { index, text }]
            }
            BetaStreamContentBlockDelta::ThinkingDelta { text, thinking } => {
                let text = [text, thinking]
                    .into_iter()
                    .flatten()
                    .find(|value| !value.is_empty())
                    .unwrap_or_default();
                vec![OutboundEvent::ThinkingDelta { index, text }]
            }
            BetaStreamContentBlockDelta::InputJsonDelta { partial_json } => {
                vec![OutboundEvent::ToolInputDelta {
                    index,
                    partial_json,
                }]
            }
            BetaStreamContentBlockDelta::CitationsDelta { .. }
            | BetaStreamContentBlockDelta::SignatureDelta { .. }
            | BetaStreamContentBlockDelta::Unknown => Vec::new(),
        },
        BetaStreamEventKnown::ContentBlockStop { index } => {
            vec![OutboundEvent::ContentBlockStop { index }]
        }
        BetaStreamEventKnown::MessageDelta { delta, usage } => {
            vec![OutboundEvent::MessageDelta { delta, usage }]
        }
        BetaStreamEventKnown::MessageStop => vec![OutboundEvent::MessageStop {}],
        BetaStreamEventKnown::Ping => vec![OutboundEvent::Ping {}],
        BetaStreamEventKnown::Error { error, .. } => {
            return Err(UpstreamFailure::Stream {
                status: error.r#type.status_code(),
                message: error.message,
            });
        }
    };
    Ok(events)
}

/// Drives an upstream chunk stream into `sink` until it completes (`done`) or
/// fails (`error`).
///
/// Only a closed sink is reported as an error; upstream failures end up in
/// the stream itself.
pub async fn relay_events<S, K>(upstream: S, sink: &mut K) -> Result<RelaySummary, SinkClosed>
where
    S: Stream<Item = Result<BetaStreamEvent, UpstreamFailure>>,
    K: FrameSink + ?Sized,
{
    let mut upstream = std::pin::pin!(upstream);
    let mut frames = 0usize;

    while let Some(item) = upstream.next().await {
        if let Ok(BetaStreamEvent::Unknown(value)) = &item {
            debug!(
                event = "upstream_chunk_ignored",
                kind = %value.get("type").and_then(|kind| kind.as_str()).unwrap_or("<none>")
            );
        }
        match item.and_then(translate) {
            Ok(events) => {
                for event in &events {
                    sink.emit(event).await?;
                    frames += 1;
                }
            }
            Err(failure) => {
                emit_failure(sink, &failure).await?;
                return Ok(RelaySummary {
                    frames: frames + 1,
                    failure: Some(failure),
                });
            }
        }
    }

    sink.emit(&OutboundEvent::Done {}).await?;
    Ok(RelaySummary {
        frames: frames + 1,
        failure: None,
    })
}

/// Writes the terminal `error` frame for `failure`.
pub async fn emit_failure<K>(sink: &mut K, failure: &UpstreamFailure) -> Result<(), SinkClosed>
where
    K: FrameSink + ?Sized,
{
    warn!(
        event = "upstream_failed",
        status = failure.status(),
        kind = failure.kind(),
        message = %failure,
        in_band = true
    );
    sink.emit(&OutboundEvent::error(failure.to_string(), failure.status()))
        .await
}

const INTERNAL_ERROR_FRAME: &[u8] =
    b"event: error\ndata: {\"error\":\"Internal server error\",\"status\":500}\n\n";

/// Encodes `event` as one SSE frame.
pub fn frame_bytes(event: &OutboundEvent) -> Bytes {
    match event.to_frame() {
        Ok(frame) => frame,
        Err(err) => {
            warn!(event = "frame_encode_failed", name = event.name(), error = %err);
            Bytes::from_static(INTERNAL_ERROR_FRAME)
        }
    }
}
