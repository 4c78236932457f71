use std::collections::VecDeque;

use futures_util::Stream;
use futures_util::stream;
use relay_protocol::claude::create_message::BetaStreamEvent;
use relay_protocol::sse::{SseEvent, SseParser};

use crate::error::UpstreamFailure;
use crate::upstream_client::UpstreamChunks;

struct DecodeState {
    chunks: UpstreamChunks,
    parser: SseParser,
    ready: VecDeque<SseEvent>,
    finished: bool,
}

/// Decodes an upstream Messages API body into stream chunks.
///
/// A transport error or undecodable event is yielded once, after which the
/// stream ends.
pub fn decode_events(
    chunks: UpstreamChunks,
) -> impl Stream<Item = Result<BetaStreamEvent, UpstreamFailure>> + Send {
    let state = DecodeState {
        chunks,
        parser: SseParser::new(),
        ready: VecDeque::new(),
        finished: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                if event.data.is_empty() {
                    continue;
                }
                let decoded = decode_event(&event);
                if decoded.is_err() {
                    state.ready.clear();
                    state.finished = true;
                }
                return Some((decoded, state));
            }
            if state.finished {
                return None;
            }
            match state.chunks.recv().await {
                Some(Ok(chunk)) => state.ready.extend(state.parser.push_bytes(&chunk)),
                Some(Err(failure)) => {
                    state.finished = true;
                    return Some((Err(failure), state));
                }
                None => {
                    state.finished = true;
                    state.ready.extend(state.parser.finish());
                }
            }
        }
    })
}

fn decode_event(event: &SseEvent) -> Result<BetaStreamEvent, UpstreamFailure> {
    serde_json::from_str(&event.data).map_err(|err| {
        UpstreamFailure::Decode(format!(
            "{}: {err}",
            event.event.as_deref().unwrap_or("message")
        ))
    })
}
