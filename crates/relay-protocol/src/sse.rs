use bytes::Bytes;
use serde::Serialize;

pub const CONTENT_TYPE: &str = "text/event-stream";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental `text/event-stream` decoder.
///
/// Bytes may be fed in arbitrary slices; an event is only yielded once its
/// terminating blank line has been seen (or on [`SseParser::finish`]).
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    pending_utf8: Vec<u8>,
    event: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        // A multi-byte character may be split across network reads; invalid
        // bytes decode to U+FFFD.
        self.pending_utf8.extend_from_slice(chunk);
        let complete_len = complete_utf8_len(&self.pending_utf8);
        let rest = self.pending_utf8.split_off(complete_len);
        let complete = std::mem::replace(&mut self.pending_utf8, rest);
        self.push_str(&String::from_utf8_lossy(&complete))
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let mut line = self.buffer[..pos].to_string();
            self.buffer.drain(..=pos);

            if line.ends_with('\r') {
                line.pop();
            }

            if line.is_empty() {
                self.finish_event(&mut events);
                continue;
            }
            self.apply_line(&line);
        }

        events
    }

    pub fn finish(&mut self) -> Vec<SseEvent> {
        let tail = std::mem::take(&mut self.pending_utf8);
        let mut events = self.push_str(&String::from_utf8_lossy(&tail));
        if !self.buffer.is_empty() {
            let mut line = std::mem::take(&mut self.buffer);
            if line.ends_with('\r') {
                line.pop();
            }
            self.apply_line(&line);
        }
        self.finish_event(&mut events);
        events
    }

    fn apply_line(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }

        if let Some(value) = line.strip_prefix("event:") {
            let value = value.trim_start();
            self.event = if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            };
            return;
        }
        if line == "event" {
            self.event = None;
            return;
        }

        if let Some(value) = line.strip_prefix("data:") {
            self.data_lines.push(value.trim_start().to_string());
            return;
        }
        if line == "data" {
            self.data_lines.push(String::new());
        }
    }

    fn finish_event(&mut self, events: &mut Vec<SseEvent>) {
        if self.event.is_none() && self.data_lines.is_empty() {
            return;
        }
        let data = self.data_lines.join("\n");
        events.push(SseEvent {
            event: self.event.take(),
            data,
        });
        self.data_lines.clear();
    }
}

/// Length of the prefix of `bytes` that is not an incomplete trailing
/// UTF-8 sequence.
fn complete_utf8_len(bytes: &[u8]) -> usize {
    let mut offset = 0;
    loop {
        match std::str::from_utf8(&bytes[offset..]) {
            Ok(_) => return bytes.len(),
            Err(err) => match err.error_len() {
                Some(len) => offset += err.valid_up_to() + len,
                None => return offset + err.valid_up_to(),
            },
        }
    }
}

/// Encodes one named frame: `event: <name>\ndata: <json>\n\n`.
pub fn encode_frame<T: Serialize + ?Sized>(
    name: &str,
    payload: &T,
) -> Result<Bytes, serde_json::Error> {
    let payload = serde_json::to_vec(payload)?;
    let mut data = Vec::with_capacity(payload.len() + name.len() + 16);
    data.extend_from_slice(b"event: ");
    data.extend_from_slice(name.as_bytes());
    data.extend_from_slice(b"\ndata: ");
    data.extend_from_slice(&payload);
    data.extend_from_slice(b"\n\n");
    Ok(Bytes::from(data))
}
