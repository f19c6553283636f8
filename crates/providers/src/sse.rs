//! Server-Sent Events decoding for the generation service's streams.
//!
//! Section streams name the section in the `event:` field and carry its JSON
//! payload in `data:`. Chat streams carry `{"delta": "..."}` objects. Either
//! stream ends with `data: [DONE]`; an `event: error` block aborts it.

use anyhow::{anyhow, Result};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;
use shared::result::SectionChunk;
use std::collections::VecDeque;
use std::fmt::Display;

const DONE_MARKER: &str = "[DONE]";

/// A single parsed SSE event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    /// The `event:` field, if present.
    pub event: Option<String>,
    /// The `data:` field content (multi-line data joined with `\n`).
    pub data: String,
}

#[derive(Debug, Deserialize)]
struct DeltaPayload {
    delta: String,
}

impl SseEvent {
    pub fn is_done(&self) -> bool {
        self.data.trim() == DONE_MARKER
    }

    fn error(&self) -> Option<anyhow::Error> {
        (self.event.as_deref() == Some("error"))
            .then(|| anyhow!("generation service error: {}", self.data.trim()))
    }

    /// Decode a section chunk: a named event carries a bare payload, an
    /// unnamed one carries a full `{section, payload}` object.
    pub fn into_section(self) -> Result<SectionChunk> {
        if let Some(err) = self.error() {
            return Err(err);
        }
        match self.event {
            Some(name) => {
                let payload = serde_json::from_str(&self.data)
                    .unwrap_or(serde_json::Value::String(self.data));
                Ok(SectionChunk::new(name, payload))
            }
            None => serde_json::from_str::<SectionChunk>(&self.data)
                .map_err(|e| anyhow!("malformed section event: {}", e)),
        }
    }

    pub fn into_delta(self) -> Result<String> {
        if let Some(err) = self.error() {
            return Err(err);
        }
        serde_json::from_str::<DeltaPayload>(&self.data)
            .map(|p| p.delta)
            .map_err(|e| anyhow!("malformed chat delta: {}", e))
    }
}

/// Incremental SSE parser that buffers incomplete blocks across chunk boundaries.
///
/// Bytes are kept undecoded until a whole block has arrived, so a multi-byte
/// character or a CRLF pair split between two chunks survives intact.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes. Returns every complete event found so far.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some((end, next)) = block_boundary(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..next).collect();
            // Keep the block's final line ending so `lines()` strips a trailing `\r`
            if let Some(event) = parse_block(&String::from_utf8_lossy(&block[..=end])) {
                events.push(event);
            }
        }
        events
    }
}

/// First blank line in `buffer`: `(newline ending the block, start of the next one)`.
/// Accepts `\n\n`, `\r\n\r\n` and mixed endings.
fn block_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(offset) = buffer[from..].iter().position(|&b| b == b'\n') {
        let newline = from + offset;
        let rest = &buffer[newline + 1..];
        if rest.starts_with(b"\n") {
            return Some((newline, newline + 2));
        }
        if rest.starts_with(b"\r\n") {
            return Some((newline, newline + 3));
        }
        from = newline + 1;
    }
    None
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();
    for line in block.lines() {
        if let Some(val) = line.strip_prefix("event:") {
            event = Some(val.trim().to_string());
        } else if let Some(val) = line.strip_prefix("data:") {
            data_lines.push(val.strip_prefix(' ').unwrap_or(val));
        }
        // id:, retry: and `:` comments are ignored
    }

    (!data_lines.is_empty()).then(|| SseEvent {
        event,
        data: data_lines.join("\n"),
    })
}

/// Turn a byte stream into a stream of SSE events, stopping at `[DONE]`.
pub fn sse_events<S, B, E>(bytes: S) -> BoxStream<'static, Result<SseEvent>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = (bytes.boxed(), SseParser::new(), VecDeque::<SseEvent>::new(), false);
    stream::unfold(
        state,
        |(mut bytes, mut parser, mut pending, mut finished)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    if event.is_done() {
                        return None;
                    }
                    return Some((Ok(event), (bytes, parser, pending, finished)));
                }
                if finished {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => pending.extend(parser.feed(chunk.as_ref())),
                    Some(Err(e)) => {
                        finished = true;
                        return Some((
                            Err(anyhow!("stream read error: {}", e)),
                            (bytes, parser, pending, finished),
                        ));
                    }
                    None => finished = true,
                }
            }
        },
    )
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::TryStreamExt;

    #[test]
    fn test_named_section_event() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: commentary\ndata: {\"text\":\"Light\"}\n\n");
        assert_eq!(events.len(), 1);
        let chunk = events[0].clone().into_section().unwrap();
        assert_eq!(chunk.section, "commentary");
        assert_eq!(chunk.payload["text"], "Light");
    }

    #[test]
    fn test_split_across_chunks_and_crlf() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: {\"delta\":\"In the beg").is_empty());
        let events = parser.feed(b"inning\"}\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].clone().into_delta().unwrap(), "In the beginning");
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let full = "data: {\"delta\":\"español\"}\n\n".as_bytes();
        let split = full.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut parser = SseParser::new();
        assert!(parser.feed(&full[..split]).is_empty());
        let events = parser.feed(&full[split..]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].clone().into_delta().unwrap(), "español");
    }

    #[test]
    fn test_crlf_boundary_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: {\"delta\":\"a\"}\r\n\r").is_empty());
        let events = parser.feed(b"\ndata: {\"delta\":\"b\"}\r\n\r\n");
        let deltas: Vec<String> = events
            .into_iter()
            .map(|e| e.into_delta().unwrap())
            .collect();
        assert_eq!(deltas, vec!["a", "b"]);
    }

    #[test]
    fn test_error_event() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: error\ndata: quota exceeded\n\n");
        let err = events[0].clone().into_section().unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn test_event_stream_stops_at_done() {
        let parts: Vec<std::result::Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"event: original_text\ndata: \"In the beginning\"\n\nevent: comm".to_vec()),
            Ok(b"entary\ndata: {}\n\ndata: [DONE]\n\nevent: late\ndata: 1\n\n".to_vec()),
        ];
        let events: Vec<SseEvent> =
            block_on(sse_events(futures::stream::iter(parts)).try_collect()).unwrap();
        let names: Vec<_> = events.iter().map(|e| e.event.clone().unwrap()).collect();
        assert_eq!(names, vec!["original_text", "commentary"]);
    }
}
