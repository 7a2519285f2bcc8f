//! Decoding of the chunked-HTTP answer stream.
//!
//! The body is a sequence of `event: <type>` and `data: <payload>` lines.  An
//! `event:` line sets the type for every following `data:` line until the
//! next `event:` line.  Network reads may split anywhere, including inside a
//! multi-byte character, so the decoder buffers raw bytes and only decodes
//! complete lines.

use std::collections::VecDeque;
use std::fmt::Display;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;

use crate::observability::{STREAM_BYTES, STREAM_ERRORS, STREAM_EVENTS};
use crate::types::{ListingReference, StreamEvent};

/// Incremental line decoder for the answer stream.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network read and return the events it completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line[..newline]);
            if let Some(event) = self.line(line.strip_suffix('\r').unwrap_or(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Decode whatever is left after the body ended without a final newline.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest);
        self.line(line.strip_suffix('\r').unwrap_or(&line))
            .into_iter()
            .collect()
    }

    fn line(&mut self, line: &str) -> Option<StreamEvent> {
        if let Some(kind) = line.strip_prefix("event:") {
            self.event = Some(kind.trim().to_string());
            return None;
        }
        let raw = line.strip_prefix("data:")?.trim();
        let kind = self.event.as_deref()?;
        if raw.is_empty() {
            return None;
        }
        decode_data(kind, raw)
    }
}

fn decode_data(kind: &str, raw: &str) -> Option<StreamEvent> {
    let parsed = serde_json::from_str::<Value>(raw);
    match kind {
        "step" => parsed
            .ok()?
            .get("message")
            .and_then(Value::as_str)
            .map(StreamEvent::step),
        "chunk" => match parsed {
            Ok(Value::Object(fields)) => fields
                .get("content")
                .and_then(Value::as_str)
                .map(StreamEvent::chunk),
            Ok(Value::String(content)) => Some(StreamEvent::chunk(content)),
            Ok(_) | Err(_) => Some(StreamEvent::chunk(raw)),
        },
        "done" => {
            let references = match parsed {
                Ok(value) => ListingReference::list_from(value.get("references")),
                Err(_) => Vec::new(),
            };
            Some(StreamEvent::done(references))
        }
        "error" => {
            let detail = match parsed {
                Ok(Value::Object(fields)) => fields
                    .get("detail")
                    .or_else(|| fields.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                Ok(Value::String(detail)) => Some(detail),
                _ => None,
            };
            Some(StreamEvent::error(detail.unwrap_or_else(|| raw.to_string())))
        }
        _ => None,
    }
}

struct SseState<S> {
    bytes: Option<S>,
    decoder: SseDecoder,
    pending: VecDeque<StreamEvent>,
}

/// Turn a response body into answer events.
///
/// The result always ends with exactly one `done` or `error`: a body that
/// ends cleanly without one gets a `done` with no references, and a failed
/// read becomes an `error`.  The body is dropped as soon as the terminal
/// event is produced.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = StreamEvent> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin + Send + 'static,
    E: Display,
{
    let state = SseState {
        bytes: Some(byte_stream),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                if event.is_terminal() {
                    state.pending.clear();
                    state.bytes = None;
                }
                STREAM_EVENTS.click();
                return Some((event, state));
            }

            let bytes = state.bytes.as_mut()?;
            match bytes.next().await {
                Some(Ok(bytes)) => {
                    STREAM_BYTES.count(bytes.len() as u64);
                    let events = state.decoder.push(&bytes);
                    state.pending.extend(events);
                }
                Some(Err(err)) => {
                    STREAM_ERRORS.click();
                    tracing::warn!(error = %err, "answer stream read failed");
                    state
                        .pending
                        .push_back(StreamEvent::error(format!("Error in HTTP stream: {err}")));
                }
                None => {
                    let events = state.decoder.finish();
                    state.pending.extend(events);
                    state.pending.push_back(StreamEvent::done(Vec::new()));
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::io;

    use futures::stream;
    use proptest::prelude::*;

    use super::*;

    const TWO_CHUNKS: &[u8] = b"event: chunk\ndata: \"AB\"\n\nevent: chunk\ndata: \"CD\"\n\n";

    fn decode_in_pieces(input: &[u8], cuts: &[usize]) -> Vec<StreamEvent> {
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        let mut start = 0;
        for &cut in cuts {
            events.extend(decoder.push(&input[start..cut]));
            start = cut;
        }
        events.extend(decoder.push(&input[start..]));
        events.extend(decoder.finish());
        events
    }

    async fn collect(body: Vec<std::result::Result<Bytes, io::Error>>) -> Vec<StreamEvent> {
        process_sse(stream::iter(body)).collect().await
    }

    #[test]
    fn any_split_point_yields_both_chunks() {
        for offset in 0..=TWO_CHUNKS.len() {
            assert_eq!(
                decode_in_pieces(TWO_CHUNKS, &[offset]),
                vec![StreamEvent::chunk("AB"), StreamEvent::chunk("CD")],
                "split at {offset}"
            );
        }
    }

    #[test]
    fn steps_and_object_chunks() {
        let events = decode_in_pieces(
            b"event: step\ndata: {\"message\":\"Fetching listings...\"}\n\nevent: chunk\ndata: {\"content\":\"Hi\"}\n\n",
            &[],
        );
        assert_eq!(
            events,
            vec![StreamEvent::step("Fetching listings..."), StreamEvent::chunk("Hi")]
        );
    }

    #[test]
    fn unparseable_chunk_is_literal_text() {
        let events = decode_in_pieces(b"event: chunk\ndata: not {json\n", &[]);
        assert_eq!(events, vec![StreamEvent::chunk("not {json")]);
    }

    #[test]
    fn tolerant_framing() {
        let events = decode_in_pieces(b"event:chunk\r\ndata:{\"content\":\"x\"}\r\n\r\n", &[]);
        assert_eq!(events, vec![StreamEvent::chunk("x")]);
    }

    #[test]
    fn ignores_data_before_any_event_and_unknown_kinds() {
        let events = decode_in_pieces(
            b"data: {\"content\":\"orphan\"}\n: comment\nevent: progress\ndata: {}\nevent: step\ndata: {}\n",
            &[],
        );
        assert!(events.is_empty());
    }

    #[test]
    fn event_type_persists_across_data_lines() {
        let events = decode_in_pieces(b"event: chunk\ndata: \"a\"\ndata: \"b\"\n\ndata: \"c\"\n", &[]);
        assert_eq!(
            events,
            vec![
                StreamEvent::chunk("a"),
                StreamEvent::chunk("b"),
                StreamEvent::chunk("c")
            ]
        );
    }

    #[test]
    fn terminal_frames() {
        assert_eq!(
            decode_in_pieces(b"event: done\ndata: {}\n", &[]),
            vec![StreamEvent::done(Vec::new())]
        );
        assert_eq!(
            decode_in_pieces(b"event: error\ndata: {\"detail\":\"quota\"}\n", &[]),
            vec![StreamEvent::error("quota")]
        );
        assert_eq!(
            decode_in_pieces(b"event: error\ndata: {\"message\":\"boom\"}\n", &[]),
            vec![StreamEvent::error("boom")]
        );
        assert_eq!(
            decode_in_pieces(b"event: error\ndata: backend exploded\n", &[]),
            vec![StreamEvent::error("backend exploded")]
        );
    }

    #[tokio::test]
    async fn clean_end_synthesizes_done() {
        let events = collect(vec![Ok(Bytes::from_static(
            b"event: chunk\ndata: {\"content\":\"Hello\"}\n",
        ))])
        .await;
        assert_eq!(
            events,
            vec![StreamEvent::chunk("Hello"), StreamEvent::done(Vec::new())]
        );
    }

    #[tokio::test]
    async fn stops_at_the_first_terminal_event() {
        let events = collect(vec![
            Ok(Bytes::from_static(b"event: chunk\ndata: \"a\"\nevent: done\ndata: {}\n")),
            Ok(Bytes::from_static(b"event: chunk\ndata: \"late\"\n")),
        ])
        .await;
        assert_eq!(
            events,
            vec![StreamEvent::chunk("a"), StreamEvent::done(Vec::new())]
        );
    }

    #[tokio::test]
    async fn read_failure_is_in_band() {
        let events = collect(vec![
            Ok(Bytes::from_static(b"event: chunk\ndata: \"a\"\n")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from_static(b"event: chunk\ndata: \"never\"\n")),
        ])
        .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEvent::chunk("a"));
        assert!(matches!(&events[1], StreamEvent::Error { detail } if detail.contains("reset")));
    }

    proptest! {
        #[test]
        fn arbitrary_splits_preserve_multibyte_text(mut cuts in proptest::collection::vec(0usize..64, 0..6)) {
            let input = "event: chunk\ndata: {\"content\":\"Añil → 2 BHK\"}\n\nevent: chunk\ndata: \"près\"\n".as_bytes();
            for cut in cuts.iter_mut() {
                *cut %= input.len() + 1;
            }
            cuts.sort_unstable();
            prop_assert_eq!(
                decode_in_pieces(input, &cuts),
                vec![StreamEvent::chunk("Añil → 2 BHK"), StreamEvent::chunk("près")]
            );
        }
    }
}
