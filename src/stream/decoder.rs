//! Byte stream → [`StreamEvent`] stream.
//!
//! Wraps any `Stream<Item = Result<Bytes, E>>` (typically
//! `reqwest::Response::bytes_stream()`) and yields typed events strictly in
//! arrival order. Malformed lines are dropped with a debug log and never end
//! the stream. A transport error is yielded once as `Err` and ends the stream.

use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::debug;

use super::events::StreamEvent;
use super::sse::SseLineDecoder;
use crate::error::TutorError;

/// A boxed stream of decoded turn events.
pub type TurnEventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, TutorError>> + Send>>;

/// Parse one `data:` payload into an event, or `None` when it does not conform.
pub fn decode_event(payload: &str) -> Option<StreamEvent> {
    let payload = payload.trim();
    if payload.is_empty() {
        return None;
    }
    match serde_json::from_str::<StreamEvent>(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!("dropping malformed stream event ({e}): {payload}");
            None
        }
    }
}

struct DecodeState<S> {
    bytes: Pin<Box<S>>,
    lines: SseLineDecoder,
    buffered: Vec<StreamEvent>,
    finished: bool,
}

/// Decode a raw byte stream into turn events.
pub fn decode_event_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<StreamEvent, TutorError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    futures_util::stream::unfold(
        DecodeState {
            bytes: Box::pin(byte_stream),
            lines: SseLineDecoder::new(),
            buffered: Vec::new(),
            finished: false,
        },
        |mut state| async move {
            loop {
                // Buffered in reverse so pop yields arrival order.
                if let Some(event) = state.buffered.pop() {
                    return Some((Ok(event), state));
                }
                if state.finished {
                    return None;
                }

                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        let events: Vec<StreamEvent> = state
                            .lines
                            .push(&chunk)
                            .iter()
                            .filter_map(|payload| decode_event(payload))
                            .collect();
                        state.buffered.extend(events.into_iter().rev());
                    }
                    Some(Err(e)) => {
                        state.finished = true;
                        let err = TutorError::Stream(format!("stream read failed: {e}"));
                        return Some((Err(err), state));
                    }
                    None => {
                        state.finished = true;
                        if let Some(event) = state.lines.flush().as_deref().and_then(decode_event) {
                            state.buffered.push(event);
                        }
                    }
                }
            }
        },
    )
}

/// Box a decoded stream into the [`TurnEventStream`] alias.
pub fn boxed_event_stream<S, E>(byte_stream: S) -> TurnEventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(decode_event_stream(byte_stream))
}
