//! Stream decoding: raw bytes → framed lines → typed protocol events.

pub mod decoder;
pub mod events;
pub mod sse;

pub use decoder::{TurnEventStream, boxed_event_stream, decode_event, decode_event_stream};
pub use events::{DonePayload, Reference, ResponseType, StreamEvent};
pub use sse::SseLineDecoder;
