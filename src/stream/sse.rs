//! Line framing for the turn stream.
//!
//! The backend frames every event as a single `data:` line followed by a
//! blank separator line:
//!
//! ```text
//! data: {"type":"token","content":"Hel"}
//!
//! data: {"type":"done","references":[],"responseType":"in_scope"}
//!
//! ```
//!
//! [`SseLineDecoder`] buffers raw bytes until a line terminator arrives, so
//! both lines and multi-byte UTF-8 sequences may be split across network
//! chunks. Lines without the `data:` marker (comments, blank separators,
//! `event:`/`id:` fields) are skipped.
//!
//! # Examples
//!
//! ```
//! use lecture_tutor::stream::sse::SseLineDecoder;
//!
//! let mut decoder = SseLineDecoder::new();
//! assert!(decoder.push(b"data: {\"type\":").is_empty());
//! let payloads = decoder.push(b"\"token\"}\n\n");
//! assert_eq!(payloads, vec![r#"{"type":"token"}"#.to_string()]);
//! ```

/// Marker that prefixes every event line.
pub const DATA_MARKER: &str = "data:";

/// Extract the payload of a `data:` line, stripping one optional leading space.
fn data_payload(line: &str) -> Option<&str> {
    let value = line.strip_prefix(DATA_MARKER)?;
    Some(value.strip_prefix(' ').unwrap_or(value))
}

/// Incremental line decoder yielding `data:` payloads in arrival order.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    pending: Vec<u8>,
}

impl SseLineDecoder {
    /// Create a new decoder with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes, returning the payloads of every line completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut payloads = Vec::new();

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(payload) = decode_line(&line[..line.len() - 1]) {
                payloads.push(payload);
            }
        }

        payloads
    }

    /// Flush a trailing line that was not terminated before end-of-stream.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        decode_line(&line)
    }

    /// Number of buffered bytes not yet forming a complete line.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);
    data_payload(&line).map(str::to_owned)
}
