//! Line Framing
//!
//! Incremental decoding of the streaming response body. Bytes are decoded to
//! UTF-8 across reads (a code point split between reads is held back until it
//! completes), accumulated in a text buffer, and cut into lines. Only complete
//! lines are classified; the trailing fragment waits for the next read.
//!
//! Recognized lines, after trimming:
//!
//! ```text
//! data: {"type":"content","data":"{...}"}   -> WireLine::Data
//! event: close                              -> WireLine::Close
//! ```
//!
//! Every data line is a complete frame on its own; consecutive data lines are
//! never joined. Anything else is ignored.

use std::char::REPLACEMENT_CHARACTER;

/// Prefix of a line carrying one frame
pub const DATA_MARKER: &str = "data: ";

/// Prefix of a named-event line
pub const EVENT_MARKER: &str = "event: ";

/// A recognized line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireLine {
    /// Trimmed body of a data line
    Data(String),

    /// A close announcement
    Close,
}

/// Classify one line
pub fn classify(line: &str) -> Option<WireLine> {
    let line = line.trim();
    if let Some(body) = line.strip_prefix(DATA_MARKER) {
        let body = body.trim();
        return (!body.is_empty()).then(|| WireLine::Data(body.to_string()));
    }
    if line.starts_with(EVENT_MARKER) && line.contains("close") {
        return Some(WireLine::Close);
    }
    None
}

/// Chunk-boundary independent line decoder
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Bytes of an incomplete UTF-8 sequence from the previous read
    pending: Vec<u8>,

    /// Decoded text not yet terminated by a newline
    buffer: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one read; returns the lines it completed
    pub fn push(&mut self, bytes: &[u8]) -> Vec<WireLine> {
        self.decode(bytes);

        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);
        complete.split('\n').filter_map(classify).collect()
    }

    /// End of stream: classify whatever is left without a final newline
    pub fn finish(&mut self) -> Vec<WireLine> {
        if !self.pending.is_empty() {
            self.pending.clear();
            self.buffer.push(REPLACEMENT_CHARACTER);
        }
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            return Vec::new();
        }
        rest.split('\n').filter_map(classify).collect()
    }

    /// Text held back waiting for a newline
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    fn decode(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);

        let mut input: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    input = &[];
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    self.buffer.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            self.buffer.push(REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        // Truncated sequence: keep it for the next read.
                        None => {
                            input = rest;
                            break;
                        }
                    }
                }
            }
        }
        self.pending = input.to_vec();
    }
}
