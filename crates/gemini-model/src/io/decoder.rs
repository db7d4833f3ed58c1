//! Incremental decoder for the `streamGenerateContent` response body.
//!
//! The body is a JSON array of objects which arrives in arbitrary byte
//! chunks:
//!
//! ```text
//! [{"candidates":[...]},
//! {"candidates":[...]}]
//! ```
//!
//! The decoder doesn't parse the enclosing array. It isolates each
//! top-level object by counting braces, hands the object to `serde_json`,
//! and drops everything between objects (brackets, commas, whitespace).

use std::ops::Range;
use std::str;

use chatline_model::ErrorKind;

use crate::Error;
use crate::proto::{StreamUnit, error_message};

const GENERIC_STREAM_ERROR: &str = "API error in stream";

/// A complete unit decoded from the stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamMessage {
    /// Text contributed to the reply, in payload order. May be empty when
    /// the unit only carries a finish reason.
    TextDelta {
        fragments: Vec<String>,
        finish_reason: Option<String>,
    },
    /// The service failed in the middle of the stream.
    ErrorNotice(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScanState {
    ScanningForOpen,
    CountingDepth {
        depth: usize,
        in_string: bool,
        escaped: bool,
    },
}

impl ScanState {
    #[inline]
    fn advance(self, byte: u8) -> Self {
        use ScanState::*;

        match self {
            ScanningForOpen if byte == b'{' => CountingDepth {
                depth: 1,
                in_string: false,
                escaped: false,
            },
            ScanningForOpen => ScanningForOpen,
            CountingDepth {
                depth,
                in_string: true,
                escaped,
            } => {
                // Raw control bytes never occur inside a JSON string, so the
                // string was never terminated. Give up on the unit.
                if byte < 0x20 {
                    return ScanningForOpen;
                }
                let (in_string, escaped) = match byte {
                    _ if escaped => (true, false),
                    b'\\' => (true, true),
                    b'"' => (false, false),
                    _ => (true, false),
                };
                CountingDepth {
                    depth,
                    in_string,
                    escaped,
                }
            }
            CountingDepth { depth, .. } => match byte {
                b'"' => CountingDepth {
                    depth,
                    in_string: true,
                    escaped: false,
                },
                b'{' => CountingDepth {
                    depth: depth + 1,
                    in_string: false,
                    escaped: false,
                },
                b'}' if depth == 1 => ScanningForOpen,
                b'}' => CountingDepth {
                    depth: depth - 1,
                    in_string: false,
                    escaped: false,
                },
                _ => self,
            },
        }
    }
}

/// Reassembles byte chunks into [`StreamMessage`]s.
///
/// A decoder handles exactly one response stream. Feed it every chunk in
/// arrival order, then call [`StreamDecoder::finish`] once the body ends.
///
/// Between calls to [`StreamDecoder::feed`], the internal buffer only holds
/// the unconsumed tail of the input: at most one incomplete object and an
/// incomplete UTF-8 sequence. The scanner keeps its position inside that
/// tail, so a large object arriving in many small chunks is scanned once.
#[derive(Debug)]
pub struct StreamDecoder {
    // Bytes of a multi-byte character split by the chunk boundary.
    pending_bytes: Vec<u8>,
    buf: String,
    // Everything in `buf` before `cursor` has been scanned.
    cursor: usize,
    // Start of the object being counted, meaningful in `CountingDepth`.
    unit_start: usize,
    state: ScanState,
    full_text: String,
    error: Option<String>,
    malformed_units: usize,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    /// Creates a decoder for a new response stream.
    #[inline]
    pub fn new() -> Self {
        Self {
            pending_bytes: Vec::new(),
            buf: String::new(),
            cursor: 0,
            unit_start: 0,
            state: ScanState::ScanningForOpen,
            full_text: String::new(),
            error: None,
            malformed_units: 0,
        }
    }

    /// Feeds a chunk and returns the messages it completed, in order.
    ///
    /// An [`StreamMessage::ErrorNotice`] is always the last message, and
    /// any later call returns nothing.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamMessage> {
        let mut messages = Vec::new();
        if self.error.is_some() {
            return messages;
        }

        self.push_bytes(chunk);
        while let Some(range) = self.next_unit() {
            let Some(message) = self.parse_unit(range) else {
                continue;
            };
            match &message {
                StreamMessage::TextDelta { fragments, .. } => {
                    for fragment in fragments {
                        self.full_text.push_str(fragment);
                    }
                }
                StreamMessage::ErrorNotice(notice) => {
                    self.error = Some(notice.clone());
                }
            }
            messages.push(message);
            if self.error.is_some() {
                break;
            }
        }
        self.discard_consumed();

        messages
    }

    /// Returns the text accumulated so far.
    #[inline]
    pub fn text(&self) -> &str {
        &self.full_text
    }

    /// Returns how many objects failed to parse and were skipped.
    #[inline]
    pub fn malformed_units(&self) -> usize {
        self.malformed_units
    }

    /// Ends the stream and returns the full reply text.
    ///
    /// Leftover input (a truncated object, the closing bracket, a partial
    /// character) is not an error and is dropped.
    pub fn finish(self) -> Result<String, Error> {
        if let Some(message) = self.error {
            return Err(Error::new(message, ErrorKind::Service));
        }
        let leftover = self.buf.len() + self.pending_bytes.len();
        if leftover > 0 {
            trace!("dropping {leftover} trailing bytes at end of stream");
        }
        Ok(self.full_text)
    }

    fn push_bytes(&mut self, chunk: &[u8]) {
        let joined;
        let mut input = chunk;
        if !self.pending_bytes.is_empty() {
            self.pending_bytes.extend_from_slice(chunk);
            joined = std::mem::take(&mut self.pending_bytes);
            input = &joined;
        }

        loop {
            match str::from_utf8(input) {
                Ok(s) => {
                    self.buf.push_str(s);
                    return;
                }
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    self.buf.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            self.buf.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        None => {
                            // Incomplete sequence at the end, wait for the
                            // next chunk to complete it.
                            self.pending_bytes.extend_from_slice(rest);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn next_unit(&mut self) -> Option<Range<usize>> {
        let bytes = self.buf.as_bytes();
        while self.cursor < bytes.len() {
            let prev = self.state;
            self.state = prev.advance(bytes[self.cursor]);
            self.cursor += 1;

            match (prev, self.state) {
                (ScanState::ScanningForOpen, ScanState::CountingDepth { .. }) => {
                    self.unit_start = self.cursor - 1;
                }
                (
                    ScanState::CountingDepth {
                        in_string: true, ..
                    },
                    ScanState::ScanningForOpen,
                ) => {
                    self.malformed_units += 1;
                    warn!("skipping stream unit with an unterminated string");
                }
                (ScanState::CountingDepth { .. }, ScanState::ScanningForOpen) => {
                    return Some(self.unit_start..self.cursor);
                }
                _ => {}
            }
        }
        None
    }

    fn parse_unit(&mut self, range: Range<usize>) -> Option<StreamMessage> {
        let unit = match serde_json::from_str::<StreamUnit>(&self.buf[range]) {
            Ok(unit) => unit,
            Err(err) => {
                self.malformed_units += 1;
                warn!("skipping malformed stream unit: {err}");
                return None;
            }
        };

        let candidate = unit.candidates.and_then(|c| c.into_iter().next());
        if let Some(candidate) = candidate {
            let fragments: Vec<String> = candidate
                .content
                .map(|content| content.parts)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|part| part.text)
                .filter(|text| !text.is_empty())
                .collect();
            if fragments.is_empty() && candidate.finish_reason.is_none() {
                return None;
            }
            return Some(StreamMessage::TextDelta {
                fragments,
                finish_reason: candidate.finish_reason,
            });
        }

        let error = unit.error?;
        let message = error_message(&error)
            .unwrap_or(GENERIC_STREAM_ERROR)
            .to_owned();
        Some(StreamMessage::ErrorNotice(message))
    }

    fn discard_consumed(&mut self) {
        let consumed = match self.state {
            ScanState::ScanningForOpen => self.cursor,
            ScanState::CountingDepth { .. } => self.unit_start,
        };
        self.buf.drain(..consumed);
        self.cursor -= consumed;
        self.unit_start = 0;
    }

    #[cfg(test)]
    fn buffered(&self) -> &str {
        &self.buf
    }
}
