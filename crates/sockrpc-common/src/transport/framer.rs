//! Chunk reassembly for the inbound byte stream.
//!
//! Socket reads are not message aligned: one read may end halfway through a
//! response, and one read may carry several responses back to back. The
//! [`ChunkFramer`] carries partial data between reads and finds message
//! boundaries by tracking brace/bracket depth, ignoring structural characters
//! inside string literals.

use bytes::{Buf, BytesMut};
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::protocol::FrameError;

/// Default ceiling for a single partial message (100 MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Default time a partial message may stay incomplete before it is dropped
pub const DEFAULT_PARTIAL_TIMEOUT: Duration = Duration::from_secs(15);

/// Reassembles complete JSON messages from arbitrary chunks.
///
/// Scanning state survives between chunks, so bytes are inspected once no
/// matter how finely a message is split.
///
/// # Example
///
/// ```
/// use sockrpc_common::transport::ChunkFramer;
///
/// let mut framer = ChunkFramer::new();
/// let frames: Vec<_> = framer
///     .push(br#"{"id":1,"result":"a"}{"id":2,"result":"b"}"#)
///     .collect();
/// assert_eq!(frames.len(), 2);
/// ```
#[derive(Debug)]
pub struct ChunkFramer {
    buffer: BytesMut,
    /// Scan position inside `buffer` while a value is open
    cursor: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    max_message_size: usize,
    partial_timeout: Option<Duration>,
    partial_since: Option<Instant>,
}

impl ChunkFramer {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            cursor: 0,
            depth: 0,
            in_string: false,
            escaped: false,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            partial_timeout: Some(DEFAULT_PARTIAL_TIMEOUT),
            partial_since: None,
        }
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Sets how long carry-over may wait for its remainder; `None` waits forever.
    pub fn with_partial_timeout(mut self, partial_timeout: Option<Duration>) -> Self {
        self.partial_timeout = partial_timeout;
        self
    }

    /// Feeds one chunk and returns the messages it completes.
    ///
    /// The returned iterator is lazy: each call to `next` scans only as far as
    /// the next boundary. Anything not consumed stays buffered for the next push.
    pub fn push(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.push_at(chunk, Instant::now())
    }

    /// Like [`push`](Self::push) with an explicit clock reading.
    pub fn push_at(&mut self, chunk: &[u8], now: Instant) -> Frames<'_> {
        let stale = match (self.partial_since, self.partial_timeout) {
            (Some(since), Some(timeout))
                if !self.buffer.is_empty() && now.saturating_duration_since(since) >= timeout =>
            {
                let len = self.buffer.len();
                self.reset();
                Some(FrameError::StalePartial { len })
            }
            _ => None,
        };

        self.buffer.extend_from_slice(chunk);
        Frames {
            framer: self,
            stale,
            now,
        }
    }

    /// Bytes held back waiting for the rest of a message.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drops all carry-over. Used when a connection is replaced.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;
        self.partial_since = None;
    }

    fn next_frame(&mut self) -> Option<Result<Value, FrameError>> {
        if self.depth == 0 {
            let Some(start) = self.buffer.iter().position(|b| !b.is_ascii_whitespace()) else {
                self.buffer.clear();
                return None;
            };
            self.buffer.advance(start);

            if !matches!(self.buffer[0], b'{' | b'[') {
                let end = self
                    .buffer
                    .iter()
                    .position(|b| matches!(b, b'{' | b'['))
                    .unwrap_or(self.buffer.len());
                let garbage = self.buffer.split_to(end);
                return Some(Err(FrameError::Malformed {
                    len: garbage.len(),
                    reason: "data outside of a JSON value".into(),
                }));
            }

            self.depth = 1;
            self.cursor = 1;
        }

        while self.cursor < self.buffer.len() {
            let byte = self.buffer[self.cursor];
            self.cursor += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        let segment = self.buffer.split_to(self.cursor);
                        self.cursor = 0;
                        self.partial_since = None;
                        return Some(decode_segment(&segment));
                    }
                }
                _ => {}
            }
        }

        if self.buffer.len() > self.max_message_size {
            let len = self.buffer.len();
            self.reset();
            return Some(Err(FrameError::MessageTooLarge {
                len,
                limit: self.max_message_size,
            }));
        }

        None
    }

    fn mark_partial(&mut self, now: Instant) {
        if self.buffer.is_empty() {
            self.partial_since = None;
        } else if self.partial_since.is_none() {
            self.partial_since = Some(now);
        }
    }
}

impl Default for ChunkFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Messages completed by one [`ChunkFramer::push`].
pub struct Frames<'a> {
    framer: &'a mut ChunkFramer,
    stale: Option<FrameError>,
    now: Instant,
}

impl Iterator for Frames<'_> {
    type Item = Result<Value, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.stale.take() {
            return Some(Err(err));
        }
        self.framer.next_frame()
    }
}

impl Drop for Frames<'_> {
    fn drop(&mut self) {
        self.framer.mark_partial(self.now);
    }
}

fn decode_segment(segment: &[u8]) -> Result<Value, FrameError> {
    serde_json::from_slice(segment).map_err(|e| FrameError::Malformed {
        len: segment.len(),
        reason: e.to_string(),
    })
}
