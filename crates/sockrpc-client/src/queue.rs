//! Requests issued while the connection is still opening.

use bytes::Bytes;
use sockrpc_common::protocol::RequestId;
use std::collections::VecDeque;

/// An encoded request waiting for the socket.
#[derive(Debug, Clone)]
pub struct OutboundEntry {
    pub request_id: RequestId,
    pub payload: Bytes,
}

impl OutboundEntry {
    pub fn new(request_id: RequestId, payload: Bytes) -> Self {
        Self {
            request_id,
            payload,
        }
    }
}

/// FIFO of requests written once the connection opens.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    entries: VecDeque<OutboundEntry>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: OutboundEntry) {
        self.entries.push_back(entry);
    }

    /// Empties the queue in submission order.
    pub fn drain(&mut self) -> std::collections::vec_deque::Drain<'_, OutboundEntry> {
        self.entries.drain(..)
    }

    /// Discards everything queued. Returns how many entries were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
