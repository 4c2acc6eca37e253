//! Pending-call bookkeeping.
//!
//! Every request that has been issued and not yet answered owns one entry
//! here, keyed by its request id. Responses may come back in any order; each
//! one settles exactly the entry whose id it carries.

use serde_json::Value;
use sockrpc_common::protocol::{RequestId, Result, SockRpcError};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::subscriptions::Listener;

/// Where a call's outcome is delivered.
pub type ResultSink = oneshot::Sender<Result<Value>>;

/// A request waiting for its response.
#[derive(Debug)]
pub struct PendingCall {
    request_id: RequestId,
    method: String,
    sink: ResultSink,
    /// Set for subscribe calls: receives pushes once the server assigns an id
    listener: Option<Listener>,
    created_at: Instant,
}

impl PendingCall {
    pub fn new(request_id: RequestId, method: impl Into<String>, sink: ResultSink) -> Self {
        Self {
            request_id,
            method: method.into(),
            sink,
            listener: None,
            created_at: Instant::now(),
        }
    }

    pub fn with_listener(mut self, listener: Listener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn is_subscription(&self) -> bool {
        self.listener.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn take_listener(&mut self) -> Option<Listener> {
        self.listener.take()
    }

    /// Delivers a result. A caller that stopped waiting is not an error.
    pub fn resolve(self, result: Value) {
        if self.sink.send(Ok(result)).is_err() {
            debug!(id = self.request_id, "caller stopped waiting before the response arrived");
        }
    }

    pub fn reject(self, error: SockRpcError) {
        if self.sink.send(Err(error)).is_err() {
            debug!(id = self.request_id, "caller stopped waiting before the call failed");
        }
    }
}

/// Pending calls keyed by request id.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    calls: HashMap<RequestId, PendingCall>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks a call until it is settled.
    ///
    /// Returns `false` and fails the new call if its id is already live.
    pub fn register(&mut self, call: PendingCall) -> bool {
        let id = call.request_id();
        if self.calls.contains_key(&id) {
            warn!(id, "request id already pending, refusing duplicate");
            call.reject(SockRpcError::InvalidResponse(format!(
                "request id {} is already pending",
                id
            )));
            return false;
        }
        self.calls.insert(id, call);
        true
    }

    /// Removes a call without settling it.
    pub fn take(&mut self, id: RequestId) -> Option<PendingCall> {
        self.calls.remove(&id)
    }

    /// Settles `id` with a result; unknown ids are ignored.
    pub fn resolve(&mut self, id: RequestId, result: Value) -> bool {
        match self.calls.remove(&id) {
            Some(call) => {
                call.resolve(result);
                true
            }
            None => false,
        }
    }

    /// Settles `id` with an error; unknown ids are ignored.
    pub fn reject(&mut self, id: RequestId, error: SockRpcError) -> bool {
        match self.calls.remove(&id) {
            Some(call) => {
                call.reject(error);
                true
            }
            None => false,
        }
    }

    /// Fails every pending call and empties the table. Returns how many were
    /// failed.
    pub fn drain_all<F>(&mut self, error: F) -> usize
    where
        F: Fn() -> SockRpcError,
    {
        let count = self.calls.len();
        for (_, call) in self.calls.drain() {
            debug!(
                id = call.request_id(),
                method = call.method(),
                waited_ms = call.elapsed().as_millis() as u64,
                "failing pending call"
            );
            call.reject(error());
        }
        count
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.calls.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
