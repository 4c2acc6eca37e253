//! Subscription listeners.
//!
//! Subscriptions are server state tied to one connection. The registry is
//! cleared whenever the connection drops, and dropping a listener ends the
//! caller's [`Subscription`] stream, so a reconnect never silently revives an
//! old subscription.

use futures::Stream;
use serde_json::Value;
use sockrpc_common::protocol::SubscriptionId;
use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;

/// Receives the payload of every push for one subscription.
pub type Listener = mpsc::UnboundedSender<Value>;

/// Active subscriptions keyed by server-assigned id.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    listeners: HashMap<SubscriptionId, Listener>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the listener previously registered under `id`, if any.
    pub fn register(&mut self, id: SubscriptionId, listener: Listener) -> Option<Listener> {
        self.listeners.insert(id, listener)
    }

    /// Delivers `data` to the listener for `id`.
    ///
    /// Returns `false` when the id is unknown or its receiver has been
    /// dropped; a dropped receiver is unregistered.
    pub fn dispatch(&mut self, id: &SubscriptionId, data: Value) -> bool {
        let Some(listener) = self.listeners.get(id) else {
            return false;
        };
        if listener.send(data).is_ok() {
            return true;
        }
        debug!(subscription = %id, "subscription receiver dropped, unregistering");
        self.listeners.remove(id);
        false
    }

    pub fn remove(&mut self, id: &SubscriptionId) -> bool {
        self.listeners.remove(id).is_some()
    }

    /// Drops every listener. Returns how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.listeners.len();
        self.listeners.clear();
        count
    }

    pub fn contains(&self, id: &SubscriptionId) -> bool {
        self.listeners.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

/// Handle to an active subscription.
///
/// Yields each pushed payload in arrival order. The stream ends when the
/// subscription is cancelled or the connection that carried it is lost.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::UnboundedReceiver<Value>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, receiver: mpsc::UnboundedReceiver<Value>) -> Self {
        Self { id, receiver }
    }

    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Waits for the next push; `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<Value> {
        self.receiver.recv().await
    }

    /// Returns a push that has already arrived, without waiting.
    pub fn try_next(&mut self) -> Option<Value> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        self.receiver.poll_recv(cx)
    }
}
