//! Lifecycle notifications published by the provider.

use serde_json::Value;
use std::time::Duration;

/// Close code for a caller-requested disconnect.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code for a connection lost without a caller request.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Provider lifecycle event.
///
/// Events are broadcast; every receiver from
/// [`SocketProvider::events`](crate::SocketProvider::events) sees each one.
/// Errors are published no matter which connection produced them, so an
/// error listener keeps working across reconnects.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    Connected,
    Disconnected { code: u16, reason: Option<String> },
    Error(String),
    /// Every decoded inbound message, before it is routed
    Message(Value),
    Reconnecting { attempt: u32, delay: Duration },
    ReconnectExhausted { attempts: u32 },
}

impl ProviderEvent {
    pub fn is_error(&self) -> bool {
        matches!(self, ProviderEvent::Error(_))
    }
}
