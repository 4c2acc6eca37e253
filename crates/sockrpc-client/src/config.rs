//! Provider configuration: reconnect policy and framing limits.

use sockrpc_common::transport::{DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PARTIAL_TIMEOUT};
use std::time::Duration;

/// Reconnection configuration.
///
/// After an unexpected close the provider waits `delay` and opens the socket
/// again, up to `max_attempts` times in a row. A successful open resets the
/// count. Closes requested by the caller never trigger a reconnect.
///
/// # Default Configuration
///
/// - `auto_reconnect`: true
/// - `delay`: 5 seconds
/// - `max_attempts`: 5
///
/// # Example
///
/// ```rust
/// use sockrpc_client::ReconnectOptions;
/// use std::time::Duration;
///
/// // Retry forever, once a second
/// let options = ReconnectOptions {
///     auto_reconnect: true,
///     delay: Duration::from_secs(1),
///     max_attempts: None,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectOptions {
    /// Reopen the socket after an unexpected close
    pub auto_reconnect: bool,
    /// Wait before each reconnect attempt
    pub delay: Duration,
    /// Consecutive attempts before giving up; `None` never gives up
    pub max_attempts: Option<u32>,
}

impl ReconnectOptions {
    /// Never reconnect.
    pub fn disabled() -> Self {
        Self {
            auto_reconnect: false,
            ..Self::default()
        }
    }
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            delay: Duration::from_secs(5),
            max_attempts: Some(5),
        }
    }
}

/// Provider configuration.
///
/// # Default Configuration
///
/// - `reconnect`: [`ReconnectOptions::default`]
/// - `max_message_size`: 100 MB
/// - `partial_timeout`: 15 seconds
/// - `unsubscribe_method`: `"eth_unsubscribe"`
/// - `event_capacity`: 256
/// - `read_buffer_size`: 64 KiB
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub reconnect: ReconnectOptions,
    /// Largest partial message held while waiting for the rest of it
    pub max_message_size: usize,
    /// How long a partial message may stay incomplete; `None` waits forever
    pub partial_timeout: Option<Duration>,
    /// Method used to cancel a subscription on the server
    pub unsubscribe_method: String,
    /// Buffered provider events per receiver before the slowest one lags
    pub event_capacity: usize,
    /// Size of each socket read
    pub read_buffer_size: usize,
}

impl ProviderConfig {
    pub fn with_reconnect(mut self, reconnect: ReconnectOptions) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub fn with_partial_timeout(mut self, partial_timeout: Option<Duration>) -> Self {
        self.partial_timeout = partial_timeout;
        self
    }

    pub fn with_unsubscribe_method(mut self, method: impl Into<String>) -> Self {
        self.unsubscribe_method = method.into();
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectOptions::default(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            partial_timeout: Some(DEFAULT_PARTIAL_TIMEOUT),
            unsubscribe_method: "eth_unsubscribe".into(),
            event_capacity: 256,
            read_buffer_size: 64 * 1024,
        }
    }
}
