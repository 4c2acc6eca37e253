use thiserror::Error;

use super::jsonrpc::JsonRpcError;

/// Errors surfaced by the provider and its transports.
///
/// The variants follow the failure classes a socket session can hit:
/// configuration (`InvalidClientTarget`), state (`ConnectionNotOpen`),
/// transport (`Transport`, `Io`), protocol (`Frame`, `InvalidResponse`) and
/// per-call RPC failures (`Rpc`), which carry the server's error object as-is.
#[derive(Error, Debug)]
pub enum SockRpcError {
    #[error("connection not open")]
    ConnectionNotOpen,

    #[error("invalid client target: {0}")]
    InvalidClientTarget(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("RPC error: {0}")]
    Rpc(JsonRpcError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("maximum reconnect attempts ({0}) reached")]
    MaxReconnectAttempts(u32),

    #[error("subscription rejected: {0}")]
    SubscriptionRejected(String),
}

impl SockRpcError {
    /// True for the uniform error every pending call receives when the
    /// connection goes away.
    pub fn is_connection_not_open(&self) -> bool {
        matches!(self, SockRpcError::ConnectionNotOpen)
    }

    /// Returns the server's error object when this is a per-call RPC failure.
    pub fn rpc_error(&self) -> Option<&JsonRpcError> {
        match self {
            SockRpcError::Rpc(err) => Some(err),
            _ => None,
        }
    }
}

/// A failure to turn one segment of the inbound stream into a message.
///
/// Frame errors are scoped to the segment that produced them; the framer
/// keeps going with whatever follows.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("malformed segment of {len} bytes: {reason}")]
    Malformed { len: usize, reason: String },

    #[error("partial message of {len} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { len: usize, limit: usize },

    #[error("discarded {len} bytes of a message that never completed")]
    StalePartial { len: usize },
}

pub type Result<T> = std::result::Result<T, SockRpcError>;
