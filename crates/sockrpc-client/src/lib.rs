//! sockrpc Client
//!
//! A JSON-RPC provider that keeps one persistent duplex socket open and
//! multiplexes request/response calls and subscription pushes over it.
//!
//! # Components
//!
//! - [`CorrelationTable`]: pending calls keyed by request id
//! - [`SubscriptionRegistry`]: listeners keyed by subscription id
//! - [`OutboundQueue`]: requests issued while the socket is still opening
//! - [`ReconnectPolicy`]: whether and when to reopen after an unexpected close
//! - [`connection`]: the state machine that owns the socket
//! - [`SocketProvider`]: the public facade
//!
//! # Example
//!
//! ```no_run
//! use sockrpc_client::{ProviderConfig, SocketProvider};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = SocketProvider::ipc("/tmp/geth.ipc", ProviderConfig::default());
//! provider.connect().await?;
//!
//! let block = provider.request("eth_blockNumber", vec![]).await?;
//! println!("head: {}", block);
//!
//! let mut heads = provider.subscribe("eth_subscribe", vec![json!("newHeads")]).await?;
//! while let Some(head) = heads.next().await {
//!     println!("new head: {}", head);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod correlation;
pub mod events;
pub mod provider;
pub mod queue;
pub mod reconnect;
pub mod subscriptions;

pub use config::{ProviderConfig, ReconnectOptions};
pub use connection::ConnectionStatus;
pub use correlation::{CorrelationTable, PendingCall};
pub use events::{ProviderEvent, ABNORMAL_CLOSURE, NORMAL_CLOSURE};
pub use provider::SocketProvider;
pub use queue::{OutboundEntry, OutboundQueue};
pub use reconnect::{ReconnectDecision, ReconnectPolicy};
pub use subscriptions::{Subscription, SubscriptionRegistry};

pub use sockrpc_common::protocol::{JsonRpcError, Result, SockRpcError, SubscriptionId};
pub use sockrpc_common::transport::{Connector, Endpoint};
