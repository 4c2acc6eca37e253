//! sockrpc Common Types and Transport
//!
//! This crate provides the protocol definitions, message framing and socket
//! transports shared by the sockrpc provider engine.
//!
//! # Overview
//!
//! sockrpc speaks JSON-RPC 2.0 over a single persistent duplex socket (a Unix
//! domain socket or a TCP stream). Unlike request-per-connection transports,
//! the socket carries many interleaved calls and server-pushed subscription
//! notifications, and the byte stream is not message aligned. This crate
//! contains the pieces that do not depend on connection state:
//!
//! - **Protocol Layer**: JSON-RPC request/response/notification types, inbound
//!   message classification and the error taxonomy
//! - **Transport Layer**: the chunk framer that reassembles messages from raw
//!   reads, and the [`transport::Connector`] contract with its IPC, TCP and
//!   in-memory adapters
//!
//! # Wire Format
//!
//! - **Serialization**: JSON, one value per message, no length prefix
//! - **Framing**: structural (brace/bracket depth with string awareness)
//! - **Max Partial Message**: 100 MB by default
//!
//! # Example
//!
//! ```
//! use sockrpc_common::protocol::{InboundMessage, JsonRpcRequest};
//! use sockrpc_common::transport::ChunkFramer;
//!
//! let request = JsonRpcRequest::new(1, "eth_blockNumber", vec![]);
//! assert_eq!(request.id, 1);
//!
//! let mut framer = ChunkFramer::new();
//! let first: Vec<_> = framer.push(br#"{"jsonrpc":"2.0","id":1,"res"#).collect();
//! assert!(first.is_empty());
//!
//! let second: Vec<_> = framer.push(br#"ult":"0x10"}"#).collect();
//! let value = second.into_iter().next().unwrap().unwrap();
//! let message = InboundMessage::classify(value).unwrap();
//! assert!(matches!(message, InboundMessage::Response(_)));
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
