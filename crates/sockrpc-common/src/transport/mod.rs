//! sockrpc Transport Layer
//!
//! This module provides message framing for the inbound byte stream and the
//! connectors that open the duplex socket.
//!
//! # Architecture
//!
//! - **Framing**: [`ChunkFramer`] turns arbitrary reads into complete JSON values
//! - **Codec**: [`JsonCodec`] encodes outbound requests (no length prefix)
//! - **Connectors**: [`Connector`] is the only thing the provider engine knows
//!   about a transport; [`IpcConnector`], [`TcpConnector`] and
//!   [`MemoryConnector`] implement it
//!
//! # Example
//!
//! ```no_run
//! use sockrpc_common::transport::{Connector, Endpoint};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = Endpoint::parse("/tmp/geth.ipc")?;
//! let connector = endpoint.connector();
//! connector.validate()?;
//! let stream = connector.connect().await?;
//! # let _ = stream;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod connector;
pub mod framer;
pub mod ipc;
pub mod memory;
pub mod tcp;

pub use codec::JsonCodec;
pub use connector::{BoxedStream, Connector, DuplexStream, Endpoint};
pub use framer::{ChunkFramer, Frames, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PARTIAL_TIMEOUT};
pub use ipc::IpcConnector;
pub use memory::{memory_endpoint, MemoryConnector, MemoryListener};
pub use tcp::TcpConnector;
