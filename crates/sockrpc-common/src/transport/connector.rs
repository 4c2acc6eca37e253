//! The duplex transport contract.
//!
//! The provider engine never touches a concrete socket type. It asks a
//! [`Connector`] to check its target and to open a byte stream, and it
//! derives the transport's events from that stream: a successful `connect`
//! is *open*, every read is *data*, a zero-length read is *close*, and an
//! I/O failure is *error* followed by *close*.

use futures::future::BoxFuture;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::protocol::error::{Result, SockRpcError};

use super::ipc::IpcConnector;
use super::tcp::TcpConnector;

/// A bidirectional byte stream produced by a connector.
pub trait DuplexStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> DuplexStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedStream = Box<dyn DuplexStream>;

/// Opens duplex streams to one fixed target.
pub trait Connector: Send + Sync + 'static {
    /// Human readable description of the target, used in logs and errors.
    fn target(&self) -> &str;

    /// Cheap synchronous check that the target can be connected to at all.
    ///
    /// Fails with [`SockRpcError::InvalidClientTarget`] when it cannot, e.g.
    /// a socket path that does not exist.
    fn validate(&self) -> Result<()>;

    /// Opens a fresh stream to the target.
    fn connect(&self) -> BoxFuture<'_, io::Result<BoxedStream>>;
}

impl<C: Connector + ?Sized> Connector for Arc<C> {
    fn target(&self) -> &str {
        (**self).target()
    }

    fn validate(&self) -> Result<()> {
        (**self).validate()
    }

    fn connect(&self) -> BoxFuture<'_, io::Result<BoxedStream>> {
        (**self).connect()
    }
}

/// Where a provider should connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Local domain socket at a filesystem path
    Ipc(PathBuf),
    /// TCP stream to `host:port`
    Tcp(String),
}

impl Endpoint {
    /// Parses `tcp://host:port`, `ipc:///path/to.sock` or a bare socket path.
    ///
    /// # Example
    ///
    /// ```
    /// use sockrpc_common::transport::Endpoint;
    /// use std::path::PathBuf;
    ///
    /// assert_eq!(
    ///     Endpoint::parse("tcp://127.0.0.1:8546").unwrap(),
    ///     Endpoint::Tcp("127.0.0.1:8546".into())
    /// );
    /// assert_eq!(
    ///     Endpoint::parse("/tmp/geth.ipc").unwrap(),
    ///     Endpoint::Ipc(PathBuf::from("/tmp/geth.ipc"))
    /// );
    /// ```
    pub fn parse(target: &str) -> Result<Self> {
        let target = target.trim();
        if target.is_empty() {
            return Err(SockRpcError::InvalidClientTarget("empty target".into()));
        }
        if let Some(addr) = target.strip_prefix("tcp://") {
            TcpConnector::check_addr(addr)?;
            return Ok(Endpoint::Tcp(addr.to_string()));
        }
        if let Some(path) = target.strip_prefix("ipc://") {
            if path.is_empty() {
                return Err(SockRpcError::InvalidClientTarget(target.to_string()));
            }
            return Ok(Endpoint::Ipc(PathBuf::from(path)));
        }
        if target.contains("://") {
            return Err(SockRpcError::InvalidClientTarget(format!(
                "unsupported scheme in '{}'",
                target
            )));
        }
        Ok(Endpoint::Ipc(PathBuf::from(target)))
    }

    /// Builds the connector for this endpoint.
    pub fn connector(&self) -> Arc<dyn Connector> {
        match self {
            Endpoint::Ipc(path) => Arc::new(IpcConnector::new(path.clone())),
            Endpoint::Tcp(addr) => Arc::new(TcpConnector::new(addr.clone())),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Ipc(path) => write!(f, "ipc://{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
        }
    }
}
