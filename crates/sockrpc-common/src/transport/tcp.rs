use futures::future::BoxFuture;
use std::io;
use tracing::debug;

use crate::protocol::error::{Result, SockRpcError};

use super::connector::{BoxedStream, Connector};

/// Connects to a JSON-RPC endpoint over a plain TCP stream.
///
/// Messages are written without delimiters, exactly as on the IPC socket, so
/// the same framing applies on the read side.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Checks that `addr` has the `host:port` shape without resolving it.
    pub fn check_addr(addr: &str) -> Result<()> {
        let invalid = || SockRpcError::InvalidClientTarget(format!("tcp://{}", addr));
        let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() || port.parse::<u16>().is_err() {
            return Err(invalid());
        }
        Ok(())
    }
}

impl Connector for TcpConnector {
    fn target(&self) -> &str {
        &self.addr
    }

    fn validate(&self) -> Result<()> {
        Self::check_addr(&self.addr)
    }

    fn connect(&self) -> BoxFuture<'_, io::Result<BoxedStream>> {
        Box::pin(async move {
            let stream = tokio::net::TcpStream::connect(self.addr.as_str()).await?;
            stream.set_nodelay(true)?;
            debug!(addr = %self.addr, local = ?stream.local_addr().ok(), "tcp stream connected");
            Ok(Box::new(stream) as BoxedStream)
        })
    }
}
