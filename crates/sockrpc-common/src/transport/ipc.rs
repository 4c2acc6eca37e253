use futures::future::BoxFuture;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::protocol::error::{Result, SockRpcError};

use super::connector::{BoxedStream, Connector};

/// Connects to a local domain socket (Unix socket).
///
/// The socket file must exist when a connection is opened; a missing file is
/// reported as an invalid target rather than as a transport error, because
/// retrying will not make it appear.
///
/// # Example
///
/// ```no_run
/// use sockrpc_common::transport::{Connector, IpcConnector};
///
/// # async fn run() -> std::io::Result<()> {
/// let connector = IpcConnector::new("/tmp/geth.ipc");
/// connector.validate().expect("socket file present");
/// let stream = connector.connect().await?;
/// # let _ = stream;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct IpcConnector {
    path: PathBuf,
    target: String,
}

impl IpcConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let target = path.display().to_string();
        Self { path, target }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Connector for IpcConnector {
    fn target(&self) -> &str {
        &self.target
    }

    fn validate(&self) -> Result<()> {
        if self.path.exists() {
            Ok(())
        } else {
            debug!(path = %self.target, "ipc socket path does not exist");
            Err(SockRpcError::InvalidClientTarget(self.target.clone()))
        }
    }

    #[cfg(unix)]
    fn connect(&self) -> BoxFuture<'_, io::Result<BoxedStream>> {
        Box::pin(async move {
            let stream = tokio::net::UnixStream::connect(&self.path).await?;
            debug!(path = %self.target, "ipc socket connected");
            Ok(Box::new(stream) as BoxedStream)
        })
    }

    #[cfg(not(unix))]
    fn connect(&self) -> BoxFuture<'_, io::Result<BoxedStream>> {
        Box::pin(async move {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("IPC sockets are not supported on this platform: {}", self.target),
            ))
        })
    }
}
