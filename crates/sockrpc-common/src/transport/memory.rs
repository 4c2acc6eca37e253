//! In-process transport.
//!
//! A [`MemoryConnector`] hands the client end of a `tokio::io::duplex` pipe to
//! the provider and the server end to a [`MemoryListener`]. It can be told to
//! refuse connections or to report its target as missing, which makes
//! connection-loss and reconnect behaviour reproducible without sockets.

use futures::future::BoxFuture;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::DuplexStream;
use tokio::sync::{mpsc, Mutex};

use crate::protocol::error::{Result, SockRpcError};

use super::connector::{BoxedStream, Connector};

const DUPLEX_CAPACITY: usize = 64 * 1024;

/// Client side of an in-memory endpoint. Clones share state.
#[derive(Clone)]
pub struct MemoryConnector {
    target: Arc<str>,
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    accept_tx: mpsc::UnboundedSender<DuplexStream>,
    available: AtomicBool,
    refuse_next: AtomicUsize,
    attempts: AtomicUsize,
}

/// Server side of an in-memory endpoint.
pub struct MemoryListener {
    accept_rx: Mutex<mpsc::UnboundedReceiver<DuplexStream>>,
}

/// Creates a connected connector/listener pair.
///
/// # Example
///
/// ```
/// use sockrpc_common::transport::{memory_endpoint, Connector};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (connector, listener) = memory_endpoint("memory://node");
/// let _client = connector.connect().await.unwrap();
/// let _server = listener.accept().await.unwrap();
/// assert_eq!(connector.attempts(), 1);
/// # }
/// ```
pub fn memory_endpoint(target: &str) -> (MemoryConnector, MemoryListener) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    let connector = MemoryConnector {
        target: Arc::from(target),
        inner: Arc::new(MemoryInner {
            accept_tx,
            available: AtomicBool::new(true),
            refuse_next: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
        }),
    };
    let listener = MemoryListener {
        accept_rx: Mutex::new(accept_rx),
    };
    (connector, listener)
}

impl MemoryConnector {
    /// Refuse the next `count` connection attempts.
    pub fn refuse_next(&self, count: usize) {
        self.inner.refuse_next.store(count, Ordering::SeqCst);
    }

    /// Make `validate` fail as if the endpoint had disappeared.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Number of times `connect` has been called.
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryConnector {
    fn target(&self) -> &str {
        &self.target
    }

    fn validate(&self) -> Result<()> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SockRpcError::InvalidClientTarget(self.target.to_string()))
        }
    }

    fn connect(&self) -> BoxFuture<'_, io::Result<BoxedStream>> {
        Box::pin(async move {
            self.inner.attempts.fetch_add(1, Ordering::SeqCst);

            let refused = self
                .inner
                .refuse_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("connection refused by {}", self.target),
                ));
            }

            let (client, server) = tokio::io::duplex(DUPLEX_CAPACITY);
            self.inner.accept_tx.send(server).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("no listener for {}", self.target),
                )
            })?;
            Ok(Box::new(client) as BoxedStream)
        })
    }
}

impl MemoryListener {
    /// Waits for the next connection; `None` once every connector is gone.
    pub async fn accept(&self) -> Option<DuplexStream> {
        self.accept_rx.lock().await.recv().await
    }
}
