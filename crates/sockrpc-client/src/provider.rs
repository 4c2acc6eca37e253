//! The public provider facade.

use serde_json::Value;
use sockrpc_common::protocol::{Result, RpcParams, SockRpcError, SubscriptionId};
use sockrpc_common::transport::{Connector, Endpoint, IpcConnector, TcpConnector};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::connection::{Connection, ConnectionStatus};
use crate::events::{ProviderEvent, NORMAL_CLOSURE};
use crate::subscriptions::Subscription;

/// JSON-RPC provider over one persistent duplex socket.
///
/// Cloning is cheap; clones share the same connection, pending calls and
/// subscriptions. The connection is torn down when the last clone is dropped.
#[derive(Clone)]
pub struct SocketProvider {
    connection: Arc<Connection>,
}

impl SocketProvider {
    pub fn new(connector: Arc<dyn Connector>, config: ProviderConfig) -> Self {
        Self {
            connection: Connection::new(connector, config),
        }
    }

    /// Provider for a Unix domain socket.
    pub fn ipc(path: impl Into<PathBuf>, config: ProviderConfig) -> Self {
        Self::new(Arc::new(IpcConnector::new(path)), config)
    }

    /// Provider for a TCP `host:port` address.
    pub fn tcp(addr: impl Into<String>, config: ProviderConfig) -> Self {
        Self::new(Arc::new(TcpConnector::new(addr)), config)
    }

    pub fn from_endpoint(endpoint: &Endpoint, config: ProviderConfig) -> Self {
        Self::new(endpoint.connector(), config)
    }

    pub fn target(&self) -> &str {
        self.connection.target()
    }

    /// Starts opening the socket.
    ///
    /// Returns once the attempt has started; use
    /// [`wait_for_connection`](Self::wait_for_connection) to wait for the
    /// result. Calling this while connected or connecting does nothing.
    ///
    /// # Errors
    ///
    /// [`SockRpcError::InvalidClientTarget`] when the target does not exist.
    /// Nothing about the provider changes in that case.
    pub async fn connect(&self) -> Result<()> {
        self.connection.open().await
    }

    /// Waits for the socket to open, including through scheduled reconnects.
    pub async fn wait_for_connection(&self) -> Result<()> {
        self.connection.wait_connected().await
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Follows status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.watch_status()
    }

    /// Receives lifecycle events published from now on.
    pub fn events(&self) -> broadcast::Receiver<ProviderEvent> {
        self.connection.events()
    }

    /// Sends a request and waits for its response.
    ///
    /// Requests made while the socket is opening are queued and sent in order
    /// once it opens.
    ///
    /// # Errors
    ///
    /// - [`SockRpcError::ConnectionNotOpen`] when disconnected, or when the
    ///   connection is lost before the response arrives
    /// - [`SockRpcError::Rpc`] when the server answers with an error
    pub async fn request(&self, method: impl Into<String>, params: RpcParams) -> Result<Value> {
        let outcome = self
            .connection
            .submit(method.into(), params, None)
            .await?;
        outcome.await.map_err(|_| SockRpcError::ConnectionNotOpen)?
    }

    /// Opens a subscription with `method` (for example `eth_subscribe`).
    ///
    /// The returned handle yields every push for the subscription. Pushes
    /// that arrive right behind the subscribe response are not lost.
    pub async fn subscribe(
        &self,
        method: impl Into<String>,
        params: RpcParams,
    ) -> Result<Subscription> {
        let (listener, receiver) = mpsc::unbounded_channel();
        let outcome = self
            .connection
            .submit(method.into(), params, Some(listener))
            .await?;
        let result = outcome
            .await
            .map_err(|_| SockRpcError::ConnectionNotOpen)??;
        let id = SubscriptionId::from_value(&result).ok_or_else(|| {
            SockRpcError::SubscriptionRejected(format!("invalid subscription id {}", result))
        })?;
        debug!(subscription = %id, "subscribed");
        Ok(Subscription::new(id, receiver))
    }

    /// Cancels a subscription.
    ///
    /// Pushes stop being delivered immediately. Returns what the server
    /// reported, or `false` if the subscription was no longer active.
    pub async fn unsubscribe(&self, subscription: &Subscription) -> Result<bool> {
        if !self.connection.forget_subscription(subscription.id()).await {
            return Ok(false);
        }
        let method = self.connection.config().unsubscribe_method.clone();
        let result = self
            .request(method, vec![subscription.id().to_value()])
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    /// Closes the socket with a normal close code. No reconnect follows.
    pub async fn disconnect(&self) {
        self.disconnect_with(NORMAL_CLOSURE, None).await
    }

    /// Closes the socket with an explicit close code and reason.
    pub async fn disconnect_with(&self, code: u16, reason: Option<String>) {
        self.connection.close(code, reason).await
    }

    /// Fails every pending call and drops queued requests and subscriptions
    /// without touching the socket.
    pub async fn reset(&self) {
        self.connection.reset().await
    }

    /// Calls waiting for a response, including queued ones.
    pub async fn pending_request_count(&self) -> usize {
        self.connection.pending_len().await
    }

    /// Requests waiting for the socket to open.
    pub async fn queued_request_count(&self) -> usize {
        self.connection.queued_len().await
    }

    pub async fn subscription_count(&self) -> usize {
        self.connection.subscription_len().await
    }

    /// Duplex sockets always carry server pushes.
    pub fn supports_subscriptions(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for SocketProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketProvider")
            .field("target", &self.target())
            .field("status", &self.status())
            .finish()
    }
}
