//! Connection state machine.
//!
//! One [`Connection`] owns the socket for a provider. Each open attempt gets
//! a new generation number; reader and writer tasks carry the generation they
//! were started for, and anything they report after their generation has been
//! replaced is ignored. Error events are the exception: they are always
//! published.
//!
//! All mutable state sits behind one async mutex. Background tasks hold a
//! `Weak` reference so an abandoned provider shuts down when its last handle
//! is dropped.

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use sockrpc_common::protocol::{
    InboundMessage, JsonRpcRequest, JsonRpcResponse, RequestIdGenerator, Result, RpcParams,
    SockRpcError, SubscriptionId,
};
use sockrpc_common::transport::{BoxedStream, ChunkFramer, Connector, JsonCodec};
use std::fmt;
use std::io;
use std::sync::{Arc, Weak};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use crate::config::ProviderConfig;
use crate::correlation::{CorrelationTable, PendingCall};
use crate::events::{ProviderEvent, ABNORMAL_CLOSURE};
use crate::queue::{OutboundEntry, OutboundQueue};
use crate::reconnect::{ReconnectDecision, ReconnectPolicy};
use crate::subscriptions::{Listener, SubscriptionRegistry};

/// Connection status as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        };
        f.write_str(name)
    }
}

struct ConnectionState {
    status: ConnectionStatus,
    generation: u64,
    /// Feeds the writer task of the live connection
    writer: Option<mpsc::UnboundedSender<Bytes>>,
    reader: Option<AbortHandle>,
    pending: CorrelationTable,
    subscriptions: SubscriptionRegistry,
    outbound: OutboundQueue,
    reconnect: ReconnectPolicy,
    reconnect_task: Option<JoinHandle<()>>,
    framer: ChunkFramer,
    closed_by_caller: bool,
}

pub(crate) struct Connection {
    connector: Arc<dyn Connector>,
    config: ProviderConfig,
    ids: RequestIdGenerator,
    state: Mutex<ConnectionState>,
    status: watch::Sender<ConnectionStatus>,
    events: broadcast::Sender<ProviderEvent>,
}

impl Connection {
    pub(crate) fn new(connector: Arc<dyn Connector>, config: ProviderConfig) -> Arc<Self> {
        let framer = ChunkFramer::new()
            .with_max_message_size(config.max_message_size)
            .with_partial_timeout(config.partial_timeout);
        let state = ConnectionState {
            status: ConnectionStatus::Disconnected,
            generation: 0,
            writer: None,
            reader: None,
            pending: CorrelationTable::new(),
            subscriptions: SubscriptionRegistry::new(),
            outbound: OutboundQueue::new(),
            reconnect: ReconnectPolicy::new(config.reconnect.clone()),
            reconnect_task: None,
            framer,
            closed_by_caller: false,
        };
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Arc::new(Self {
            connector,
            config,
            ids: RequestIdGenerator::new(),
            state: Mutex::new(state),
            status,
            events,
        })
    }

    pub(crate) fn target(&self) -> &str {
        self.connector.target()
    }

    pub(crate) fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub(crate) fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub(crate) fn events(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    /// Starts opening the socket unless it is already open or opening.
    ///
    /// Fails synchronously, without any state change, when the target does
    /// not validate.
    pub(crate) async fn open(self: &Arc<Self>) -> Result<()> {
        self.connector.validate()?;

        let mut state = self.state.lock().await;
        state.closed_by_caller = false;
        if state.status != ConnectionStatus::Disconnected {
            debug!(status = %state.status, "connect ignored, connection already active");
            return Ok(());
        }
        if let Some(task) = state.reconnect_task.take() {
            task.abort();
        }
        state.reconnect.reset();
        self.begin_connect(&mut state);
        Ok(())
    }

    /// Waits until the connection is open.
    ///
    /// Keeps waiting through scheduled reconnects; fails once the connection
    /// is down with nothing left to try.
    pub(crate) async fn wait_connected(&self) -> Result<()> {
        let mut status = self.status.subscribe();
        loop {
            let current = *status.borrow_and_update();
            match current {
                ConnectionStatus::Connected => return Ok(()),
                ConnectionStatus::Connecting => {}
                ConnectionStatus::Disconnected => {
                    if !self.reconnect_scheduled().await {
                        return Err(SockRpcError::ConnectionNotOpen);
                    }
                }
            }
            if status.changed().await.is_err() {
                return Err(SockRpcError::ConnectionNotOpen);
            }
        }
    }

    async fn reconnect_scheduled(&self) -> bool {
        let state = self.state.lock().await;
        state.status == ConnectionStatus::Disconnected
            && !state.closed_by_caller
            && state.reconnect_task.is_some()
    }

    /// Closes the connection at the caller's request.
    ///
    /// Pending calls fail, queued requests and subscriptions are discarded,
    /// and no reconnect follows.
    pub(crate) async fn close(&self, code: u16, reason: Option<String>) {
        let mut state = self.state.lock().await;
        state.closed_by_caller = true;
        if let Some(task) = state.reconnect_task.take() {
            task.abort();
        }
        // Retire the current generation so an in-flight open is discarded.
        state.generation += 1;
        self.teardown(&mut state, code, reason);
    }

    /// Fails every pending call and forgets queued requests and
    /// subscriptions. The connection itself is left as it is.
    pub(crate) async fn reset(&self) {
        let mut state = self.state.lock().await;
        let queued = state.outbound.clear();
        let failed = state.pending.drain_all(|| SockRpcError::ConnectionNotOpen);
        let subscriptions = state.subscriptions.clear();
        info!(failed, queued, subscriptions, "provider state reset");
    }

    /// Registers a call and sends it, or queues it while the socket opens.
    ///
    /// `listener` marks a subscribe call: it is attached to the server's
    /// subscription id in the same step that settles the call, so no push
    /// can be missed between the two.
    pub(crate) async fn submit(
        &self,
        method: String,
        params: RpcParams,
        listener: Option<Listener>,
    ) -> Result<oneshot::Receiver<Result<Value>>> {
        let mut state = self.state.lock().await;
        if state.status == ConnectionStatus::Disconnected {
            return Err(SockRpcError::ConnectionNotOpen);
        }

        let id = self.ids.next_id();
        let request = JsonRpcRequest::new(id, method, params);
        let payload = JsonCodec::encode_request(&request)?;

        let (tx, rx) = oneshot::channel();
        let mut call = PendingCall::new(id, request.method, tx);
        if let Some(listener) = listener {
            call = call.with_listener(listener);
        }
        state.pending.register(call);

        if state.status == ConnectionStatus::Connected {
            let sent = state
                .writer
                .as_ref()
                .is_some_and(|writer| writer.send(payload).is_ok());
            if sent {
                trace!(id, "request sent");
            } else {
                state.pending.reject(id, SockRpcError::ConnectionNotOpen);
            }
        } else {
            state.outbound.push(OutboundEntry::new(id, payload));
            debug!(id, queued = state.outbound.len(), "request queued until the connection opens");
        }
        Ok(rx)
    }

    /// Stops routing pushes for `id`. Returns whether it was registered.
    pub(crate) async fn forget_subscription(&self, id: &SubscriptionId) -> bool {
        self.state.lock().await.subscriptions.remove(id)
    }

    pub(crate) async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub(crate) async fn queued_len(&self) -> usize {
        self.state.lock().await.outbound.len()
    }

    pub(crate) async fn subscription_len(&self) -> usize {
        self.state.lock().await.subscriptions.len()
    }

    fn begin_connect(self: &Arc<Self>, state: &mut ConnectionState) {
        state.generation += 1;
        let generation = state.generation;
        self.set_status(state, ConnectionStatus::Connecting);
        info!(endpoint = self.connector.target(), generation, "opening connection");

        let connection = Arc::downgrade(self);
        let connector = Arc::clone(&self.connector);
        tokio::spawn(async move {
            let opened = connector.connect().await;
            let Some(connection) = connection.upgrade() else {
                return;
            };
            match opened {
                Ok(stream) => connection.on_open(generation, stream).await,
                Err(err) => {
                    connection.on_transport_error(generation, &err);
                    connection.on_close(generation, Some(err.to_string())).await;
                }
            }
        });
    }

    async fn on_open(self: &Arc<Self>, generation: u64, stream: BoxedStream) {
        let mut state = self.state.lock().await;
        if state.generation != generation || state.status != ConnectionStatus::Connecting {
            debug!(generation, "discarding stream opened for a retired attempt");
            return;
        }

        let (read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = mpsc::unbounded_channel();
        let weak = Arc::downgrade(self);
        tokio::spawn(write_loop(write_half, rx, weak.clone(), generation));
        let reader = tokio::spawn(read_loop(
            read_half,
            weak,
            generation,
            self.config.read_buffer_size,
        ));

        state.reader = Some(reader.abort_handle());
        state.framer.reset();
        state.reconnect.reset();

        let mut flushed = 0usize;
        for entry in state.outbound.drain() {
            if tx.send(entry.payload).is_err() {
                break;
            }
            flushed += 1;
        }
        state.writer = Some(tx);
        self.set_status(&mut state, ConnectionStatus::Connected);
        info!(endpoint = self.connector.target(), generation, flushed, "connection open");
        self.emit(ProviderEvent::Connected);
    }

    async fn on_data(&self, generation: u64, chunk: &[u8]) {
        let mut guard = self.state.lock().await;
        if guard.generation != generation || guard.status != ConnectionStatus::Connected {
            return;
        }
        let ConnectionState {
            framer,
            pending,
            subscriptions,
            ..
        } = &mut *guard;

        let now = tokio::time::Instant::now().into_std();
        for frame in framer.push_at(chunk, now) {
            match frame {
                Ok(value) => self.route(value, pending, subscriptions),
                Err(err) => warn!(generation, error = %err, "dropping inbound segment"),
            }
        }
    }

    fn route(
        &self,
        value: Value,
        pending: &mut CorrelationTable,
        subscriptions: &mut SubscriptionRegistry,
    ) {
        if self.events.receiver_count() > 0 {
            self.emit(ProviderEvent::Message(value.clone()));
        }
        for message in InboundMessage::classify_all(value) {
            match message {
                Ok(InboundMessage::Response(response)) => {
                    settle_response(response, pending, subscriptions)
                }
                Ok(InboundMessage::Notification(notification)) => {
                    match notification.subscription_id() {
                        Some(id) => {
                            if !subscriptions.dispatch(&id, notification.payload()) {
                                debug!(subscription = %id, "push for unknown subscription dropped");
                            }
                        }
                        None => debug!(method = %notification.method, "ignoring server notification"),
                    }
                }
                Ok(InboundMessage::Malformed { id, reason }) => {
                    warn!(id, error = %reason, "malformed response");
                    pending.reject(id, SockRpcError::InvalidResponse(reason));
                }
                Err(err) => warn!(error = %err, "unroutable inbound message"),
            }
        }
    }

    fn on_transport_error(&self, generation: u64, err: &io::Error) {
        warn!(endpoint = self.connector.target(), generation, error = %err, "transport error");
        self.emit(ProviderEvent::Error(err.to_string()));
    }

    /// Handles a connection that ended without a caller request.
    async fn on_close(self: &Arc<Self>, generation: u64, reason: Option<String>) {
        let mut state = self.state.lock().await;
        if state.generation != generation || state.status == ConnectionStatus::Disconnected {
            return;
        }
        self.teardown(&mut state, ABNORMAL_CLOSURE, reason);
        self.schedule_reconnect(&mut state);
    }

    fn teardown(&self, state: &mut ConnectionState, code: u16, reason: Option<String>) {
        let was = state.status;
        // Dropping the sender ends the writer task, which shuts the socket down.
        state.writer = None;
        if let Some(reader) = state.reader.take() {
            reader.abort();
        }
        state.framer.reset();
        let queued = state.outbound.clear();
        let failed = state.pending.drain_all(|| SockRpcError::ConnectionNotOpen);
        let subscriptions = state.subscriptions.clear();
        self.set_status(state, ConnectionStatus::Disconnected);

        if was != ConnectionStatus::Disconnected {
            info!(
                endpoint = self.connector.target(),
                code,
                failed,
                queued,
                subscriptions,
                "connection closed"
            );
            self.emit(ProviderEvent::Disconnected { code, reason });
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, state: &mut ConnectionState) {
        if state.closed_by_caller {
            return;
        }
        match state.reconnect.next_attempt() {
            ReconnectDecision::Disabled => {}
            ReconnectDecision::Retry { attempt, delay } => {
                info!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
                self.emit(ProviderEvent::Reconnecting { attempt, delay });
                let connection = Arc::downgrade(self);
                let generation = state.generation;
                state.reconnect_task = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(connection) = connection.upgrade() {
                        connection.reconnect(generation).await;
                    }
                }));
            }
            ReconnectDecision::Exhausted { attempts } => {
                let err = SockRpcError::MaxReconnectAttempts(attempts);
                error!(endpoint = self.connector.target(), attempts, "giving up on reconnecting");
                self.emit(ProviderEvent::Error(err.to_string()));
                self.emit(ProviderEvent::ReconnectExhausted { attempts });
            }
        }
        // Wake status waiters so they re-check whether a reconnect is still due.
        self.status.send_replace(state.status);
    }

    async fn reconnect(self: &Arc<Self>, generation: u64) {
        let mut state = self.state.lock().await;
        state.reconnect_task = None;
        if state.closed_by_caller
            || state.generation != generation
            || state.status != ConnectionStatus::Disconnected
        {
            return;
        }
        if let Err(err) = self.connector.validate() {
            warn!(error = %err, "reconnect target unavailable");
            self.emit(ProviderEvent::Error(err.to_string()));
            self.schedule_reconnect(&mut state);
            return;
        }
        self.begin_connect(&mut state);
    }

    fn set_status(&self, state: &mut ConnectionState, status: ConnectionStatus) {
        state.status = status;
        self.status.send_replace(status);
    }

    fn emit(&self, event: ProviderEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(task) = state.reconnect_task.take() {
            task.abort();
        }
        if let Some(reader) = state.reader.take() {
            reader.abort();
        }
        state.pending.drain_all(|| SockRpcError::ConnectionNotOpen);
    }
}

fn settle_response(
    response: JsonRpcResponse,
    pending: &mut CorrelationTable,
    subscriptions: &mut SubscriptionRegistry,
) {
    let Some(id) = response.request_id() else {
        debug!(id = %response.id, "response without a usable id discarded");
        return;
    };
    let Some(mut call) = pending.take(id) else {
        debug!(id, "response for unknown request id discarded");
        return;
    };

    match response.into_outcome() {
        Err(err) => call.reject(SockRpcError::Rpc(err)),
        Ok(result) => match call.take_listener() {
            None => call.resolve(result),
            Some(listener) => match SubscriptionId::from_value(&result) {
                Some(subscription) => {
                    debug!(id, subscription = %subscription, "subscription registered");
                    subscriptions.register(subscription, listener);
                    call.resolve(result);
                }
                None => call.reject(SockRpcError::SubscriptionRejected(format!(
                    "server returned {} instead of a subscription id",
                    result
                ))),
            },
        },
    }
}

async fn read_loop(
    mut reader: ReadHalf<BoxedStream>,
    connection: Weak<Connection>,
    generation: u64,
    buffer_size: usize,
) {
    let mut buf = vec![0u8; buffer_size.max(1)];
    loop {
        let read = reader.read(&mut buf).await;
        let Some(conn) = connection.upgrade() else {
            return;
        };
        match read {
            Ok(0) => {
                conn.on_close(generation, Some("connection closed by peer".into()))
                    .await;
                return;
            }
            Ok(n) => conn.on_data(generation, &buf[..n]).await,
            Err(err) => {
                conn.on_transport_error(generation, &err);
                conn.on_close(generation, Some(err.to_string())).await;
                return;
            }
        }
    }
}

async fn write_loop(
    mut writer: WriteHalf<BoxedStream>,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    connection: Weak<Connection>,
    generation: u64,
) {
    while let Some(payload) = outbound.recv().await {
        if let Err(err) = write_payload(&mut writer, &payload).await {
            if let Some(conn) = connection.upgrade() {
                conn.on_transport_error(generation, &err);
                conn.on_close(generation, Some(err.to_string())).await;
            }
            return;
        }
    }
    // The connection dropped our sender: half-close the socket.
    if let Err(err) = writer.shutdown().await {
        debug!(generation, error = %err, "socket shutdown failed");
    }
}

async fn write_payload(writer: &mut WriteHalf<BoxedStream>, payload: &[u8]) -> io::Result<()> {
    writer.write_all(payload).await?;
    writer.flush().await
}
