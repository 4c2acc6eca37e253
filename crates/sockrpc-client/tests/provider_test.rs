//! Provider Integration Tests
//!
//! These tests drive a [`SocketProvider`] against a scripted server on the
//! other end of an in-memory duplex pipe. They cover:
//! - Correlating out-of-order responses
//! - Queueing requests while the socket opens
//! - Reassembling split and concatenated chunks
//! - Subscriptions and their teardown on reconnect
//! - Reconnect attempt limits

use serde_json::{json, Value};
use sockrpc_client::{
    ConnectionStatus, ProviderConfig, ProviderEvent, ReconnectOptions, SockRpcError,
    SocketProvider,
};
use sockrpc_common::protocol::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, SubscriptionId,
};
use sockrpc_common::transport::{
    memory_endpoint, ChunkFramer, JsonCodec, MemoryConnector, MemoryListener,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::broadcast;

/// Scripted server side of one connection
struct ServerEnd {
    stream: DuplexStream,
    framer: ChunkFramer,
    backlog: VecDeque<Value>,
}

impl ServerEnd {
    fn new(stream: DuplexStream) -> Self {
        Self {
            stream,
            framer: ChunkFramer::new(),
            backlog: VecDeque::new(),
        }
    }

    async fn next_request(&mut self) -> JsonRpcRequest {
        loop {
            if let Some(value) = self.backlog.pop_front() {
                return serde_json::from_value(value).unwrap();
            }
            let mut buf = [0u8; 4096];
            let n = self.stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "client closed the connection");
            for frame in self.framer.push(&buf[..n]) {
                self.backlog.push_back(frame.unwrap());
            }
        }
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    async fn respond(&mut self, id: u64, result: Value) {
        let response = JsonRpcResponse::success(json!(id), result);
        let bytes = JsonCodec::encode_response(&response).unwrap();
        self.send_raw(&bytes).await;
    }

    async fn push(&mut self, subscription: &str, result: Value) {
        let notification = JsonRpcNotification::subscription(
            "eth_subscription",
            &SubscriptionId::new(subscription),
            result,
        );
        let bytes = JsonCodec::encode_notification(&notification).unwrap();
        self.send_raw(&bytes).await;
    }

    /// Reads until the client closes its side.
    async fn expect_eof(&mut self) {
        let mut buf = [0u8; 1024];
        loop {
            match self.stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => continue,
            }
        }
    }
}

fn no_reconnect() -> ProviderConfig {
    ProviderConfig::default().with_reconnect(ReconnectOptions::disabled())
}

fn quick_reconnect(max_attempts: Option<u32>) -> ProviderConfig {
    ProviderConfig::default().with_reconnect(ReconnectOptions {
        auto_reconnect: true,
        delay: Duration::from_millis(10),
        max_attempts,
    })
}

fn provider(name: &str, config: ProviderConfig) -> (SocketProvider, MemoryConnector, MemoryListener) {
    let (connector, listener) = memory_endpoint(name);
    let provider = SocketProvider::new(Arc::new(connector.clone()), config);
    (provider, connector, listener)
}

async fn connected(
    name: &str,
    config: ProviderConfig,
) -> (SocketProvider, MemoryConnector, MemoryListener, ServerEnd) {
    let (provider, connector, listener) = provider(name, config);
    provider.connect().await.unwrap();
    let server = ServerEnd::new(listener.accept().await.unwrap());
    provider.wait_for_connection().await.unwrap();
    (provider, connector, listener, server)
}

async fn wait_for_event<F>(events: &mut broadcast::Receiver<ProviderEvent>, matches: F) -> ProviderEvent
where
    F: Fn(&ProviderEvent) -> bool,
{
    loop {
        let event = events.recv().await.unwrap();
        if matches(&event) {
            return event;
        }
    }
}

async fn wait_for_pending(provider: &SocketProvider, count: usize) {
    while provider.pending_request_count().await < count {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_out_of_order_responses_reach_their_callers() {
    let (provider, _connector, _listener, mut server) = connected("mem://order", no_reconnect()).await;

    let calls: Vec<_> = ["eth_chainId", "eth_blockNumber", "net_version"]
        .into_iter()
        .map(|method| {
            let provider = provider.clone();
            tokio::spawn(async move { (method, provider.request(method, vec![]).await) })
        })
        .collect();

    let mut requests = Vec::new();
    for _ in 0..3 {
        requests.push(server.next_request().await);
    }
    for request in requests.iter().rev() {
        server.respond(request.id, json!(format!("answer:{}", request.method))).await;
    }

    for call in calls {
        let (method, result) = call.await.unwrap();
        assert_eq!(result.unwrap(), json!(format!("answer:{}", method)));
    }
    assert_eq!(provider.pending_request_count().await, 0);
}

#[tokio::test]
async fn test_requests_queued_while_connecting_flush_in_order() {
    let (provider, _connector, listener) = provider("mem://queue", no_reconnect());
    provider.connect().await.unwrap();
    assert_eq!(provider.status(), ConnectionStatus::Connecting);

    let server = async {
        let mut server = ServerEnd::new(listener.accept().await.unwrap());
        let mut methods = Vec::new();
        for _ in 0..3 {
            let request = server.next_request().await;
            server.respond(request.id, json!(request.method.clone())).await;
            methods.push(request.method);
        }
        methods
    };

    let (first, second, third, methods) = tokio::join!(
        provider.request("first", vec![]),
        provider.request("second", vec![]),
        provider.request("third", vec![json!(3)]),
        server,
    );

    assert_eq!(methods, vec!["first", "second", "third"]);
    assert_eq!(first.unwrap(), json!("first"));
    assert_eq!(second.unwrap(), json!("second"));
    assert_eq!(third.unwrap(), json!("third"));
    assert_eq!(provider.queued_request_count().await, 0);
}

#[tokio::test]
async fn test_disconnect_fails_every_pending_call() {
    let (provider, _connector, _listener, mut server) = connected("mem://drain", no_reconnect()).await;
    let mut events = provider.events();

    let calls: Vec<_> = (0..4)
        .map(|i| {
            let provider = provider.clone();
            tokio::spawn(async move { provider.request("slow_method", vec![json!(i)]).await })
        })
        .collect();
    wait_for_pending(&provider, 4).await;

    provider.disconnect().await;

    for call in calls {
        assert!(call.await.unwrap().unwrap_err().is_connection_not_open());
    }
    assert_eq!(provider.pending_request_count().await, 0);
    assert_eq!(provider.status(), ConnectionStatus::Disconnected);
    assert_eq!(
        wait_for_event(&mut events, |e| matches!(e, ProviderEvent::Disconnected { .. })).await,
        ProviderEvent::Disconnected {
            code: 1000,
            reason: None
        }
    );
    server.expect_eof().await;
}

#[tokio::test]
async fn test_request_while_disconnected_never_reaches_transport() {
    let (provider, connector, _listener) = provider("mem://idle", no_reconnect());

    let err = provider.request("eth_chainId", vec![]).await.unwrap_err();
    assert!(matches!(err, SockRpcError::ConnectionNotOpen));
    assert_eq!(connector.attempts(), 0);
    assert_eq!(provider.pending_request_count().await, 0);
    assert_eq!(provider.queued_request_count().await, 0);
}

#[tokio::test]
async fn test_request_after_disconnect_fails() {
    let (provider, connector, _listener, _server) = connected("mem://after", no_reconnect()).await;
    provider.disconnect_with(4000, Some("maintenance".into())).await;

    let err = provider.request("eth_chainId", vec![]).await.unwrap_err();
    assert!(err.is_connection_not_open());
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn test_split_and_concatenated_chunks() {
    let (provider, _connector, _listener, mut server) = connected("mem://chunks", no_reconnect()).await;

    let first = tokio::spawn({
        let provider = provider.clone();
        async move { provider.request("first", vec![]).await }
    });
    let second = tokio::spawn({
        let provider = provider.clone();
        async move { provider.request("second", vec![]).await }
    });

    let a = server.next_request().await;
    let b = server.next_request().await;
    let (first_id, second_id) = if a.method == "first" { (a.id, b.id) } else { (b.id, a.id) };

    // One response split mid-string, the next glued to its tail.
    let head = format!(r#"{{"jsonrpc":"2.0","id":{},"result":"sp"#, first_id);
    let tail = format!(
        r#"lit}}"}}{{"jsonrpc":"2.0","id":{},"result":[1,2,3]}}"#,
        second_id
    );
    server.send_raw(head.as_bytes()).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    server.send_raw(tail.as_bytes()).await;

    assert_eq!(first.await.unwrap().unwrap(), json!("split}"));
    assert_eq!(second.await.unwrap().unwrap(), json!([1, 2, 3]));
}

#[tokio::test]
async fn test_malformed_segment_does_not_block_others() {
    let (provider, _connector, _listener, mut server) = connected("mem://garbled", no_reconnect()).await;

    let first = tokio::spawn({
        let provider = provider.clone();
        async move { provider.request("first", vec![]).await }
    });
    let first_id = server.next_request().await.id;
    let second = tokio::spawn({
        let provider = provider.clone();
        async move { provider.request("second", vec![]).await }
    });
    let second_id = server.next_request().await.id;

    let payload = format!(
        r#"{{"jsonrpc":"2.0","id":{},"result":"a"}}{{"id":oops}}{{"jsonrpc":"2.0","id":{},"result":"b"}}"#,
        first_id, second_id
    );
    server.send_raw(payload.as_bytes()).await;

    assert_eq!(first.await.unwrap().unwrap(), json!("a"));
    assert_eq!(second.await.unwrap().unwrap(), json!("b"));
    assert!(provider.is_connected());
}

#[tokio::test]
async fn test_unknown_response_id_is_ignored() {
    let (provider, _connector, _listener, mut server) = connected("mem://unknown", no_reconnect()).await;

    let call = tokio::spawn({
        let provider = provider.clone();
        async move { provider.request("eth_chainId", vec![]).await }
    });
    let request = server.next_request().await;
    server.respond(request.id + 1000, json!("stray")).await;
    server.respond(request.id, json!("0x1")).await;

    assert_eq!(call.await.unwrap().unwrap(), json!("0x1"));
}

#[tokio::test]
async fn test_server_error_surfaces_as_rpc_error() {
    let (provider, _connector, _listener, mut server) = connected("mem://rpcerr", no_reconnect()).await;

    let call = tokio::spawn({
        let provider = provider.clone();
        async move { provider.request("eth_nope", vec![]).await }
    });
    let request = server.next_request().await;
    let response = JsonRpcResponse::error(json!(request.id), JsonRpcError::method_not_found());
    server
        .send_raw(&JsonCodec::encode_response(&response).unwrap())
        .await;

    let err = call.await.unwrap().unwrap_err();
    assert_eq!(err.rpc_error().map(|e| e.code), Some(-32601));
}

#[tokio::test]
async fn test_unparseable_response_settles_its_call() {
    let (provider, _connector, _listener, mut server) = connected("mem://badbody", no_reconnect()).await;

    let call = tokio::spawn({
        let provider = provider.clone();
        async move { provider.request("eth_call", vec![]).await }
    });
    let request = server.next_request().await;
    let body = format!(
        r#"{{"jsonrpc":"2.0","id":{},"error":"execution reverted"}}"#,
        request.id
    );
    server.send_raw(body.as_bytes()).await;

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, SockRpcError::InvalidResponse(_)));
    assert_eq!(provider.pending_request_count().await, 0);
    assert!(provider.is_connected());
}

#[tokio::test]
async fn test_subscription_receives_pushes_and_unsubscribes() {
    let (provider, _connector, _listener, mut server) = connected("mem://subs", no_reconnect()).await;

    let subscribe = tokio::spawn({
        let provider = provider.clone();
        async move { provider.subscribe("eth_subscribe", vec![json!("newHeads")]).await }
    });
    let request = server.next_request().await;
    assert_eq!(request.method, "eth_subscribe");
    assert_eq!(request.params, vec![json!("newHeads")]);
    server.respond(request.id, json!("0xabc")).await;
    server.push("0xabc", json!({"number": "0x1"})).await;
    server.push("0xother", json!({"number": "0x99"})).await;
    server.push("0xabc", json!({"number": "0x2"})).await;

    let mut subscription = subscribe.await.unwrap().unwrap();
    assert_eq!(subscription.id().as_str(), "0xabc");
    assert_eq!(subscription.next().await, Some(json!({"number": "0x1"})));
    assert_eq!(subscription.next().await, Some(json!({"number": "0x2"})));

    assert_eq!(provider.subscription_count().await, 1);

    let (result, request) = tokio::join!(provider.unsubscribe(&subscription), async {
        let request = server.next_request().await;
        server.respond(request.id, json!(true)).await;
        request
    });
    assert!(result.unwrap());
    assert_eq!(request.method, "eth_unsubscribe");
    assert_eq!(request.params, vec![json!("0xabc")]);
    assert_eq!(provider.subscription_count().await, 0);

    // A second unsubscribe is answered locally.
    assert!(!provider.unsubscribe(&subscription).await.unwrap());
}

#[tokio::test]
async fn test_subscriptions_are_dropped_on_reconnect() {
    let (provider, connector, listener, mut server) = connected("mem://resub", quick_reconnect(None)).await;
    let mut events = provider.events();

    let subscribe = tokio::spawn({
        let provider = provider.clone();
        async move { provider.subscribe("eth_subscribe", vec![json!("logs")]).await }
    });
    let request = server.next_request().await;
    server.respond(request.id, json!("0x1")).await;
    let mut subscription = subscribe.await.unwrap().unwrap();
    assert_eq!(provider.subscription_count().await, 1);

    drop(server);

    wait_for_event(&mut events, |e| matches!(e, ProviderEvent::Disconnected { code: 1006, .. })).await;
    assert_eq!(subscription.next().await, None);

    let mut server = ServerEnd::new(listener.accept().await.unwrap());
    provider.wait_for_connection().await.unwrap();
    assert_eq!(connector.attempts(), 2);
    assert_eq!(provider.subscription_count().await, 0);

    // A fresh subscription on the new connection gets a different id.
    let (fresh, _) = tokio::join!(
        provider.subscribe("eth_subscribe", vec![json!("logs")]),
        async {
            let request = server.next_request().await;
            server.respond(request.id, json!("0x2")).await;
        }
    );
    let mut fresh = fresh.unwrap();
    assert_eq!(provider.subscription_count().await, 1);

    // The stale push is seen on the wire but reaches neither listener.
    server.push("0x1", json!("stale")).await;
    server.push("0x2", json!("current")).await;
    wait_for_event(&mut events, |e| {
        matches!(e, ProviderEvent::Message(m) if m["params"]["subscription"] == json!("0x1"))
    })
    .await;
    assert_eq!(fresh.next().await, Some(json!("current")));
    assert_eq!(fresh.try_next(), None);
    assert_eq!(subscription.try_next(), None);
    assert_eq!(provider.subscription_count().await, 1);
}

#[tokio::test]
async fn test_connection_loss_fails_pending_calls() {
    let (provider, _connector, _listener, server) = connected("mem://loss", no_reconnect()).await;

    let call = tokio::spawn({
        let provider = provider.clone();
        async move { provider.request("eth_chainId", vec![]).await }
    });
    wait_for_pending(&provider, 1).await;
    drop(server);

    assert!(call.await.unwrap().unwrap_err().is_connection_not_open());
    assert!(provider.wait_for_connection().await.is_err());
    assert_eq!(provider.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_connect_while_connected_is_noop() {
    let (provider, connector, _listener, _server) = connected("mem://twice", no_reconnect()).await;
    provider.connect().await.unwrap();
    provider.connect().await.unwrap();
    assert_eq!(connector.attempts(), 1);
    assert!(provider.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_stops_after_max_attempts() {
    let config = ProviderConfig::default().with_reconnect(ReconnectOptions {
        auto_reconnect: true,
        delay: Duration::from_secs(1),
        max_attempts: Some(2),
    });
    let (provider, connector, _listener) = provider("mem://flaky", config);
    connector.refuse_next(usize::MAX);
    let mut events = provider.events();

    provider.connect().await.unwrap();

    let mut retries = Vec::new();
    let mut errors = 0;
    loop {
        match events.recv().await.unwrap() {
            ProviderEvent::Reconnecting { attempt, delay } => {
                assert_eq!(delay, Duration::from_secs(1));
                retries.push(attempt);
            }
            ProviderEvent::Error(_) => errors += 1,
            ProviderEvent::ReconnectExhausted { attempts } => {
                assert_eq!(attempts, 2);
                break;
            }
            _ => {}
        }
    }

    assert_eq!(retries, vec![1, 2]);
    // Three refused opens plus the exhaustion notice.
    assert_eq!(errors, 4);
    assert_eq!(connector.attempts(), 3);
    assert_eq!(provider.status(), ConnectionStatus::Disconnected);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts(), 3);
    assert!(provider.wait_for_connection().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_successful_open_resets_attempt_count() {
    let config = ProviderConfig::default().with_reconnect(ReconnectOptions {
        auto_reconnect: true,
        delay: Duration::from_secs(1),
        max_attempts: Some(1),
    });
    let (provider, connector, listener) = provider("mem://reset", config);
    connector.refuse_next(1);

    provider.connect().await.unwrap();
    provider.wait_for_connection().await.unwrap();
    let server = listener.accept().await.unwrap();
    assert_eq!(connector.attempts(), 2);

    let mut events = provider.events();
    drop(server);

    let event = wait_for_event(&mut events, |e| {
        matches!(e, ProviderEvent::Reconnecting { .. } | ProviderEvent::ReconnectExhausted { .. })
    })
    .await;
    assert!(matches!(event, ProviderEvent::Reconnecting { attempt: 1, .. }));

    provider.wait_for_connection().await.unwrap();
    assert_eq!(connector.attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_vanished_target_counts_as_failed_attempt() {
    let config = ProviderConfig::default().with_reconnect(ReconnectOptions {
        auto_reconnect: true,
        delay: Duration::from_secs(1),
        max_attempts: Some(2),
    });
    let (provider, connector, listener) = provider("mem://vanish", config);
    provider.connect().await.unwrap();
    provider.wait_for_connection().await.unwrap();
    let server = listener.accept().await.unwrap();

    let mut events = provider.events();
    connector.set_available(false);
    drop(server);

    wait_for_event(&mut events, |e| matches!(e, ProviderEvent::ReconnectExhausted { .. })).await;
    // Only the original open reached the transport.
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_waiter_is_released_when_vanished_target_exhausts_retries() {
    let config = ProviderConfig::default().with_reconnect(ReconnectOptions {
        auto_reconnect: true,
        delay: Duration::from_secs(1),
        max_attempts: Some(2),
    });
    let (provider, connector, listener) = provider("mem://gone", config);
    provider.connect().await.unwrap();
    provider.wait_for_connection().await.unwrap();
    let server = listener.accept().await.unwrap();

    let mut events = provider.events();
    connector.set_available(false);
    drop(server);
    wait_for_event(&mut events, |e| matches!(e, ProviderEvent::Reconnecting { attempt: 1, .. })).await;

    // Waiting starts while a retry is still scheduled.
    let waiter = tokio::spawn({
        let provider = provider.clone();
        async move { provider.wait_for_connection().await }
    });
    let outcome = tokio::time::timeout(Duration::from_secs(600), waiter)
        .await
        .expect("waiter still blocked after retries ran out")
        .unwrap();
    assert!(outcome.unwrap_err().is_connection_not_open());
    assert_eq!(provider.status(), ConnectionStatus::Disconnected);
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn test_reset_fails_pending_but_keeps_connection() {
    let (provider, _connector, _listener, mut server) = connected("mem://reset-state", no_reconnect()).await;

    let call = tokio::spawn({
        let provider = provider.clone();
        async move { provider.request("eth_chainId", vec![]).await }
    });
    let request = server.next_request().await;
    wait_for_pending(&provider, 1).await;

    provider.reset().await;
    assert!(call.await.unwrap().unwrap_err().is_connection_not_open());
    assert!(provider.is_connected());

    // The late answer correlates with nothing.
    server.respond(request.id, json!("late")).await;
    let (result, _) = tokio::join!(provider.request("net_version", vec![]), async {
        let request = server.next_request().await;
        server.respond(request.id, json!("1")).await;
    });
    assert_eq!(result.unwrap(), json!("1"));
}

#[tokio::test]
async fn test_message_events_see_every_inbound_message() {
    let (provider, _connector, _listener, mut server) = connected("mem://events", no_reconnect()).await;
    let mut events = provider.events();

    server.push("0xfeed", json!(1)).await;

    let event = wait_for_event(&mut events, |e| matches!(e, ProviderEvent::Message(_))).await;
    let ProviderEvent::Message(message) = event else {
        unreachable!()
    };
    assert_eq!(message["params"]["subscription"], json!("0xfeed"));
}
