//! TCP server and client for the Hopline wire protocol.
//!
//! A [`TcpNode`] binds a local TCP listener and dispatches every inbound
//! request through its [`ActionRegistry`]. Each connection gets a reader
//! loop and a writer task; replies reach the writer through a
//! [`TcpChannel`], so a handler may answer from any task.
//!
//! Every dispatched request holds one slot of the connection's reply queue
//! until it is answered. A full queue pauses reading. When the caller
//! half-closes, the writer stays up until every outstanding request has been
//! answered; a reset or read error closes the connection at once.
//!
//! A [`TcpClient`] issues outbound requests, one connection per call, and
//! delivers the outcome to a [`ResponseHandler`] on the task that read the
//! response.

use crate::error::{FailureKind, TransportFailure, WireError};
use crate::message::*;
use crate::proxy::{proxy_action, wrap_request, ProxyStage};
use crate::registry::ActionRegistry;
use crate::transport::{
    decode_body, encode_body, pending_response, Executor, InboundRequest, RequestSender,
    ResponseHandler, TransportChannel,
};

use bytes::Bytes;
use hopline_types::config::DEFAULT_MAX_MESSAGE_SIZE;
use hopline_types::{NodeConfig, NodeIdentity, TransportConfig};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::OwnedPermit;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Largest frame a node accepts unless configured otherwise.
pub const MAX_MESSAGE_SIZE: u32 = DEFAULT_MAX_MESSAGE_SIZE;

/// Counters kept by the transport.
#[derive(Debug, Default)]
pub struct TransportStats {
    requests_received: AtomicU64,
    requests_sent: AtomicU64,
    decode_failures: AtomicU64,
    failed_replies: AtomicU64,
}

/// Point-in-time copy of [`TransportStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub requests_received: u64,
    pub requests_sent: u64,
    pub decode_failures: u64,
    /// Outcomes that could not be written back to the node that asked for them.
    pub failed_replies: u64,
}

impl TransportStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests_received: self.requests_received.load(Ordering::Relaxed),
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            failed_replies: self.failed_replies.load(Ordering::Relaxed),
        }
    }
}

/// Reply channel bound to one inbound request on one connection.
///
/// Dropping it without replying sends a failure, so the caller is never
/// left waiting.
pub struct TcpChannel {
    request_id: String,
    action: String,
    local_node: String,
    permit: Option<OwnedPermit<WireMessage>>,
}

impl TcpChannel {
    fn new(
        request_id: String,
        action: String,
        local_node: String,
        permit: OwnedPermit<WireMessage>,
    ) -> Self {
        Self {
            request_id,
            action,
            local_node,
            permit: Some(permit),
        }
    }

    fn send(&mut self, response: WireResponse) -> Result<(), WireError> {
        let permit = self.permit.take().ok_or(WireError::ChannelClosed)?;
        let tx = permit.send(WireMessage::response(self.request_id.clone(), response));
        // The writer is gone, so the reply was discarded.
        if tx.is_closed() {
            return Err(WireError::ChannelClosed);
        }
        Ok(())
    }
}

impl TransportChannel for TcpChannel {
    fn send_response(mut self: Box<Self>, body: Bytes) -> Result<(), WireError> {
        self.send(WireResponse::Ok { body })
    }

    fn send_failure(mut self: Box<Self>, failure: TransportFailure) -> Result<(), WireError> {
        let failure = failure.at(self.local_node.clone());
        self.send(WireResponse::Failure { failure })
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        if self.permit.is_some() {
            warn!(action = %self.action, id = %self.request_id, "Handler dropped request without replying");
            let failure = TransportFailure::new(
                FailureKind::RemoteException,
                format!("handler for [{}] dropped the request without replying", self.action),
            )
            .at(self.local_node.clone());
            let _ = self.send(WireResponse::Failure { failure });
        }
    }
}

/// The local network node. Listens for connections and serves actions.
pub struct TcpNode {
    identity: NodeIdentity,
    registry: ActionRegistry,
    max_message_size: u32,
    max_pending_replies: usize,
    stats: TransportStats,
}

impl TcpNode {
    /// Bind the configured address and start accepting connections.
    pub async fn start(
        config: &NodeConfig,
        registry: ActionRegistry,
    ) -> Result<(Arc<Self>, tokio::task::JoinHandle<()>), WireError> {
        let listener = TcpListener::bind(config.node.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        let identity = config.local_identity(local_addr);

        info!(
            "Hopline: listening on {} (node_id={}, {} actions)",
            local_addr,
            identity.id,
            registry.len()
        );

        let node = Arc::new(Self {
            identity,
            registry,
            max_message_size: config.transport.max_message_size,
            max_pending_replies: config.transport.max_pending_replies.max(1),
            stats: TransportStats::default(),
        });

        let node_clone = Arc::clone(&node);
        let accept_handle = tokio::spawn(async move {
            Self::accept_loop(listener, node_clone).await;
        });

        Ok((node, accept_handle))
    }

    /// Get the actual bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.identity.address
    }

    /// Identity other nodes use to reach this one.
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Accept loop, run in a spawned task.
    async fn accept_loop(listener: TcpListener, node: Arc<TcpNode>) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("Hopline: accepted connection from {}", addr);
                    let node = Arc::clone(&node);
                    tokio::spawn(async move {
                        if let Err(e) = node.handle_inbound(stream).await {
                            debug!("Hopline: inbound connection from {} ended: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Hopline: accept error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Serve one inbound connection until the peer stops sending.
    async fn handle_inbound(&self, stream: TcpStream) -> Result<(), WireError> {
        let (mut reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::channel(self.max_pending_replies);
        let (reset_tx, reset_rx) = oneshot::channel::<()>();
        tokio::spawn(writer_loop(writer, rx, reset_rx));

        loop {
            let msg = match read_message(&mut reader, self.max_message_size).await {
                Ok(m) => m,
                // Half-close: the writer drains outstanding replies on its own.
                Err(WireError::ConnectionClosed) => return Ok(()),
                Err(e) => {
                    let _ = reset_tx.send(());
                    return Err(e);
                }
            };

            match msg.kind {
                WireMessageKind::Request(request) => {
                    let Ok(permit) = tx.clone().reserve_owned().await else {
                        // Writer failed; nothing more can be answered here.
                        return Ok(());
                    };
                    self.dispatch(msg.id, request, permit);
                }
                WireMessageKind::Response(_) => {
                    warn!("Hopline: unexpected response message {} on inbound connection", msg.id);
                }
            }
        }
    }

    /// Decode a request and hand it to its registered handler.
    fn dispatch(&self, id: String, request: WireRequest, permit: OwnedPermit<WireMessage>) {
        self.stats.requests_received.fetch_add(1, Ordering::Relaxed);
        let WireRequest { action, body } = request;
        let channel = Box::new(TcpChannel::new(
            id,
            action.clone(),
            self.identity.id.clone(),
            permit,
        ));

        let Some(entry) = self.registry.get(&action) else {
            warn!(action = %action, "Hopline: no handler registered");
            let failure = TransportFailure::new(
                FailureKind::ActionNotFound,
                format!("no handler for action [{action}]"),
            );
            if let Err(e) = channel.send_failure(failure) {
                debug!(action = %action, error = %e, "Hopline: failed to reject request");
            }
            return;
        };

        let decoded = match entry.reader.read(&body) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.stats.decode_failures.fetch_add(1, Ordering::Relaxed);
                if matches!(e, WireError::MalformedEnvelope(_)) {
                    warn!(action = %action, stage = ?ProxyStage::DecodeFailed, error = %e, "Hopline: malformed envelope");
                } else {
                    warn!(action = %action, error = %e, "Hopline: failed to decode request");
                }
                if let Err(send_err) = channel.send_failure(e.to_failure()) {
                    debug!(action = %action, error = %send_err, "Hopline: failed to reject request");
                }
                return;
            }
        };

        let inbound = InboundRequest::new(action, body, decoded);
        match entry.executor {
            Executor::Same => entry.handler.message_received(inbound, channel),
            Executor::Spawn => {
                let handler = Arc::clone(&entry.handler);
                tokio::spawn(async move { handler.message_received(inbound, channel) });
            }
        }
    }
}

/// Write replies for one connection.
///
/// Runs until every sender is gone, a write fails, or `reset` fires.
/// Returning drops the queue, so later replies fail with
/// [`WireError::ChannelClosed`].
async fn writer_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<WireMessage>,
    mut reset: oneshot::Receiver<()>,
) {
    let mut reading_ended = false;
    loop {
        tokio::select! {
            biased;
            signal = &mut reset, if !reading_ended => {
                if signal.is_ok() {
                    return;
                }
                // Sender dropped: reading ended cleanly, keep draining.
                reading_ended = true;
            }
            msg = rx.recv() => {
                let Some(msg) = msg else { return };
                if let Err(e) = write_message(&mut writer, &msg).await {
                    debug!("Hopline: reply {} not written: {}", msg.id, e);
                    return;
                }
            }
        }
    }
}

/// Outbound side of the transport.
#[derive(Clone)]
pub struct TcpClient {
    node_id: String,
    request_timeout: Duration,
    max_message_size: u32,
    stats: Arc<TransportStats>,
}

impl TcpClient {
    /// Client for the node `node_id`; failures it produces name that node.
    pub fn new(node_id: impl Into<String>, config: &TransportConfig) -> Self {
        Self {
            node_id: node_id.into(),
            request_timeout: config.request_timeout(),
            max_message_size: config.max_message_size,
            stats: Arc::new(TransportStats::default()),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Send a raw body to `action` on `target` and await the outcome.
    pub async fn request_bytes(
        &self,
        target: &NodeIdentity,
        action: &str,
        body: Bytes,
    ) -> Result<Bytes, TransportFailure> {
        let (handler, rx) = pending_response();
        self.send_request(target, action, body, handler);
        rx.await.unwrap_or_else(|_| {
            Err(TransportFailure::new(
                FailureKind::NodeDisconnected,
                format!("[{target}][{action}] request abandoned"),
            )
            .at(self.node_id.clone()))
        })
    }

    /// Send a typed request and decode the typed response.
    pub async fn request<Req, Resp>(
        &self,
        target: &NodeIdentity,
        action: &str,
        request: &Req,
    ) -> Result<Resp, TransportFailure>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let body = encode_body(request).map_err(|e| self.local_failure(&e))?;
        let reply = self.request_bytes(target, action, body).await?;
        decode_body(&reply).map_err(|e| self.local_failure(&e))
    }

    /// Call `action` on `target` through `proxy`.
    pub async fn request_via<Req, Resp>(
        &self,
        proxy: &NodeIdentity,
        target: NodeIdentity,
        action: &str,
        request: &Req,
    ) -> Result<Resp, TransportFailure>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let envelope = wrap_request(target, request)
            .and_then(|envelope| envelope.encode())
            .map_err(|e| self.local_failure(&e))?;
        debug!(
            action = %action,
            proxy = %proxy,
            stage = ?ProxyStage::SentToProxy,
            "Hopline: sending proxied request"
        );
        let reply = self
            .request_bytes(proxy, &proxy_action(action), envelope)
            .await?;
        decode_body(&reply).map_err(|e| self.local_failure(&e))
    }

    fn local_failure(&self, e: &WireError) -> TransportFailure {
        e.to_failure().at(self.node_id.clone())
    }

    /// One request on a fresh connection, bounded by the request timeout.
    async fn call(
        &self,
        target: &NodeIdentity,
        action: &str,
        body: Bytes,
    ) -> Result<Bytes, TransportFailure> {
        match tokio::time::timeout(self.request_timeout, self.exchange(target, action, body)).await
        {
            Ok(outcome) => outcome.map_err(|f| f.at(self.node_id.clone())),
            Err(_) => Err(TransportFailure::new(
                FailureKind::ReceiveTimeout,
                format!(
                    "[{target}][{action}] request timed out after {}ms",
                    self.request_timeout.as_millis()
                ),
            )
            .at(self.node_id.clone())),
        }
    }

    async fn exchange(
        &self,
        target: &NodeIdentity,
        action: &str,
        body: Bytes,
    ) -> Result<Bytes, TransportFailure> {
        let stream = TcpStream::connect(target.address).await.map_err(|e| {
            TransportFailure::new(
                FailureKind::ConnectTransport,
                format!("[{target}] connect failed: {e}"),
            )
        })?;
        let (mut reader, mut writer) = stream.into_split();

        let msg = WireMessage::request(action, body);
        write_message(&mut writer, &msg).await.map_err(|e| {
            TransportFailure::new(
                FailureKind::NodeDisconnected,
                format!("[{target}][{action}] send failed: {e}"),
            )
        })?;

        loop {
            let reply = read_message(&mut reader, self.max_message_size)
                .await
                .map_err(|e| match e {
                    WireError::Json(_) | WireError::MessageTooLarge { .. } => TransportFailure::new(
                        FailureKind::Serialization,
                        format!("[{target}][{action}] unreadable response: {e}"),
                    ),
                    _ => TransportFailure::new(
                        FailureKind::NodeDisconnected,
                        format!("[{target}][{action}] disconnected before responding: {e}"),
                    ),
                })?;
            if reply.id != msg.id {
                warn!("Hopline: dropping reply {} to unknown request", reply.id);
                continue;
            }
            match reply.kind {
                WireMessageKind::Response(WireResponse::Ok { body }) => return Ok(body),
                WireMessageKind::Response(WireResponse::Failure { failure }) => {
                    return Err(failure)
                }
                WireMessageKind::Request(_) => {
                    warn!("Hopline: unexpected request {} on outbound connection", reply.id);
                }
            }
        }
    }
}

impl RequestSender for TcpClient {
    fn send_request(
        &self,
        target: &NodeIdentity,
        action: &str,
        body: Bytes,
        handler: Box<dyn ResponseHandler>,
    ) {
        self.stats.requests_sent.fetch_add(1, Ordering::Relaxed);
        let client = self.clone();
        let target = target.clone();
        let action = action.to_string();
        tokio::spawn(async move {
            let delivered = match client.call(&target, &action, body).await {
                Ok(body) => handler.handle_response(body),
                Err(failure) => {
                    debug!(action = %action, target = %target, failure = %failure, "Hopline: request failed");
                    handler.handle_failure(failure)
                }
            };
            if let Err(e) = delivered {
                client.stats.failed_replies.fetch_add(1, Ordering::Relaxed);
                warn!(action = %action, target = %target, error = %e, "Hopline: outcome could not be delivered");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping {
        msg: String,
    }

    fn config(node_id: &str) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.node.id = node_id.to_string();
        config.node.name = format!("{node_id}-name");
        config
    }

    fn ack(req: Ping, channel: Box<dyn TransportChannel>) {
        let reply = encode_body(&Ping {
            msg: format!("{}-ack", req.msg),
        })
        .unwrap();
        let _ = channel.send_response(reply);
    }

    fn client() -> TcpClient {
        TcpClient::new("node-c", &TransportConfig::default())
    }

    async fn start_node(node_id: &str, registry: ActionRegistry) -> Arc<TcpNode> {
        let (node, _task) = TcpNode::start(&config(node_id), registry).await.unwrap();
        node
    }

    #[tokio::test]
    async fn test_request_response() {
        let mut builder = ActionRegistry::builder();
        builder.register("ping", Executor::Same, ack).unwrap();
        let node = start_node("node-t", builder.build()).await;
        assert_eq!(node.identity().id, "node-t");
        assert_ne!(node.local_addr().port(), 0);

        let client = client();
        let reply: Ping = client
            .request(node.identity(), "ping", &Ping { msg: "hi".into() })
            .await
            .unwrap();
        assert_eq!(reply.msg, "hi-ack");
        assert_eq!(client.stats().requests_sent, 1);
        assert_eq!(node.stats().requests_received, 1);
    }

    #[tokio::test]
    async fn test_spawned_executor() {
        let mut builder = ActionRegistry::builder();
        builder.register("ping", Executor::Spawn, ack).unwrap();
        let node = start_node("node-t", builder.build()).await;

        let client = client();
        let reply: Ping = client
            .request(node.identity(), "ping", &Ping { msg: "bg".into() })
            .await
            .unwrap();
        assert_eq!(reply.msg, "bg-ack");
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let node = start_node("node-t", ActionRegistry::default()).await;
        let client = client();
        let err = client
            .request::<_, Ping>(node.identity(), "missing", &Ping { msg: "x".into() })
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::ActionNotFound);
        assert_eq!(err.node.as_deref(), Some("node-t"));
        assert!(err.message.contains("missing"));
    }

    #[tokio::test]
    async fn test_undecodable_request() {
        let mut builder = ActionRegistry::builder();
        builder.register("ping", Executor::Same, ack).unwrap();
        let node = start_node("node-t", builder.build()).await;

        let client = client();
        let err = client
            .request_bytes(node.identity(), "ping", Bytes::from_static(b"[1,2]"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Serialization);
        assert_eq!(node.stats().decode_failures, 1);
    }

    #[tokio::test]
    async fn test_dropped_channel_answers_with_failure() {
        let mut builder = ActionRegistry::builder();
        builder
            .register("ignore", Executor::Same, |_: Ping, _: Box<dyn TransportChannel>| {})
            .unwrap();
        let node = start_node("node-t", builder.build()).await;

        let err = client()
            .request::<_, Ping>(node.identity(), "ignore", &Ping { msg: "x".into() })
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::RemoteException);
        assert!(err.message.contains("ignore"));
    }

    #[tokio::test]
    async fn test_request_timeout() {
        // Keeps every channel alive so no reply is ever written.
        let parked: Arc<Mutex<Vec<Box<dyn TransportChannel>>>> = Arc::default();
        let parked_clone = parked.clone();
        let mut builder = ActionRegistry::builder();
        builder
            .register("slow", Executor::Same, move |_: Ping, channel| {
                parked_clone.lock().unwrap().push(channel);
            })
            .unwrap();
        let node = start_node("node-t", builder.build()).await;

        let transport = TransportConfig {
            request_timeout_ms: 100,
            ..TransportConfig::default()
        };
        let client = TcpClient::new("node-c", &transport);
        let err = client
            .request::<_, Ping>(node.identity(), "slow", &Ping { msg: "x".into() })
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::ReceiveTimeout);
        assert_eq!(err.node.as_deref(), Some("node-c"));
        assert_eq!(parked.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        // Bind then drop a listener to get a port nobody listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let target = NodeIdentity::new("node-gone", "gone", addr);

        let err = client()
            .request::<_, Ping>(&target, "ping", &Ping { msg: "x".into() })
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::ConnectTransport);
        assert!(err.message.contains(&addr.to_string()));
        assert_eq!(err.node.as_deref(), Some("node-c"));
    }

    #[tokio::test]
    async fn test_raw_frames_on_one_connection() {
        let mut builder = ActionRegistry::builder();
        builder.register("ping", Executor::Same, ack).unwrap();
        let node = start_node("node-t", builder.build()).await;

        let stream = TcpStream::connect(node.local_addr()).await.unwrap();
        let (mut reader, mut writer) = stream.into_split();
        for word in ["one", "two"] {
            let msg = WireMessage::request("ping", encode_body(&Ping { msg: word.into() }).unwrap());
            write_message(&mut writer, &msg).await.unwrap();
            let reply = read_message(&mut reader, MAX_MESSAGE_SIZE).await.unwrap();
            assert_eq!(reply.id, msg.id);
            match reply.kind {
                WireMessageKind::Response(WireResponse::Ok { body }) => {
                    let pong: Ping = decode_body(&body).unwrap();
                    assert_eq!(pong.msg, format!("{word}-ack"));
                }
                other => panic!("Expected Ok response, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_reply_after_half_close() {
        use tokio::io::AsyncWriteExt;

        let mut builder = ActionRegistry::builder();
        builder.register("ping", Executor::Same, ack).unwrap();
        let node = start_node("node-t", builder.build()).await;

        let stream = TcpStream::connect(node.local_addr()).await.unwrap();
        let (mut reader, mut writer) = stream.into_split();
        let msg = WireMessage::request("ping", encode_body(&Ping { msg: "eof".into() }).unwrap());
        write_message(&mut writer, &msg).await.unwrap();
        writer.shutdown().await.unwrap();

        let reply = read_message(&mut reader, MAX_MESSAGE_SIZE).await.unwrap();
        assert_eq!(reply.id, msg.id);
        assert!(matches!(
            reply.kind,
            WireMessageKind::Response(WireResponse::Ok { .. })
        ));
        let after = read_message(&mut reader, MAX_MESSAGE_SIZE).await;
        assert!(matches!(after, Err(WireError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_pending_replies_bound_pauses_reading() {
        let parked: Arc<Mutex<Vec<Box<dyn TransportChannel>>>> = Arc::default();
        let parked_clone = parked.clone();
        let mut builder = ActionRegistry::builder();
        builder
            .register("hold", Executor::Same, move |_: Ping, channel| {
                parked_clone.lock().unwrap().push(channel);
            })
            .unwrap();
        let mut config = config("node-t");
        config.transport.max_pending_replies = 1;
        let (node, _task) = TcpNode::start(&config, builder.build()).await.unwrap();

        let stream = TcpStream::connect(node.local_addr()).await.unwrap();
        let (mut reader, mut writer) = stream.into_split();
        let first = WireMessage::request("hold", encode_body(&Ping { msg: "1".into() }).unwrap());
        let second = WireMessage::request("hold", encode_body(&Ping { msg: "2".into() }).unwrap());
        write_message(&mut writer, &first).await.unwrap();
        write_message(&mut writer, &second).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(node.stats().requests_received, 1);

        let channel = parked.lock().unwrap().pop().unwrap();
        channel
            .send_response(encode_body(&Ping { msg: "1-ack".into() }).unwrap())
            .unwrap();
        let reply = read_message(&mut reader, MAX_MESSAGE_SIZE).await.unwrap();
        assert_eq!(reply.id, first.id);

        let mut received = 0;
        for _ in 0..50 {
            received = node.stats().requests_received;
            if received == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(received, 2);
    }
}
