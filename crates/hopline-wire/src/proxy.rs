//! Transport action proxy.
//!
//! Lets a node call an action on a target it has no connection to, through
//! a proxy node connected to both. The caller wraps its request in a
//! [`ProxyRequest`] naming the target and sends it to the proxy under
//! [`proxy_action`]`(action)`. The proxy unwraps it, calls `action` on the
//! target with the original body, and relays the target's response or
//! failure back unchanged.
//!
//! Per request: `Created → SentToProxy → ReceivedByProxy → ForwardedToTarget
//! → {Responded | Failed} → RelayedToCaller`, or `DecodeFailed` when the
//! envelope cannot be read. See [`ProxyStage`].

use crate::error::{FailureKind, TransportFailure, WireError};
use crate::registry::ActionRegistryBuilder;
use crate::transport::{
    encode_body, Executor, InboundRequest, RequestHandler, RequestReader, RequestSender,
    ResponseHandler, ResponseReader, TransportChannel,
};
use bytes::Bytes;
use hopline_types::NodeIdentity;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Prefix of every proxy action name.
pub const PROXY_ACTION_PREFIX: &str = "internal:transport/proxy/";

/// The proxy action name for `action`.
pub fn proxy_action(action: &str) -> String {
    format!("{PROXY_ACTION_PREFIX}{action}")
}

/// Whether `name` is a derived proxy action name.
pub fn is_proxy_action(name: &str) -> bool {
    name.starts_with(PROXY_ACTION_PREFIX)
}

/// Where a proxied request is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStage {
    Created,
    SentToProxy,
    ReceivedByProxy,
    ForwardedToTarget,
    Responded,
    Failed,
    RelayedToCaller,
    DecodeFailed,
}

/// Envelope carrying a request for a node the sender cannot reach directly.
///
/// Encoded as `[node identity][inner request bytes]`. The inner bytes are
/// never re-encoded: the proxy forwards exactly what the caller sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    target_node: NodeIdentity,
    inner: Bytes,
}

impl ProxyRequest {
    pub fn new(target_node: NodeIdentity, inner: Bytes) -> Self {
        Self { target_node, inner }
    }

    pub fn target_node(&self) -> &NodeIdentity {
        &self.target_node
    }

    /// The wrapped request body.
    pub fn inner(&self) -> &Bytes {
        &self.inner
    }

    pub fn into_parts(self) -> (NodeIdentity, Bytes) {
        (self.target_node, self.inner)
    }

    pub fn encode(&self) -> Result<Bytes, WireError> {
        let mut out = Vec::with_capacity(self.inner.len() + 128);
        self.target_node.write_to(&mut out)?;
        out.extend_from_slice(&self.inner);
        Ok(Bytes::from(out))
    }

    /// Decode an envelope, validating the inner request with `inner_reader`.
    ///
    /// Any failure is [`WireError::MalformedEnvelope`].
    pub fn decode(bytes: &Bytes, inner_reader: &RequestReader) -> Result<Self, WireError> {
        let (target_node, rest) = NodeIdentity::read_from(bytes)
            .map_err(|e| WireError::MalformedEnvelope(e.to_string()))?;
        let inner = bytes.slice(bytes.len() - rest.len()..);
        inner_reader.read(&inner).map_err(|e| {
            WireError::MalformedEnvelope(format!(
                "inner request is not a valid {}: {e}",
                inner_reader.type_name()
            ))
        })?;
        Ok(Self { target_node, inner })
    }
}

/// Wrap `request` in an envelope addressed to `target`.
pub fn wrap_request<T: Serialize>(
    target: NodeIdentity,
    request: &T,
) -> Result<ProxyRequest, WireError> {
    let inner = encode_body(request)?;
    debug!(target = %target, stage = ?ProxyStage::Created, "Proxy: wrapped request");
    Ok(ProxyRequest::new(target, inner))
}

/// Reader for envelopes whose inner request is decoded by `inner_reader`.
pub fn envelope_reader(inner_reader: RequestReader) -> RequestReader {
    RequestReader::from_fn(move |bytes: &Bytes| ProxyRequest::decode(bytes, &inner_reader))
}

/// Install a proxy for `action`.
///
/// `action` must already be registered: its request reader decodes the
/// wrapped requests. `response_reader` checks the target's responses before
/// they are relayed.
pub fn register_proxy_action(
    registry: &mut ActionRegistryBuilder,
    sender: Arc<dyn RequestSender>,
    action: &str,
    response_reader: ResponseReader,
) -> Result<(), WireError> {
    let inner_reader = registry
        .request_reader(action)
        .ok_or_else(|| WireError::UnknownAction(action.to_string()))?;
    registry.register_handler(
        proxy_action(action),
        envelope_reader(inner_reader),
        Executor::Same,
        Arc::new(ProxyRequestHandler {
            sender,
            action: action.to_string(),
            response_reader,
        }),
    )?;
    Ok(())
}

/// Unwraps envelopes and forwards them to their target.
pub struct ProxyRequestHandler {
    sender: Arc<dyn RequestSender>,
    action: String,
    response_reader: ResponseReader,
}

impl RequestHandler for ProxyRequestHandler {
    fn message_received(&self, request: InboundRequest, channel: Box<dyn TransportChannel>) {
        debug!(action = %self.action, stage = ?ProxyStage::ReceivedByProxy, "Proxy: request received");
        let envelope = match request.into_decoded::<ProxyRequest>() {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(action = %self.action, stage = ?ProxyStage::DecodeFailed, error = %e, "Proxy: rejecting request");
                if let Err(send_err) = channel.send_failure(e.to_failure()) {
                    warn!(action = %self.action, error = %send_err, "Proxy: failed to reject request");
                }
                return;
            }
        };

        let (target, inner) = envelope.into_parts();
        debug!(
            action = %self.action,
            target = %target,
            stage = ?ProxyStage::ForwardedToTarget,
            "Proxy: forwarding request"
        );
        let relay = ProxyResponseHandler {
            channel,
            action: self.action.clone(),
            target: target.id.clone(),
            response_reader: self.response_reader.clone(),
        };
        self.sender
            .send_request(&target, &self.action, inner, Box::new(relay));
    }
}

/// Relays the target's outcome to the original caller.
pub struct ProxyResponseHandler {
    channel: Box<dyn TransportChannel>,
    action: String,
    target: String,
    response_reader: ResponseReader,
}

impl ResponseHandler for ProxyResponseHandler {
    fn handle_response(self: Box<Self>, body: Bytes) -> Result<(), WireError> {
        if let Err(e) = self.response_reader.read(&body) {
            let failure = TransportFailure::new(
                FailureKind::Serialization,
                format!(
                    "[{}][{}] response is not a valid {}: {e}",
                    self.target,
                    self.action,
                    self.response_reader.type_name()
                ),
            );
            return self.handle_failure(failure);
        }
        debug!(
            action = %self.action,
            target = %self.target,
            stage = ?ProxyStage::Responded,
            "Proxy: relaying response"
        );
        self.channel.send_response(body)?;
        debug!(stage = ?ProxyStage::RelayedToCaller, "Proxy: response relayed");
        Ok(())
    }

    fn handle_failure(self: Box<Self>, failure: TransportFailure) -> Result<(), WireError> {
        debug!(
            action = %self.action,
            target = %self.target,
            stage = ?ProxyStage::Failed,
            failure = %failure,
            "Proxy: relaying failure"
        );
        self.channel.send_failure(failure)?;
        debug!(stage = ?ProxyStage::RelayedToCaller, "Proxy: failure relayed");
        Ok(())
    }
}
