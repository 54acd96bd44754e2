//! Transport seams: the contract between request handlers and the substrate.
//!
//! A node registers a [`RequestHandler`] per action together with a
//! [`BodyReader`] that decodes the request body. Outbound calls go through a
//! [`RequestSender`] and report back through a [`ResponseHandler`]; inbound
//! requests are answered through a [`TransportChannel`]. Both callbacks
//! consume themselves, so exactly one outcome is produced per request.

use crate::error::{TransportFailure, WireError};
use bytes::Bytes;
use hopline_types::NodeIdentity;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::warn;

/// Encode a typed body.
pub fn encode_body<T: Serialize>(value: &T) -> Result<Bytes, WireError> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

/// Decode a typed body.
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, WireError> {
    Ok(serde_json::from_slice(body)?)
}

type DecodeFn = dyn Fn(&Bytes) -> Result<Box<dyn Any + Send>, WireError> + Send + Sync;

/// Typed decode function for the body of one action.
#[derive(Clone)]
pub struct BodyReader {
    type_name: &'static str,
    decode: Arc<DecodeFn>,
}

/// Reader for request bodies.
pub type RequestReader = BodyReader;
/// Reader for response bodies.
pub type ResponseReader = BodyReader;

impl BodyReader {
    /// Reader that decodes JSON bodies into `T`.
    pub fn of<T>() -> Self
    where
        T: DeserializeOwned + Send + 'static,
    {
        Self::from_fn(|body: &Bytes| decode_body::<T>(body))
    }

    /// Reader backed by a custom decode function.
    pub fn from_fn<T, F>(decode: F) -> Self
    where
        T: Send + 'static,
        F: Fn(&Bytes) -> Result<T, WireError> + Send + Sync + 'static,
    {
        Self {
            type_name: std::any::type_name::<T>(),
            decode: Arc::new(move |body| decode(body).map(|v| Box::new(v) as Box<dyn Any + Send>)),
        }
    }

    /// Decode `body`, returning the type-erased value.
    pub fn read(&self, body: &Bytes) -> Result<Box<dyn Any + Send>, WireError> {
        (self.decode)(body)
    }

    /// Name of the type this reader produces.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for BodyReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyReader")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// A decoded inbound request.
pub struct InboundRequest {
    action: String,
    body: Bytes,
    decoded: Box<dyn Any + Send>,
}

impl InboundRequest {
    pub fn new(action: impl Into<String>, body: Bytes, decoded: Box<dyn Any + Send>) -> Self {
        Self {
            action: action.into(),
            body,
            decoded,
        }
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// The raw body the request was decoded from.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Take the decoded value, which must have been produced as a `T`.
    pub fn into_decoded<T: 'static>(self) -> Result<T, WireError> {
        self.decoded
            .downcast::<T>()
            .map(|v| *v)
            .map_err(|_| WireError::UnexpectedRequestType {
                expected: std::any::type_name::<T>(),
            })
    }
}

impl fmt::Debug for InboundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundRequest")
            .field("action", &self.action)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Where a request handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Executor {
    /// Inline on the task that read the request.
    Same,
    /// On a freshly spawned tokio task.
    Spawn,
}

/// Reply path back to the node that sent an inbound request.
pub trait TransportChannel: Send + 'static {
    fn send_response(self: Box<Self>, body: Bytes) -> Result<(), WireError>;

    fn send_failure(self: Box<Self>, failure: TransportFailure) -> Result<(), WireError>;
}

/// Handles inbound requests for one action.
pub trait RequestHandler: Send + Sync + 'static {
    fn message_received(&self, request: InboundRequest, channel: Box<dyn TransportChannel>);
}

/// Receives the outcome of one outbound request.
///
/// An `Err` return means the outcome could not be delivered onward; the
/// substrate records it as a failed reply attempt.
pub trait ResponseHandler: Send + 'static {
    fn handle_response(self: Box<Self>, body: Bytes) -> Result<(), WireError>;

    fn handle_failure(self: Box<Self>, failure: TransportFailure) -> Result<(), WireError>;
}

/// Issues outbound requests.
///
/// `send_request` returns as soon as the call is issued; the handler runs
/// later on the task that receives the outcome.
pub trait RequestSender: Send + Sync + 'static {
    fn send_request(
        &self,
        target: &NodeIdentity,
        action: &str,
        body: Bytes,
        handler: Box<dyn ResponseHandler>,
    );
}

struct FnHandler<T, F> {
    f: F,
    _request: PhantomData<fn(T)>,
}

impl<T, F> RequestHandler for FnHandler<T, F>
where
    T: Send + 'static,
    F: Fn(T, Box<dyn TransportChannel>) + Send + Sync + 'static,
{
    fn message_received(&self, request: InboundRequest, channel: Box<dyn TransportChannel>) {
        let action = request.action().to_string();
        match request.into_decoded::<T>() {
            Ok(req) => (self.f)(req, channel),
            Err(e) => {
                if let Err(send_err) = channel.send_failure(e.to_failure()) {
                    warn!(action = %action, error = %send_err, "Failed to reject request");
                }
            }
        }
    }
}

/// Wrap a closure over a typed request as a [`RequestHandler`].
pub fn handler_fn<T, F>(f: F) -> Arc<dyn RequestHandler>
where
    T: Send + 'static,
    F: Fn(T, Box<dyn TransportChannel>) + Send + Sync + 'static,
{
    Arc::new(FnHandler {
        f,
        _request: PhantomData,
    })
}

/// Outcome of an outbound request, as delivered to an awaiting caller.
pub type ResponseResult = Result<Bytes, TransportFailure>;

struct PendingResponse {
    tx: oneshot::Sender<ResponseResult>,
}

impl ResponseHandler for PendingResponse {
    fn handle_response(self: Box<Self>, body: Bytes) -> Result<(), WireError> {
        self.tx.send(Ok(body)).map_err(|_| WireError::ChannelClosed)
    }

    fn handle_failure(self: Box<Self>, failure: TransportFailure) -> Result<(), WireError> {
        self.tx.send(Err(failure)).map_err(|_| WireError::ChannelClosed)
    }
}

/// A [`ResponseHandler`] whose outcome can be awaited on the receiver.
pub fn pending_response() -> (Box<dyn ResponseHandler>, oneshot::Receiver<ResponseResult>) {
    let (tx, rx) = oneshot::channel();
    (Box::new(PendingResponse { tx }), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use serde::Deserialize;
    use std::sync::Mutex;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        msg: String,
    }

    /// Channel that records what was sent on it.
    struct RecordingChannel {
        sent: Arc<Mutex<Vec<Result<Bytes, TransportFailure>>>>,
    }

    impl TransportChannel for RecordingChannel {
        fn send_response(self: Box<Self>, body: Bytes) -> Result<(), WireError> {
            self.sent.lock().unwrap().push(Ok(body));
            Ok(())
        }

        fn send_failure(self: Box<Self>, failure: TransportFailure) -> Result<(), WireError> {
            self.sent.lock().unwrap().push(Err(failure));
            Ok(())
        }
    }

    #[test]
    fn test_reader_decodes_typed_body() {
        let reader = RequestReader::of::<Ping>();
        let body = encode_body(&Ping { msg: "hi".into() }).unwrap();
        let decoded = reader.read(&body).unwrap();
        let request = InboundRequest::new("ping", body, decoded);
        assert_eq!(request.into_decoded::<Ping>().unwrap().msg, "hi");
        assert!(reader.type_name().ends_with("Ping"));
    }

    #[test]
    fn test_reader_rejects_wrong_shape() {
        let reader = RequestReader::of::<Ping>();
        let err = reader.read(&Bytes::from_static(b"{\"other\":1}")).unwrap_err();
        assert!(matches!(err, WireError::Json(_)));
    }

    #[test]
    fn test_into_decoded_wrong_type() {
        let request = InboundRequest::new("ping", Bytes::new(), Box::new(42u32));
        let err = request.into_decoded::<Ping>().unwrap_err();
        assert!(matches!(err, WireError::UnexpectedRequestType { .. }));
    }

    #[test]
    fn test_handler_fn_replies_with_failure_on_type_mismatch() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let handler = handler_fn(|req: Ping, channel: Box<dyn TransportChannel>| {
            let _ = channel.send_response(Bytes::from(req.msg));
        });

        let channel = Box::new(RecordingChannel { sent: sent.clone() });
        handler.message_received(InboundRequest::new("ping", Bytes::new(), Box::new(7u8)), channel);

        let channel = Box::new(RecordingChannel { sent: sent.clone() });
        let ping = Box::new(Ping { msg: "ok".into() });
        handler.message_received(InboundRequest::new("ping", Bytes::new(), ping), channel);

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].as_ref().unwrap_err().kind, FailureKind::Serialization);
        assert_eq!(sent[1].as_ref().unwrap(), &Bytes::from("ok"));
    }

    #[tokio::test]
    async fn test_pending_response_delivers_once() {
        let (handler, rx) = pending_response();
        handler
            .handle_failure(TransportFailure::new(FailureKind::ReceiveTimeout, "late"))
            .unwrap();
        let outcome = rx.await.unwrap();
        assert_eq!(outcome.unwrap_err().kind, FailureKind::ReceiveTimeout);
    }

    #[test]
    fn test_pending_response_receiver_gone() {
        let (handler, rx) = pending_response();
        drop(rx);
        let err = handler.handle_response(Bytes::new()).unwrap_err();
        assert!(matches!(err, WireError::ChannelClosed));
    }
}
