//! Hopline wire protocol and transport action proxy.
//!
//! Lets a node call an action on a peer it cannot reach directly by routing
//! the call through a proxy node connected to both.
//!
//! ## Architecture
//!
//! - **ActionRegistry**: read-only table of actions, their readers and handlers
//! - **TcpNode / TcpClient**: the TCP substrate serving and issuing requests
//! - **WireMessage**: JSON-framed protocol messages
//! - **proxy**: envelope, request handler and response relay

pub mod error;
pub mod message;
pub mod peer;
pub mod proxy;
pub mod registry;
pub mod transport;

pub use error::{FailureKind, TransportFailure, WireError};
pub use message::{WireMessage, WireRequest, WireResponse};
pub use peer::{StatsSnapshot, TcpChannel, TcpClient, TcpNode};
pub use proxy::{
    proxy_action, register_proxy_action, wrap_request, ProxyRequest, ProxyStage,
    PROXY_ACTION_PREFIX,
};
pub use registry::{ActionRegistry, ActionRegistryBuilder, RegisteredAction};
pub use transport::{
    BodyReader, Executor, InboundRequest, RequestHandler, RequestReader, RequestSender,
    ResponseHandler, ResponseReader, TransportChannel,
};
