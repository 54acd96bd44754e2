//! Local errors and the relayable failure value.
//!
//! [`WireError`] stays on the node that produced it. [`TransportFailure`] is
//! what travels back to a caller: it is serialized into the response frame
//! and relayed byte-for-byte by every proxy on the way.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from the wire protocol layer.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: u32, max: u32 },
    #[error("Malformed proxy envelope: {0}")]
    MalformedEnvelope(String),
    #[error("Action already registered: {0}")]
    DuplicateAction(String),
    #[error("Action not registered: {0}")]
    UnknownAction(String),
    #[error("Reply channel closed")]
    ChannelClosed,
    #[error("Request is not a {expected}")]
    UnexpectedRequestType { expected: &'static str },
}

impl WireError {
    /// The failure a caller sees when this error rejects its request.
    pub fn to_failure(&self) -> TransportFailure {
        let kind = match self {
            WireError::MalformedEnvelope(_) => FailureKind::MalformedEnvelope,
            WireError::UnknownAction(_) => FailureKind::ActionNotFound,
            WireError::Json(_) | WireError::UnexpectedRequestType { .. } => {
                FailureKind::Serialization
            }
            WireError::Io(_) | WireError::ConnectionClosed | WireError::ChannelClosed => {
                FailureKind::NodeDisconnected
            }
            WireError::MessageTooLarge { .. } | WireError::DuplicateAction(_) => {
                FailureKind::RemoteException
            }
        };
        TransportFailure::new(kind, self.to_string())
    }
}

/// Category of a [`TransportFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The target could not be connected to.
    ConnectTransport,
    /// The connection dropped before a response arrived.
    NodeDisconnected,
    /// No response within the request timeout.
    ReceiveTimeout,
    /// The remote handler failed.
    RemoteException,
    /// No handler is registered for the action.
    ActionNotFound,
    /// A proxy envelope could not be decoded.
    MalformedEnvelope,
    /// A request or response body could not be decoded.
    Serialization,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ConnectTransport => "connect_transport",
            FailureKind::NodeDisconnected => "node_disconnected",
            FailureKind::ReceiveTimeout => "receive_timeout",
            FailureKind::RemoteException => "remote_exception",
            FailureKind::ActionNotFound => "action_not_found",
            FailureKind::MalformedEnvelope => "malformed_envelope",
            FailureKind::Serialization => "serialization",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured request failure, relayed unchanged across proxies.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("[{kind}] {message}")]
pub struct TransportFailure {
    pub kind: FailureKind,
    pub message: String,
    /// ID of the node the failure originated on, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

impl TransportFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            node: None,
        }
    }

    /// Attribute the failure to `node_id` unless it already names an origin.
    pub fn at(mut self, node_id: impl Into<String>) -> Self {
        if self.node.is_none() {
            self.node = Some(node_id.into());
        }
        self
    }
}
