//! Wire protocol message types.
//!
//! All communication between Hopline nodes uses JSON-framed messages over
//! TCP. Each message is prefixed with a 4-byte big-endian length header.
//! Request and response bodies are opaque bytes, carried as base64 strings.

use crate::error::{TransportFailure, WireError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// A wire protocol message (envelope).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Unique message ID. A response carries the ID of its request.
    pub id: String,
    /// Message variant.
    #[serde(flatten)]
    pub kind: WireMessageKind,
}

/// The different kinds of wire messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessageKind {
    /// Request from one node to another.
    #[serde(rename = "request")]
    Request(WireRequest),
    /// Response to a request.
    #[serde(rename = "response")]
    Response(WireResponse),
}

/// A request for a named action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRequest {
    /// Action to dispatch on the receiving node.
    pub action: String,
    /// Encoded request body.
    #[serde(with = "base64_body")]
    pub body: Bytes,
}

/// The outcome of a request: a body or a failure, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum WireResponse {
    #[serde(rename = "ok")]
    Ok {
        #[serde(with = "base64_body")]
        body: Bytes,
    },
    #[serde(rename = "failure")]
    Failure { failure: TransportFailure },
}

impl WireMessage {
    pub fn request(action: impl Into<String>, body: Bytes) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: WireMessageKind::Request(WireRequest {
                action: action.into(),
                body,
            }),
        }
    }

    pub fn response(id: impl Into<String>, response: WireResponse) -> Self {
        Self {
            id: id.into(),
            kind: WireMessageKind::Response(response),
        }
    }
}

mod base64_body {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

/// Encode a wire message to bytes (4-byte big-endian length + JSON).
pub fn encode_message(msg: &WireMessage) -> Result<Vec<u8>, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    let len = json.len() as u32;
    let mut bytes = Vec::with_capacity(4 + json.len());
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(&json);
    Ok(bytes)
}

/// Decode the length prefix from a 4-byte header.
pub fn decode_length(header: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*header)
}

/// Parse a JSON body into a WireMessage.
pub fn decode_message(body: &[u8]) -> Result<WireMessage, serde_json::Error> {
    serde_json::from_slice(body)
}

/// Write a framed message (4-byte length + JSON).
pub async fn write_message<W>(writer: &mut W, msg: &WireMessage) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_message(msg)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a framed message (4-byte length + JSON).
///
/// A clean EOF before the header yields [`WireError::ConnectionClosed`].
pub async fn read_message<R>(reader: &mut R, max_size: u32) -> Result<WireMessage, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(WireError::ConnectionClosed);
        }
        Err(e) => return Err(WireError::Io(e)),
    }

    let len = decode_length(&header);
    if len > max_size {
        return Err(WireError::MessageTooLarge {
            size: len,
            max: max_size,
        });
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;

    let msg = decode_message(&body)?;
    Ok(msg)
}
