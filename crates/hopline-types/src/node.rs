//! Node identity: the id/address pair used to reach a peer.
//!
//! The proxy never interprets an identity: it reads it off the wire and uses
//! it unchanged to address the forwarded call. The structural encoding is a
//! 4-byte big-endian length followed by the JSON form of the identity, so an
//! identity can be embedded at the front of any byte payload.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from reading an encoded node identity.
#[derive(Debug, Error)]
pub enum NodeDecodeError {
    #[error("truncated node identity: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("invalid node identity: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Identity of a node in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Unique node ID.
    pub id: String,
    /// Human-readable node name.
    #[serde(default)]
    pub name: String,
    /// Address the node's transport listens on.
    pub address: SocketAddr,
}

impl NodeIdentity {
    /// Create a new identity.
    pub fn new(id: impl Into<String>, name: impl Into<String>, address: SocketAddr) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address,
        }
    }

    /// Append the structural encoding of this identity to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<(), serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        out.extend_from_slice(&(json.len() as u32).to_be_bytes());
        out.extend_from_slice(&json);
        Ok(())
    }

    /// Read an identity written by [`NodeIdentity::write_to`].
    ///
    /// Returns the identity and the bytes that follow it.
    pub fn read_from(input: &[u8]) -> Result<(Self, &[u8]), NodeDecodeError> {
        if input.len() < 4 {
            return Err(NodeDecodeError::Truncated {
                needed: 4,
                available: input.len(),
            });
        }
        let len = u32::from_be_bytes([input[0], input[1], input[2], input[3]]) as usize;
        let rest = &input[4..];
        if rest.len() < len {
            return Err(NodeDecodeError::Truncated {
                needed: len,
                available: rest.len(),
            });
        }
        let node = serde_json::from_slice(&rest[..len])?;
        Ok((node, &rest[len..]))
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}@{}", self.id, self.address)
        } else {
            write!(f, "{} ({})@{}", self.name, self.id, self.address)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> NodeIdentity {
        NodeIdentity::new("node-t", "target", "10.0.0.3:9300".parse().unwrap())
    }

    #[test]
    fn test_write_read_keeps_trailing_bytes() {
        let mut buf = Vec::new();
        node().write_to(&mut buf).unwrap();
        buf.extend_from_slice(b"inner");

        let (decoded, rest) = NodeIdentity::read_from(&buf).unwrap();
        assert_eq!(decoded, node());
        assert_eq!(rest, b"inner");
    }

    #[test]
    fn test_read_truncated_header() {
        let err = NodeIdentity::read_from(&[0, 0]).unwrap_err();
        assert!(matches!(
            err,
            NodeDecodeError::Truncated {
                needed: 4,
                available: 2
            }
        ));
    }

    #[test]
    fn test_read_truncated_body() {
        let mut buf = Vec::new();
        node().write_to(&mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        assert!(matches!(
            NodeIdentity::read_from(&buf),
            Err(NodeDecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_read_garbage_identity() {
        let mut buf = 5u32.to_be_bytes().to_vec();
        buf.extend_from_slice(b"nope!");
        assert!(matches!(
            NodeIdentity::read_from(&buf),
            Err(NodeDecodeError::Invalid(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(node().to_string(), "target (node-t)@10.0.0.3:9300");
        let anon = NodeIdentity::new("n1", "", "127.0.0.1:1".parse().unwrap());
        assert_eq!(anon.to_string(), "n1@127.0.0.1:1");
    }
}
