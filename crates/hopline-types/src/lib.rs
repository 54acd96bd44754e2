//! Core types for Hopline, the transport action proxy.
//!
//! This crate defines the data shared by the wire protocol and the node
//! binary: node identities, node configuration and the top-level error type.
//! It contains no networking.

pub mod config;
pub mod error;
pub mod node;

pub use config::{NodeConfig, ProxyConfig, TransportConfig};
pub use error::{HoplineError, HoplineResult};
pub use node::{NodeDecodeError, NodeIdentity};
