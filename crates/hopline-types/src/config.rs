//! Node configuration, loaded from `~/.hopline/config.toml` with defaults.
//!
//! ```toml
//! [node]
//! id = "node-p"
//! name = "proxy"
//! listen_addr = "0.0.0.0:9300"
//!
//! [transport]
//! request_timeout_ms = 30000
//! max_pending_replies = 1024
//!
//! [[peers]]
//! id = "node-t"
//! address = "10.0.0.3:9300"
//!
//! [proxy]
//! actions = ["ping"]
//! ```

use crate::error::{HoplineError, HoplineResult};
use crate::node::NodeIdentity;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Default request timeout for outbound calls.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Maximum single frame size (16 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Requests a connection may have awaiting a reply before reads pause.
pub const DEFAULT_MAX_PENDING_REPLIES: usize = 1024;

/// Top-level configuration of a Hopline node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Identity of the local node.
    pub node: NodeSection,
    /// Transport tuning.
    pub transport: TransportConfig,
    /// Known peers, addressable by id.
    pub peers: Vec<NodeIdentity>,
    /// Actions exposed through the proxy.
    pub proxy: ProxyConfig,
}

/// The `[node]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// This node's unique ID.
    pub id: String,
    /// This node's human-readable name.
    pub name: String,
    /// Address to bind the listener on.
    pub listen_addr: SocketAddr,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: "hopline-node".to_string(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        }
    }
}

/// The `[transport]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// How long an outbound call waits for its response.
    pub request_timeout_ms: u64,
    /// Largest frame accepted from a peer.
    pub max_message_size: u32,
    /// Unanswered requests allowed per inbound connection.
    pub max_pending_replies: usize,
}

impl TransportConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_pending_replies: DEFAULT_MAX_PENDING_REPLIES,
        }
    }
}

/// The `[proxy]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Actions this node relays on behalf of callers.
    pub actions: Vec<String>,
}

impl NodeConfig {
    /// Identity of the local node once its listener is bound.
    pub fn local_identity(&self, bound: SocketAddr) -> NodeIdentity {
        NodeIdentity::new(self.node.id.clone(), self.node.name.clone(), bound)
    }

    /// Look up a configured peer by id.
    pub fn peer(&self, id: &str) -> HoplineResult<&NodeIdentity> {
        self.peers
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| HoplineError::UnknownNode(id.to_string()))
    }
}

/// Default config location: `~/.hopline/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".hopline"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.toml")
}

/// Load node configuration from a TOML file, with defaults.
///
/// A missing file yields the defaults. A file that cannot be read or parsed
/// is a configuration error: a node must not start on a config it ignored.
pub fn load_config(path: Option<&Path>) -> HoplineResult<NodeConfig> {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        return Ok(NodeConfig::default());
    }

    let contents = std::fs::read_to_string(&config_path).map_err(|e| {
        HoplineError::Config(format!("failed to read {}: {e}", config_path.display()))
    })?;
    let config = toml::from_str::<NodeConfig>(&contents).map_err(|e| {
        HoplineError::Config(format!("failed to parse {}: {e}", config_path.display()))
    })?;
    info!(path = %config_path.display(), "Loaded configuration");
    Ok(config)
}
