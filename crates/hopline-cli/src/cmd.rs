//! Command implementations.

use hopline_types::config::load_config;
use hopline_types::{HoplineError, HoplineResult, NodeConfig};
use hopline_wire::transport::encode_body;
use hopline_wire::{
    proxy_action, register_proxy_action, ActionRegistry, Executor, RequestSender, ResponseReader,
    TcpClient, TcpNode, TransportChannel, WireError,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Action every node serves.
pub const PING_ACTION: &str = "ping";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub msg: String,
}

fn config_error(e: WireError) -> HoplineError {
    HoplineError::Config(e.to_string())
}

fn ping(req: Ping, channel: Box<dyn TransportChannel>) {
    let reply = Ping {
        msg: format!("{}-ack", req.msg),
    };
    let sent = match encode_body(&reply) {
        Ok(body) => channel.send_response(body),
        Err(e) => channel.send_failure(e.to_failure()),
    };
    if let Err(e) = sent {
        debug!(error = %e, "ping reply not delivered");
    }
}

/// Register the built-in actions plus a proxy for each `[proxy] actions` entry.
///
/// A proxied action must be served locally too; its request reader decodes
/// the wrapped requests.
pub fn build_registry(config: &NodeConfig, client: &TcpClient) -> HoplineResult<ActionRegistry> {
    let mut builder = ActionRegistry::builder();
    builder
        .register(PING_ACTION, Executor::Same, ping)
        .map_err(config_error)?;

    let sender: Arc<dyn RequestSender> = Arc::new(client.clone());
    for action in &config.proxy.actions {
        register_proxy_action(
            &mut builder,
            Arc::clone(&sender),
            action,
            ResponseReader::of::<serde_json::Value>(),
        )
        .map_err(config_error)?;
        info!(action = %action, proxy_action = %proxy_action(action), "Proxying action");
    }
    Ok(builder.build())
}

pub fn cmd_start(config_path: Option<PathBuf>) -> HoplineResult<()> {
    let config = load_config(config_path.as_deref())?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let client = TcpClient::new(config.node.id.clone(), &config.transport);
        let registry = build_registry(&config, &client)?;
        let (node, accept) = TcpNode::start(&config, registry)
            .await
            .map_err(|e| HoplineError::Network(e.to_string()))?;
        println!("Hopline node {} listening", node.identity());
        for action in node.registry().actions() {
            println!("  serving {action}");
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Shutting down"),
            _ = accept => {}
        }

        let served = node.stats();
        let forwarded = client.stats();
        info!(
            requests_received = served.requests_received,
            decode_failures = served.decode_failures,
            requests_sent = forwarded.requests_sent,
            failed_replies = forwarded.failed_replies,
            "Node stopped"
        );
        Ok(())
    })
}

pub fn cmd_call(
    config_path: Option<PathBuf>,
    target: &str,
    action: &str,
    body: &str,
    via: Option<&str>,
) -> HoplineResult<()> {
    let config = load_config(config_path.as_deref())?;
    let target = config.peer(target)?.clone();
    let proxy = via.map(|id| config.peer(id).cloned()).transpose()?;
    let request: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| HoplineError::Serialization(format!("invalid --body: {e}")))?;

    let rt = tokio::runtime::Runtime::new()?;
    let reply = rt.block_on(async {
        let client = TcpClient::new(config.node.id.clone(), &config.transport);
        match &proxy {
            Some(proxy) => {
                client
                    .request_via::<_, serde_json::Value>(proxy, target, action, &request)
                    .await
            }
            None => {
                client
                    .request::<_, serde_json::Value>(&target, action, &request)
                    .await
            }
        }
    });

    let reply = reply.map_err(|f| HoplineError::Network(f.to_string()))?;
    let pretty = serde_json::to_string_pretty(&reply)
        .map_err(|e| HoplineError::Serialization(e.to_string()))?;
    println!("{pretty}");
    Ok(())
}

pub fn cmd_proxy_name(action: &str) {
    println!("{}", proxy_action(action));
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopline_types::TransportConfig;

    fn client() -> TcpClient {
        TcpClient::new("node-p", &TransportConfig::default())
    }

    #[test]
    fn test_registry_without_proxies() {
        let registry = build_registry(&NodeConfig::default(), &client()).unwrap();
        assert_eq!(registry.actions(), vec!["ping"]);
        assert!(registry.proxy_actions().is_empty());
    }

    #[test]
    fn test_registry_with_ping_proxy() {
        let mut config = NodeConfig::default();
        config.proxy.actions = vec!["ping".to_string()];
        let registry = build_registry(&config, &client()).unwrap();
        assert_eq!(
            registry.proxy_actions(),
            vec!["internal:transport/proxy/ping"]
        );
    }

    #[test]
    fn test_proxy_for_unserved_action_is_config_error() {
        let mut config = NodeConfig::default();
        config.proxy.actions = vec!["search".to_string()];
        let err = build_registry(&config, &client()).unwrap_err();
        match err {
            HoplineError::Config(msg) => assert!(msg.contains("search")),
            other => panic!("Expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_proxy_is_config_error() {
        let mut config = NodeConfig::default();
        config.proxy.actions = vec!["ping".to_string(), "ping".to_string()];
        assert!(matches!(
            build_registry(&config, &client()),
            Err(HoplineError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_served_ping() {
        let config = NodeConfig::default();
        let registry = build_registry(&config, &client()).unwrap();
        let (node, _task) = TcpNode::start(&config, registry).await.unwrap();

        let reply: Ping = client()
            .request(node.identity(), PING_ACTION, &Ping { msg: "hi".into() })
            .await
            .unwrap();
        assert_eq!(reply.msg, "hi-ack");
    }
}
