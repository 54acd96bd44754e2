//! Clap CLI definitions for Hopline.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  hopline start                               Serve ping and the configured proxy actions
  hopline call node-t ping                    Call ping on node-t directly
  hopline call node-t ping --via node-p       Call ping on node-t through node-p
  hopline proxy-name ping                     Print the proxy action name for ping";

/// Hopline: call actions on peers you cannot reach, through peers you can.
#[derive(Parser)]
#[command(name = "hopline", version, after_help = AFTER_HELP)]
pub struct Cli {
    /// Path to config file (default: ~/.hopline/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a node and serve until Ctrl+C.
    Start,
    /// Call an action on a configured peer.
    Call {
        /// ID of the target node (must be listed under [[peers]]).
        target: String,
        /// Action to call.
        action: String,
        /// JSON request body.
        #[arg(long, default_value = "{\"msg\":\"hi\"}")]
        body: String,
        /// ID of a proxy node to route the call through.
        #[arg(long)]
        via: Option<String>,
    },
    /// Print the proxy action name derived from an action name.
    ProxyName {
        /// The original action name.
        action: String,
    },
}
