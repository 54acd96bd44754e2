//! Hopline node binary.
//!
//! `hopline start` serves the built-in `ping` action and a proxy for every
//! action listed under `[proxy]`; `hopline call` issues a direct or proxied
//! call to a configured peer.

mod cli;
mod cmd;

use crate::cli::{Cli, Commands};
use clap::Parser;

fn init_tracing_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing_stderr();

    let result = match cli.command {
        Commands::Start => cmd::cmd_start(cli.config),
        Commands::Call {
            target,
            action,
            body,
            via,
        } => cmd::cmd_call(cli.config, &target, &action, &body, via.as_deref()),
        Commands::ProxyName { action } => {
            cmd::cmd_proxy_name(&action);
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
