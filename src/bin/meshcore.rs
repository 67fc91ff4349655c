//! meshcore daemon binary
//!
//! Loads configuration, assembles the node and runs its event loop until
//! interrupted. Without an attached switch fabric, tunnel adapter or pinger the
//! outbound queues are drained and logged.

use clap::Parser;
use meshcore::interface::MessageRx;
use meshcore::{Config, Node};
use std::path::PathBuf;
use tracing::{error, info, trace, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// meshcore mesh node daemon
#[derive(Parser, Debug)]
#[command(name = "meshcore", version, about)]
struct Args {
    /// Path to configuration file (overrides default search paths)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn drain(name: &'static str, mut rx: MessageRx) {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            trace!(interface = name, len = msg.len(), "Outbound message discarded");
        }
    });
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    info!("meshcore starting");

    let (config, loaded_paths) = if let Some(config_path) = &args.config {
        match Config::load_file(config_path) {
            Ok(config) => (config, vec![config_path.clone()]),
            Err(e) => {
                error!("Failed to load configuration from {}: {}", config_path.display(), e);
                std::process::exit(1);
            }
        }
    } else {
        match Config::load() {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        }
    };

    if loaded_paths.is_empty() {
        info!("No config files found, using defaults");
    } else {
        for path in &loaded_paths {
            info!(path = %path.display(), "Loaded config file");
        }
    }

    if config.has_identity() {
        info!("Using configured identity");
    } else {
        warn!("No identity configured, generating ephemeral keypair");
    }

    let (mut node, endpoints) = match Node::new(config) {
        Ok(created) => created,
        Err(e) => {
            error!("Failed to create node: {}", e);
            std::process::exit(1);
        }
    };

    info!("  npub: {}", node.npub());
    info!("  address: {}", node.address().ipv6());

    drain("switch", endpoints.switch);
    drain("tunnel", endpoints.tunnel);
    drain("control", endpoints.control);
    drain("pinger", endpoints.pinger);
    let mut queries = endpoints.queries;
    tokio::spawn(async move {
        while let Some((to, data)) = queries.recv().await {
            trace!(to = %to, len = data.len(), "Discovery message discarded");
        }
    });
    // Held so the event loop keeps running until interrupted.
    let _events = endpoints.events;

    info!("meshcore running, press Ctrl+C to exit");

    tokio::select! {
        result = node.run() => {
            if let Err(e) = result {
                error!("Event loop failed: {}", e);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
        }
    }

    info!("meshcore shutdown complete");
}
