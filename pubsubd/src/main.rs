//! `pubsubd`: loads a [`pubsub_config::ServiceConfig`] and runs its
//! Connections through the publish/subscribe tick loop (spec.md §5, §8).
//!
//! Key provisioning against a remote SKS node (§4.E) requires an encrypted
//! OPC-UA Client session, which sits outside this crate's scope the same
//! way node management does (`pubsub_core::NodeStore`): wiring a concrete
//! [`pubsub_sks::SksTransport`] is left to whatever embeds this binary in a
//! full OPC-UA stack. `pubsubd` on its own runs SecurityGroups that already
//! have keys loaded (e.g. via a config-provided initial key).

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use pubsub_config::ServiceConfig;
use pubsub_core::{InMemoryNodeStore, PubSubManager};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pubsubd", about = "OPC-UA PubSub service process")]
struct Cli {
    /// Path to a TOML or YAML ServiceConfig file. Without one, runs the
    /// minimal unsecured UDP publisher from spec.md §8 Scenario 1.
    #[arg(long)]
    config: Option<PathBuf>,

    /// How often to run a tick across all connections, in milliseconds.
    #[arg(long, default_value_t = 100)]
    tick_interval_ms: u64,
}

fn load_config(cli: &Cli) -> anyhow::Result<ServiceConfig> {
    let config = match &cli.config {
        Some(path) if path.extension().and_then(|e| e.to_str()) == Some("yaml") => {
            ServiceConfig::from_yaml_file(path)?
        }
        Some(path) => ServiceConfig::from_toml_file(path)?,
        None => ServiceConfig::udp_minimal_publisher_defaults(),
    };
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(&config.logging.filter))
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(&config.logging.filter))
            .init();
    }

    let node_store = InMemoryNodeStore::new();
    let mut manager = PubSubManager::new();
    manager.load_service_config(&config).await?;
    manager.start();

    info!(
        connections = manager.connections.len(),
        "pubsubd started, enabling connections"
    );
    for conn in &mut manager.connections {
        if let Err(e) = conn.enable().await {
            warn!(connection = %conn.name, error = %e, "connection failed to enable at startup");
        }
    }

    let tick_interval = Duration::from_millis(cli.tick_interval_ms);
    let mut ticker = tokio::time::interval(tick_interval);
    let receive_timeout = Duration::from_millis(cli.tick_interval_ms.min(50));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                manager.tick_all(&node_store, receive_timeout).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    manager.stop().await;
    Ok(())
}
