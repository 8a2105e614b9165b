//! The node binary: load a TOML node descriptor, build every module it
//! names through the registered `ModuleFactory`s, spawn one poller task
//! per module, and accept SECoP client connections on a TCP listener
//! until `ctrl_c` requests a cooperative shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;

use frappy_demo::{SensorFactory, TemperatureLoopFactory};
use frappy_node::{build_node, load, resolve_config_path, run, FactoryRegistry};

/// SECoP device-server node.
#[derive(Parser, Debug)]
#[command(name = "frappy-node", version, about)]
struct Cli {
    /// Path to the node descriptor (TOML). Defaults to
    /// `$FRAPPY_CONFDIR/node.toml`, falling back to `./node.toml`.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn default_factories() -> FactoryRegistry {
    let mut registry = FactoryRegistry::new();
    registry.register(Arc::new(TemperatureLoopFactory));
    registry.register(Arc::new(SensorFactory));
    registry
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let node_config = load(&config_path)?;
    tracing::info!(equipment_id = %node_config.equipment_id, path = %config_path.display(), "loaded node descriptor");

    let factories = default_factories();
    let node = build_node(&node_config, &factories)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    run(node, shutdown_rx).await?;
    Ok(())
}
