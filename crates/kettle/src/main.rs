//! Kettle Device
//!
//! Loads `device.toml`, starts the runtime and drives the configured
//! processes until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use kettle::config::ConfigLoader;
use kettle::processes::builtin_catalog;
use kettle_runtime::{BrokerNetwork, JsonDirectory, Runtime, Scheduler};

/// Kettle device runtime
#[derive(Parser, Debug)]
#[command(name = "kettle")]
#[command(about = "Kettle device runtime", long_about = None)]
struct Args {
    /// Path to the device file
    #[arg(short, long, default_value = "./device.toml")]
    config: PathBuf,

    /// Override the device bus address
    #[arg(short, long)]
    address: Option<String>,

    /// Override the tick interval in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kettle=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("Starting kettle v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ConfigLoader::load(&args.config)
        .await
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if let Some(address) = args.address {
        config.device.address = address;
    }
    if let Some(tick_ms) = args.tick_ms {
        config.runtime.tick_interval_ms = tick_ms.max(1);
    }

    for peer in &config.peers {
        info!(
            "Known peer: {} ({})",
            peer.address,
            peer.name.as_deref().unwrap_or("unnamed")
        );
    }

    // Peers are only reachable inside this process until a network bus lands
    let network = Arc::new(BrokerNetwork::new());
    let runtime = Runtime::new(&config.device.address, network)
        .context("Failed to connect to the bus")?;

    let settings = Arc::new(JsonDirectory::new(&config.runtime.settings_dir));
    let mut scheduler = Scheduler::new(runtime, builtin_catalog(&config), settings)
        .with_config(config.runtime.scheduler_config());

    let ready = scheduler.load_all(&config.processes).await;
    if ready < config.processes.len() {
        warn!(
            "{} of {} processes failed to load",
            config.processes.len() - ready,
            config.processes.len()
        );
    }
    info!(
        "Device {} running {} processes every {:?}",
        config.device.address,
        ready,
        Duration::from_millis(config.runtime.tick_interval_ms)
    );

    scheduler.run(shutdown_signal()).await;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        },
    }
}
