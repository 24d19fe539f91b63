//! Failover dispatcher service.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │              FAILOVER DISPATCHER             │
//!   Client Request       │  ┌────────┐    ┌────────────┐    ┌────────┐  │
//!   ─────────────────────┼─▶│  http  │───▶│ dispatcher │───▶│breaker │  │
//!                        │  │ server │    └─────┬──────┘    └───▲────┘  │
//!                        │  └────────┘          │               │       │
//!                        │            admitted  │  denied       │       │
//!                        │              ┌───────┴───────┐       │       │
//!                        │              ▼               ▼       │       │
//!                        │         ┌─────────┐    ┌──────────┐  │       │──▶ Primary
//!                        │         │ primary │    │secondary │  │       │──▶ Secondary
//!                        │         └─────────┘    └──────────┘  │       │
//!                        │  ┌──────────────────┐                │       │
//!                        │  │ recovery prober  │── force_close ─┘       │
//!                        │  └──────────────────┘                        │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use failover_dispatcher::config::{load_config, DispatcherConfig};
use failover_dispatcher::lifecycle::signals::wait_for_signal;
use failover_dispatcher::observability::{logging, metrics};
use failover_dispatcher::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "failover-dispatcher")]
#[command(about = "Primary/secondary dispatcher with circuit breaking", long_about = None)]
struct Args {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => DispatcherConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("failover-dispatcher v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        primary = %config.primary.name,
        secondary = %config.secondary.name,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_shutdown.trigger();
    });

    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
