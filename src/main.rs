//! waypoint-match server
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                    WAYPOINT MATCH                     │
//!                      │                                                       │
//!   Client ───────────▶│  listener → auth → client session ──┐                 │
//!                      │                                     ▼                 │
//!                      │                              ┌──────────────┐         │
//!                      │                              │route registry│         │
//!                      │                              └──────┬───────┘         │
//!                      │                                     ▼                 │
//!   Driver ───────────▶│  listener → auth → driver session → matching engine   │
//!                      │                                     │                 │
//!   Client ◀───────────┼──────────────── offer / abort ◀─────┘                 │
//!                      │                                                       │
//!   Admin ────────────▶│  listener → auth → admin session → stats snapshot     │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use waypoint_match::config::load_or_default;
use waypoint_match::lifecycle::{shutdown_signal, Shutdown};
use waypoint_match::observability::{logging, metrics};
use waypoint_match::MatchServer;

#[derive(Parser)]
#[command(name = "waypoint-match")]
#[command(about = "Real-time route matching service", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_or_default(cli.config.as_deref())?;

    logging::init_tracing(&config.observability.log_level);
    tracing::info!("waypoint-match v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        client_address = %config.listener.client_address,
        driver_address = %config.listener.driver_address,
        admin_address = %config.listener.admin_address,
        max_clients = config.limits.max_clients,
        max_drivers = config.limits.max_drivers,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = MatchServer::bind(&config).await?;
    let shutdown = Shutdown::new();

    let run = server.run(shutdown.subscribe());
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => result?,
        _ = shutdown_signal() => {
            shutdown.trigger();
            run.await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
