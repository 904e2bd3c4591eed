//! devgate
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                      DEVGATE                          │
//!                      │                                                       │
//!   Client Request     │  ┌────────┐   ┌────────────┐   ┌──────────────────┐   │
//!   ───────────────────┼─▶│  http  │──▶│  routing   │──▶│      cache       │   │
//!                      │  │ server │   │ resolve +  │   │  check (generic) │   │
//!                      │  └────────┘   │ classify   │   └────────┬─────────┘   │
//!                      │               └────────────┘            │ miss        │
//!                      │                                         ▼             │
//!                      │                ┌──────────┐    ┌──────────────────┐   │
//!                      │                │ registry │◀──▶│     upstream     │───┼──▶ Upstream
//!                      │                │  tokens  │    │ orchestrator     │   │
//!                      │                └──────────┘    └────────┬─────────┘   │
//!                      │                                         ▼             │
//!   Client Response    │  ┌────────┐   ┌────────────┐   ┌──────────────────┐   │
//!   ◀──────────────────┼──│response│◀──│  rewrite   │◀──│ deferred cache   │   │
//!                      │  └────────┘   └────────────┘   │ write            │   │
//!                      │                                └──────────────────┘   │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use devgate::config::resolve_config;
use devgate::lifecycle::{spawn_signal_handler, Shutdown};
use devgate::observability::{init_logging, init_metrics};
use devgate::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "devgate", version, about = "Developer upstream accelerator")]
struct Cli {
    /// Path to a TOML config file; built-in defaults are used when omitted.
    #[arg(short, long, env = "DEVGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = resolve_config(cli.config.as_deref(), cli.bind)?;

    init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "devgate starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        platforms = config.platforms.len(),
        max_retries = config.upstream.max_retries,
        timeout_secs = config.upstream.timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => init_metrics(addr)?,
            Err(err) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %err,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    let signals = spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown_rx).await?;

    signals.abort();
    tracing::info!("Shutdown complete");
    Ok(())
}
