//! Minimal keep-alive HTTP/1.1 server.
//!
//! Parses requests straight off the socket, serves pages and uploaded media
//! from disk, and keeps connections open between requests.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────┐
//!                  │                       SERVER                         │
//!   Client         │  ┌─────────┐   ┌──────────┐   ┌──────────────────┐   │
//!   ──────────────┼─▶│   net   │──▶│ security │──▶│  http::server    │   │
//!                  │  │listener │   │ registry │   │ keep-alive loop  │   │
//!                  │  └─────────┘   └──────────┘   └────────┬─────────┘   │
//!                  │                                        │             │
//!                  │                 ┌──────────────┐       ▼             │
//!                  │                 │ http::request│◀── parse / decode   │
//!                  │                 └──────────────┘       │             │
//!                  │  ┌──────────┐   ┌───────────────┐      ▼             │
//!   ◀─────────────┼──│  cache   │◀─▶│ http::response│◀─▶ resolver       │
//!                  │  │  (CLOCK) │   └───────────────┘                    │
//!                  │  └──────────┘            │                           │
//!                  │                          ▼                           │
//!                  │                   observability (access log,         │
//!                  │                   tracing, metrics)                  │
//!                  └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use keepalive_server::config::load_config;
use keepalive_server::lifecycle::{start, Shutdown};
use keepalive_server::observability::logging;

#[derive(Parser)]
#[command(name = "keepalive-server")]
#[command(about = "Minimal keep-alive HTTP/1.1 server", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the configured log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    logging::init(level);

    tracing::info!(
        bind_address = %config.server.bind_address(),
        connections_limit = config.server.connections_limit,
        client_connections_limit = config.server.client_connections_limit,
        keep_alive = config.server.keep_alive,
        cache_size = config.server.server_cash_size,
        "Configuration loaded"
    );

    let (server, listener) = match start(&config).await {
        Ok(parts) => parts,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "Listening for connections");
    }

    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();

    if let Err(e) = server.run(listener, shutdown.subscribe()).await {
        tracing::error!(error = %e, "Server stopped unexpectedly");
        return ExitCode::FAILURE;
    }

    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}
