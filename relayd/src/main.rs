//! StatNerd Relay - local daemon
//!
//! Serves the loopback HTTP API the browser UI calls to update the Grocy
//! add-on in place.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use relay_common::{ProcessRunner, load_config};
use relayd::RelayServer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Parser)]
#[command(name = "relayd")]
#[command(
    author,
    version,
    about = "StatNerd relay - runs the Grocy add-on updater for the browser UI"
)]
struct Cli {
    /// Port to listen on (1024-65535)
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1024..))]
    port: Option<u16>,

    /// Path to relay configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Update script timeout, e.g. "20m" or "90s"
    #[arg(short, long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,
}

fn init_logging(cli: &Cli) {
    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    match cli.log_format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    info!("Starting StatNerd relay...");

    let loaded = load_config(cli.config.as_deref())
        .context("Failed to load relay configuration")?
        .with_cli_port(cli.port)
        .with_cli_timeout(cli.timeout);
    let config = loaded.config();
    config.validate().context("Invalid relay configuration")?;
    info!("Configuration: {}", loaded.describe());

    let runner = Arc::new(ProcessRunner::new(config.output_limit_bytes));
    let mut server = RelayServer::start(&config, runner)
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;

    let exited = tokio::select! {
        result = server.wait() => Some(result),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            None
        }
    };

    match exited {
        Some(result) => {
            result.context("Relay server exited")?;
            warn!("Relay server exited unexpectedly");
        }
        None => {
            info!("Received Ctrl-C, shutting down");
            server.stop().await;
        }
    }

    Ok(())
}
