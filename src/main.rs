//! CTMA Client Binary Entry Point
//!
//! Connects to the configured collector and reports process telemetry until
//! interrupted. Core functionality is provided by the `ctma_client` library crate.

use std::time::Duration;

use clap::Parser;
use ctma_client::config::parse_duration;
use ctma_client::{Client, ClientConfig, ProcessTelemetry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CTMA Client - collector telemetry reporter
#[derive(Parser, Debug)]
#[command(name = "ctma-client", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/config.yaml", env = "CTMA_CONFIG")]
    config: String,

    /// Collector host (overrides config file)
    #[arg(long, env = "CTMA_HOST")]
    host: Option<String>,

    /// Collector port (overrides config file)
    #[arg(long, env = "CTMA_PORT")]
    port: Option<u16>,

    /// Liveness timer period, e.g. "1s" (overrides config file)
    #[arg(long, value_parser = parse_duration)]
    heartbeat: Option<Duration>,

    /// Report interval, e.g. "5s" (overrides config file)
    #[arg(long, value_parser = parse_duration)]
    report_interval: Option<Duration>,

    /// Verbose logging of collector traffic
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Validation happens once, in Client::new, after overrides are applied
    let mut config = ClientConfig::read(&cli.config)?;
    apply_overrides(&mut config, &cli);

    let default_filter = if config.debug {
        "info,ctma_client=debug"
    } else {
        "info,ctma_client=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Loaded configuration from: {}", cli.config);

    let client = match Client::new(config, ProcessTelemetry::new()) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Check your config!");
            return Err(e.into());
        }
    };
    client.connect().await?;

    tracing::info!("Press Ctrl+C to shutdown");
    shutdown_signal().await;

    client.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Apply CLI/env overrides (CLI > ENV > config file).
fn apply_overrides(config: &mut ClientConfig, cli: &Cli) {
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(heartbeat) = cli.heartbeat {
        config.heartbeat = heartbeat;
    }
    if let Some(interval) = cli.report_interval {
        config.report_interval = interval;
    }
    config.debug |= cli.debug;
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
