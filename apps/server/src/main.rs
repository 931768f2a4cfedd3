//! Stinger Server - headless OBS stinger player for live match events.
//!
//! Listens to the match-event relay, plays win/goal/matchup media on every
//! configured OBS instance and serves the operator command socket.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use stinger_core::events::LoggingEventEmitter;
use stinger_core::{bootstrap_services, MatchStatePersistence, NoopMatchStatePersistence};
use tokio::signal;

use crate::config::{ServerConfig, YamlMatchStatePersistence};

/// Stinger Server - plays OBS media on live match events.
#[derive(Parser, Debug)]
#[command(name = "stinger-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML). The selected match is saved back to it.
    #[arg(short, long, value_name = "FILE", env = "STINGER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "STINGER_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Command server port (overrides config file).
    #[arg(short = 'p', long, env = "STINGER_COMMAND_PORT")]
    port: Option<u16>,

    /// Log every event received from the event source.
    #[arg(long)]
    debug_events: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Stinger Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(port) = args.port {
        config.companion_port = port;
    }
    if args.debug_events {
        config.debug_events = true;
    }

    log::info!(
        "Configuration: obs={}:{}, obs2={}, sos={}:{}, companion={}",
        config.obs_host,
        config.obs_port,
        if config.obs2_enabled {
            format!("{}:{}", config.obs2_host, config.obs2_port)
        } else {
            "disabled".into()
        },
        config.sos_host,
        config.sos_port,
        if config.companion_enabled {
            format!("{}:{}", config.companion_host, config.companion_port)
        } else {
            "disabled".into()
        }
    );

    let persistence: Arc<dyn MatchStatePersistence> = match &args.config {
        Some(path) => Arc::new(YamlMatchStatePersistence::new(path)),
        None => {
            log::info!("No config file given - match selection will not persist");
            Arc::new(NoopMatchStatePersistence)
        }
    };

    let services = bootstrap_services(config.to_core_config(), persistence)
        .context("Failed to bootstrap services")?;
    services
        .event_bridge
        .set_external_emitter(Arc::new(LoggingEventEmitter));

    log::info!("Services bootstrapped successfully");

    if let Some(addr) = services
        .start_background_tasks()
        .await
        .context("Failed to start background tasks")?
    {
        log::info!("Command server listening on ws://{}", addr);
    }

    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");
    services.shutdown().await;

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
