//! Sync Server - standalone server for the synchronised media playback
//! service.
//!
//! Bootstraps the Reference-Time Manager, Client Registry, Dispatcher and
//! Control-Channel Server, serves a playlist loaded from disk, and shuts
//! down gracefully on Ctrl+C/SIGTERM.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sync_core::{bootstrap_server, playlist_file, ControlChannelServer, NullMediaDriver, Playlist};
use tokio::signal;

use crate::config::ServerConfig;

/// Synchronised media playback server.
#[derive(Parser, Debug)]
#[command(name = "sync-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SYNC_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Control-channel bind address (overrides config file).
    #[arg(short = 'b', long, env = "SYNC_BIND_ADDR")]
    bind_addr: Option<std::net::SocketAddr>,

    /// Reference clock port advertised to clients (overrides config file).
    #[arg(short = 'c', long, env = "SYNC_CLOCK_PORT")]
    clock_port: Option<u16>,

    /// Playlist text file to seed the initial playlist with
    /// (`URI DURATION_NS` per line, `-1` for unknown duration).
    #[arg(short = 'P', long, value_name = "FILE", env = "SYNC_PLAYLIST")]
    playlist: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Sync Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(bind_addr) = args.bind_addr {
        config.bind_addr = bind_addr;
    }
    if let Some(clock_port) = args.clock_port {
        config.clock_port = clock_port;
    }
    if let Some(playlist_path) = args.playlist {
        config.playlist_path = Some(playlist_path);
    }

    log::info!(
        "Configuration: bind_addr={}, clock_port={}",
        config.bind_addr,
        config.clock_port
    );

    let playlist = match &config.playlist_path {
        Some(path) => {
            log::info!("Loading playlist from {}", path.display());
            playlist_file::load_from_path(path)?
        }
        None => {
            log::info!("No playlist configured, starting with an empty playlist");
            Playlist::empty()
        }
    };

    let server = bootstrap_server(
        config.bind_addr,
        config.clock_port,
        playlist,
        Arc::new(NullMediaDriver),
    )
    .context("Failed to bootstrap server")?;

    server.reference_time.set_latency(config.latency_ns);
    server
        .reference_time
        .set_stream_start_delay(config.stream_start_delay_ns);

    Arc::clone(&server.control_server)
        .start()
        .await
        .context("Failed to start control-channel server")?;

    log::info!("Listening on {}", config.bind_addr);

    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");
    server.shutdown().await;
    log::info!("Shutdown complete");

    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
