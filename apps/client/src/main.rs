//! Sync Client - standalone client for the synchronised media playback
//! service.
//!
//! Connects to a server's control channel, disciplines a local clock to
//! the server's and drives the catch-up engine against a pipeline
//! implementation. Ships with [`sync_core::NullLocalPipeline`], a no-op
//! pipeline suitable for exercising synchronisation logic without an
//! actual decoder attached.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sync_core::{
    CatchUpEngine, ClientSession, ConfigValue, ControlChannelClient, NullLocalPipeline,
    SystemClock, TcpControlClient,
};
use tokio::signal;
use tokio::sync::mpsc;

/// Synchronised media playback client.
#[derive(Parser, Debug)]
#[command(name = "sync-client")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Control-channel server address to connect to.
    #[arg(short = 's', long, env = "SYNC_SERVER_ADDR")]
    server_addr: SocketAddr,

    /// This client's id, sent in the join descriptor. Duplicate ids across
    /// clients are permitted by the server.
    #[arg(short = 'i', long, env = "SYNC_CLIENT_ID")]
    client_id: String,

    /// Free-form `key=value` configuration entries sent in the join
    /// descriptor's config map. May be repeated.
    #[arg(long = "config", value_parser = parse_config_entry)]
    config: Vec<(String, ConfigValue)>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SYNC_LOG_LEVEL")]
    log_level: log::LevelFilter,
}

/// Parses a `key=value` CLI entry into a `(String, ConfigValue)` pair,
/// inferring bool/number/string in that order.
fn parse_config_entry(raw: &str) -> Result<(String, ConfigValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let value = if let Ok(b) = value.parse::<bool>() {
        ConfigValue::Bool(b)
    } else if let Ok(n) = value.parse::<f64>() {
        ConfigValue::Number(n)
    } else {
        ConfigValue::String(value.to_string())
    };
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Sync Client v{}", env!("CARGO_PKG_VERSION"));
    log::info!(
        "Connecting to {} as client id {}",
        args.server_addr,
        args.client_id
    );

    let session = ClientSession {
        id: args.client_id,
        config: args.config.into_iter().collect::<HashMap<_, _>>(),
    };

    let client = Arc::new(TcpControlClient::new(args.server_addr, session.clone()));
    let engine = Arc::new(CatchUpEngine::new(
        session.id.clone(),
        Arc::new(SystemClock),
        Arc::new(NullLocalPipeline),
    ));

    engine
        .wait_for_clock_sync()
        .await
        .context("Local clock never synchronised")?;

    let (record_tx, mut record_rx) = mpsc::channel(16);
    let client_for_task = Arc::clone(&client);
    let client_task = tokio::spawn(async move { client_for_task.start(record_tx).await });

    let engine_for_records = Arc::clone(&engine);
    let record_task = tokio::spawn(async move {
        while let Some(record) = record_rx.recv().await {
            log::info!(
                "[Client] record v{}: track={} base_time={} offset={} paused={} stopped={}",
                record.version,
                record.playlist.current_track_index(),
                record.base_time,
                record.base_time_offset,
                record.paused,
                record.stopped
            );
            if let Err(e) = engine_for_records.on_record(record).await {
                log::error!("[Client] failed to apply record: {}", e);
                continue;
            }
            // The null pipeline never reports its own state transitions, so
            // drive the catch-up engine's post-build step directly.
            if let Err(e) = engine_for_records.on_pipeline_reached_playing().await {
                log::error!("[Client] catch-up step failed: {}", e);
            }
        }
    });

    shutdown_signal().await;
    log::info!("Shutdown signal received, cleaning up...");

    client.stop().await;
    let _ = client_task.await;
    record_task.abort();

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
