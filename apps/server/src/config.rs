//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides,
//! layered `file < env < CLI` as in [`crate::Args`].

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the control-channel listener to.
    /// Override: `SYNC_BIND_ADDR`
    pub bind_addr: SocketAddr,

    /// Port the reference clock is reachable on (advertised in every
    /// `SyncRecord`, §3).
    /// Override: `SYNC_CLOCK_PORT`
    pub clock_port: u16,

    /// Nanoseconds of pipeline slack every client must apply.
    /// Override: `SYNC_LATENCY_MS` (milliseconds on the wire, stored here
    /// in nanoseconds after conversion).
    pub latency_ns: u64,

    /// Nanoseconds inserted between consecutive tracks.
    /// Override: `SYNC_STREAM_START_DELAY_MS`
    pub stream_start_delay_ns: u64,

    /// Path to the playlist text file (§6) to seed the initial playlist
    /// with. `None` starts with an empty playlist.
    pub playlist_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7070".parse().unwrap(),
            clock_port: 7071,
            latency_ns: 0,
            stream_start_delay_ns: 0,
            playlist_path: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment
    /// overrides, then validates.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("SYNC_BIND_ADDR") {
            self.bind_addr = val
                .parse()
                .with_context(|| format!("Invalid SYNC_BIND_ADDR: {val}"))?;
        }
        if let Ok(val) = std::env::var("SYNC_CLOCK_PORT") {
            self.clock_port = val
                .parse()
                .with_context(|| format!("Invalid SYNC_CLOCK_PORT: {val}"))?;
        }
        if let Ok(val) = std::env::var("SYNC_LATENCY_MS") {
            let ms: u64 = val
                .parse()
                .with_context(|| format!("Invalid SYNC_LATENCY_MS: {val}"))?;
            self.latency_ns = ms * 1_000_000;
        }
        if let Ok(val) = std::env::var("SYNC_STREAM_START_DELAY_MS") {
            let ms: u64 = val
                .parse()
                .with_context(|| format!("Invalid SYNC_STREAM_START_DELAY_MS: {val}"))?;
            self.stream_start_delay_ns = ms * 1_000_000;
        }
        Ok(())
    }

    /// Rejects configurations that would produce a nonsensical timeline.
    fn validate(&self) -> Result<()> {
        if self.clock_port == 0 {
            anyhow::bail!("clock_port must be nonzero");
        }
        Ok(())
    }
}
