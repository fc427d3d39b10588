//! sync-core - shared library for the synchronised media playback service.
//!
//! This crate provides the core, transport- and media-library-agnostic
//! logic shared by the server and the client:
//!
//! - [`reference_time`]: the server's authoritative timeline
//! - [`registry`]: tracks joined clients
//! - [`dispatcher`]: fans version-change notifications out to workers
//! - [`control_server`] / [`control_client`]: pluggable control-channel
//!   transport (default: framed TCP)
//! - [`media_driver`]: the server-side probe pipeline contract
//! - [`model`] / [`wire`]: the `SyncRecord`/`Playlist` data model and its
//!   on-the-wire JSON shape
//! - [`transform`]: crop → rotate → scale → box stage ordering
//! - [`bootstrap`]: server-side composition root
//! - [`error`]: centralized error types
//!
//! # Abstraction traits
//!
//! - [`runtime::TaskSpawner`]: spawning background tasks
//! - [`events::EventEmitter`]: emitting domain events
//! - [`control_server::ControlChannelServer`] /
//!   [`control_client::ControlChannelClient`]: pluggable transport
//! - [`media_driver::MediaDriver`]: the server-side decoder pipeline
//! - [`catch_up::LocalPipeline`]: the client-side decoder pipeline

#![warn(clippy::all)]

pub mod bootstrap;
pub mod catch_up;
pub mod control_client;
pub mod control_server;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod framing;
pub mod media_driver;
pub mod model;
pub mod playlist_file;
pub mod protocol_constants;
pub mod reference_time;
pub mod registry;
pub mod runtime;
pub mod transform;
pub mod wire;

pub use bootstrap::{bootstrap_server, BootstrappedServer};
pub use catch_up::{CatchUpEngine, LocalPipeline, NetworkClock, NullLocalPipeline, SystemClock};
pub use control_client::{ControlChannelClient, TcpControlClient};
pub use control_server::{ControlChannelServer, TcpControlServer};
pub use dispatcher::Dispatcher;
pub use error::{ErrorCode, SyncError, SyncResult};
pub use events::{BroadcastEventBridge, EventEmitter, SyncEvent};
pub use media_driver::{DriverState, MediaDriver, NullMediaDriver};
pub use model::{
    ClientSession, ConfigValue, LocalPipelineState, Playlist, SeekState, SyncRecord, Track,
    VideoTransform,
};
pub use reference_time::ReferenceTimeManager;
pub use registry::{ClientGuard, ClientRegistry};
pub use runtime::{TaskSpawner, TokioSpawner};
