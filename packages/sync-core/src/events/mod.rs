//! Domain events emitted by the server as clients come and go and as the
//! media driver reaches end-of-stream/end-of-playlist (§4.2, §4.4).

pub mod bridge;
pub mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::EventEmitter;

use serde::{Deserialize, Serialize};

/// A domain-level event, independent of the transport that carries the
/// corresponding `SyncRecord` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SyncEvent {
    /// A client completed the join handshake and was registered.
    ClientJoined { client_id: String },
    /// A client's connection ended (peer close, error, or server stop).
    ClientLeft { client_id: String },
    /// The media driver's probe pipeline reached end-of-stream for the
    /// current track.
    EndOfStream { track_uri: String },
    /// The media driver observed end-of-stream on the last playlist entry;
    /// the current-track index is now "past end".
    EndOfPlaylist,
}
