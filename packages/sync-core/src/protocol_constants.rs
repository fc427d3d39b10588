//! Fixed protocol constants that should NOT be changed.
//!
//! These values are part of the wire contract between server and client;
//! changing them is a breaking protocol change.

/// Maximum drift, in milliseconds, between a client's current rendering
/// position and the intended position that the catch-up engine tolerates
/// without issuing a seek.
pub const SEEK_TOLERANCE_MS: u64 = 200;

/// Upper bound, in seconds, on waiting for the clock provider to report
/// `synchronised = true` before the engine surfaces a `ClockError`.
pub const CLOCK_SYNC_TIMEOUT_SECS: u64 = 10;

/// Sentinel duration (nanoseconds) meaning "unknown" / "not seekable".
pub const DURATION_UNKNOWN_NS: u64 = u64::MAX;

/// Sentinel current-track index meaning "played past the end of the
/// playlist".
pub const TRACK_INDEX_PAST_END: u64 = u64::MAX;

/// Capacity of the version-notify broadcast channel used by the dispatcher
/// to wake per-connection control-channel workers.
pub const VERSION_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the domain-event broadcast channel (`client-joined`,
/// `client-left`, `end-of-stream`, `end-of-playlist`).
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Default latency, in nanoseconds, a client's pipeline is asked to apply.
pub const DEFAULT_LATENCY_NS: u64 = 0;

/// Default delay, in nanoseconds, inserted between consecutive tracks.
pub const DEFAULT_STREAM_START_DELAY_NS: u64 = 0;
