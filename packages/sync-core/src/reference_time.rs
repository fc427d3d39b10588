//! Reference-Time Manager (§4.1): the server's authoritative timeline.
//!
//! Rendering position is always `now() - base_time - base_time_offset`.
//! Because pauses and completed tracks accumulate into `base_time_offset`,
//! clients reconstruct the intended presentation time with a single
//! subtraction; no per-pause event log is needed on the wire.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use crate::model::{Playlist, SyncRecord};
use crate::protocol_constants::{DEFAULT_LATENCY_NS, DEFAULT_STREAM_START_DELAY_NS};

/// Everything about the current timeline except `version`, which is kept
/// as a separate atomic so readers can observe it without the record lock.
struct Timeline {
    playlist: Playlist,
    base_time: u64,
    base_time_offset: u64,
    latency: u64,
    stream_start_delay: u64,
    stopped: bool,
    paused: bool,
    last_pause: Option<u64>,
    last_observed_duration_ns: u64,
    transforms: std::collections::HashMap<String, crate::model::VideoTransform>,
}

/// Holds the authoritative timeline. Single mutator (the Media Driver, or
/// whichever component owns `advance_track`/`set_paused`); any number of
/// readers take `snapshot()`.
///
/// Per the concurrency model (§5): the record is held behind a
/// single-writer/many-reader lock; holding time is bounded by one encode.
pub struct ReferenceTimeManager {
    clock_address: IpAddr,
    clock_port: u16,
    version: AtomicU64,
    timeline: RwLock<Timeline>,
}

impl ReferenceTimeManager {
    pub fn new(clock_address: IpAddr, clock_port: u16, playlist: Playlist) -> Self {
        Self {
            clock_address,
            clock_port,
            version: AtomicU64::new(0),
            timeline: RwLock::new(Timeline {
                playlist,
                base_time: now_ns(),
                base_time_offset: 0,
                latency: DEFAULT_LATENCY_NS,
                stream_start_delay: DEFAULT_STREAM_START_DELAY_NS,
                stopped: false,
                paused: false,
                last_pause: None,
                last_observed_duration_ns: 0,
                transforms: std::collections::HashMap::new(),
            }),
        }
    }

    /// Reference-clock read, nanoseconds since `UNIX_EPOCH`.
    pub fn now(&self) -> u64 {
        now_ns()
    }

    /// Sets `base_time := now()` and resets `base_time_offset`, then bumps
    /// the published version.
    pub fn start_track(&self, index: u64) -> u64 {
        let mut tl = self.timeline.write();
        tl.playlist.set_current_track(index);
        tl.base_time = now_ns();
        tl.base_time_offset = 0;
        drop(tl);
        self.bump_version()
    }

    /// Adds the outgoing track's duration (or the observed last duration if
    /// unknown) plus `stream_start_delay` to `base_time_offset`, then
    /// increments the current-track index.
    pub fn advance_track(&self) -> u64 {
        let mut tl = self.timeline.write();
        let outgoing_duration = tl
            .playlist
            .current_track()
            .map(|t| {
                if t.has_known_duration() {
                    t.duration_ns
                } else {
                    tl.last_observed_duration_ns
                }
            })
            .unwrap_or(0);
        tl.base_time_offset = tl
            .base_time_offset
            .saturating_add(outgoing_duration)
            .saturating_add(tl.stream_start_delay);
        tl.playlist.advance();
        drop(tl);
        self.bump_version()
    }

    /// Records the actually-observed duration of the current (live) track,
    /// used by `advance_track` in place of an unknown `duration_ns`.
    pub fn record_observed_duration(&self, duration_ns: u64) {
        self.timeline.write().last_observed_duration_ns = duration_ns;
    }

    /// On entry to paused, records `now()`; on exit, adds the elapsed paused
    /// duration to `base_time_offset`. Preserves
    /// `rendering_position(before) == rendering_position(after)`.
    pub fn set_paused(&self, paused: bool) -> u64 {
        let mut tl = self.timeline.write();
        if paused && !tl.paused {
            tl.last_pause = Some(now_ns());
        } else if !paused && tl.paused {
            if let Some(started) = tl.last_pause.take() {
                let elapsed = now_ns().saturating_sub(started);
                tl.base_time_offset = tl.base_time_offset.saturating_add(elapsed);
            }
        }
        tl.paused = paused;
        drop(tl);
        self.bump_version()
    }

    /// Quiesces media without mutating `base_time`.
    pub fn set_stopped(&self, stopped: bool) -> u64 {
        self.timeline.write().stopped = stopped;
        self.bump_version()
    }

    pub fn set_latency(&self, latency_ns: u64) -> u64 {
        self.timeline.write().latency = latency_ns;
        self.bump_version()
    }

    pub fn set_stream_start_delay(&self, delay_ns: u64) -> u64 {
        self.timeline.write().stream_start_delay = delay_ns;
        self.bump_version()
    }

    pub fn set_transform(&self, client_id: String, transform: crate::model::VideoTransform) -> u64 {
        let mut tl = self.timeline.write();
        if transform.is_empty() {
            tl.transforms.remove(&client_id);
        } else {
            tl.transforms.insert(client_id, transform);
        }
        drop(tl);
        self.bump_version()
    }

    /// Replaces the entire playlist (e.g. at startup). Does not bump the
    /// version on its own when called before the first publish.
    pub fn set_playlist(&self, playlist: Playlist) -> u64 {
        self.timeline.write().playlist = playlist;
        self.bump_version()
    }

    /// Returns an immutable copy of the current record.
    pub fn snapshot(&self) -> SyncRecord {
        let tl = self.timeline.read();
        SyncRecord {
            version: self.version.load(Ordering::Acquire),
            clock_address: self.clock_address,
            clock_port: self.clock_port,
            playlist: tl.playlist.clone(),
            base_time: tl.base_time,
            base_time_offset: tl.base_time_offset,
            latency: tl.latency,
            stream_start_delay: tl.stream_start_delay,
            stopped: tl.stopped,
            paused: tl.paused,
            transforms: tl.transforms.clone(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn bump_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as u64
}
