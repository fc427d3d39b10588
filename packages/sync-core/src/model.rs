//! Core data model shared by the server and the client: [`SyncRecord`],
//! [`Playlist`], [`ClientSession`] and the client-side [`LocalPipelineState`].

use std::collections::HashMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{DURATION_UNKNOWN_NS, TRACK_INDEX_PAST_END};

/// A single playlist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub uri: String,
    /// Duration in nanoseconds, or [`DURATION_UNKNOWN_NS`] for "unknown"
    /// (live, non-seekable sources).
    pub duration_ns: u64,
}

impl Track {
    pub fn new(uri: impl Into<String>, duration_ns: u64) -> Self {
        Self {
            uri: uri.into(),
            duration_ns,
        }
    }

    /// Whether this track's duration is known (i.e. not live).
    pub fn has_known_duration(&self) -> bool {
        self.duration_ns != DURATION_UNKNOWN_NS
    }
}

/// Ordered sequence of tracks plus a current-track index.
///
/// Mutating an entry that is not the current track does not affect ongoing
/// playback; changing the current-track index triggers a retune (handled by
/// the caller, not by this type).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    tracks: Vec<Track>,
    /// [`TRACK_INDEX_PAST_END`] denotes "played past the end".
    current_track: u64,
}

impl Playlist {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self {
            tracks,
            current_track: 0,
        }
    }

    pub fn empty() -> Self {
        Self {
            tracks: Vec::new(),
            current_track: TRACK_INDEX_PAST_END,
        }
    }

    pub fn get_tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn current_track_index(&self) -> u64 {
        self.current_track
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.tracks.get(self.current_track as usize)
    }

    pub fn is_past_end(&self) -> bool {
        self.current_track == TRACK_INDEX_PAST_END
            || self.current_track as usize >= self.tracks.len()
    }

    pub fn set_current_track(&mut self, index: u64) {
        self.current_track = index;
    }

    /// Moves to the next track; if the outgoing track was the last one the
    /// playlist becomes "past end" rather than wrapping.
    pub fn advance(&mut self) {
        if self.is_past_end() {
            return;
        }
        let next = self.current_track + 1;
        if next as usize >= self.tracks.len() {
            self.current_track = TRACK_INDEX_PAST_END;
        } else {
            self.current_track = next;
        }
    }
}

/// One stage of the crop → rotate → scale → box transform pipeline.
/// Absent stages are skipped entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoTransform {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropTransform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotate: Option<RotateTransform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<ScaleTransform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<BoxTransform>,
}

impl VideoTransform {
    /// Whether every stage is absent, i.e. no sub-pipeline is required.
    pub fn is_empty(&self) -> bool {
        self.crop.is_none() && self.rotate.is_none() && self.scale.is_none() && self.offset.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropTransform {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotateTransform {
    pub degrees: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleTransform {
    pub width: u32,
    pub height: u32,
}

/// Letterbox/pillarbox via negative insets (negative = padding added).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxTransform {
    pub top: i32,
    pub bottom: i32,
    pub left: i32,
    pub right: i32,
}

/// A free-form configuration value carried in a join descriptor's `config`
/// map. The wire schema leaves this as "variant"; this is the smallest
/// faithful encoding of that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Number(f64),
    String(String),
}

/// The single record distributed from server to clients.
///
/// Invariants (enforced by [`crate::reference_time::ReferenceTimeManager`],
/// not by this type): `version` strictly increases; if `stopped` then
/// clients must not render; if `paused` then `base_time_offset` does not
/// advance with wall time; `base_time + base_time_offset` equals the
/// reference-clock instant corresponding to rendering position 0 of the
/// current track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub version: u64,
    pub clock_address: IpAddr,
    pub clock_port: u16,
    pub playlist: Playlist,
    /// Reference-clock instant, in nanoseconds, at which the current
    /// playlist entry was started.
    pub base_time: u64,
    /// Nanoseconds accumulated by pauses and by completed tracks of the
    /// current playlist traversal.
    pub base_time_offset: u64,
    /// Nanoseconds of pipeline slack each client must apply.
    pub latency: u64,
    /// Nanoseconds inserted between consecutive tracks.
    pub stream_start_delay: u64,
    pub stopped: bool,
    pub paused: bool,
    /// Per-client video transform, keyed by client id.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub transforms: HashMap<String, VideoTransform>,
}

impl SyncRecord {
    /// Rendering position at `now`, per the single-subtraction rule: no
    /// per-pause event log is needed on the wire because pauses accumulate
    /// into `base_time_offset`.
    pub fn rendering_position(&self, now_ns: u64) -> i64 {
        now_ns as i64 - self.base_time as i64 - self.base_time_offset as i64
    }
}

/// Per-connection state held by the server for a joined client.
///
/// Clients with duplicate `id`s are not rejected: the registry retains all
/// and emits them independently to subscribers of join events. The
/// connection-unique key used internally to store this is assigned by the
/// registry, not carried in this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSession {
    pub id: String,
    #[serde(default)]
    pub config: HashMap<String, ConfigValue>,
}

/// Catch-up engine seek state (client side). Treated as atomic on the
/// client so the pipeline bus handler can inspect it without locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SeekState {
    NeedSeek = 0,
    InSeek = 1,
    DoneSeek = 2,
}

impl SeekState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::NeedSeek,
            1 => Self::InSeek,
            _ => Self::DoneSeek,
        }
    }
}

/// Client-side pipeline state guarded per the concurrency model: the record
/// is behind a mutex, `seek_state` is atomic (see
/// [`crate::protocol_constants`] for timing constants).
#[derive(Debug, Clone)]
pub struct LocalPipelineState {
    pub seek_offset_ns: u64,
    pub last_duration_ns: u64,
    pub clock_synchronised: bool,
    pub current_record: Option<SyncRecord>,
}

impl Default for LocalPipelineState {
    fn default() -> Self {
        Self {
            seek_offset_ns: 0,
            last_duration_ns: DURATION_UNKNOWN_NS,
            clock_synchronised: false,
            current_record: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playlist_advance_past_end() {
        let mut pl = Playlist::new(vec![Track::new("a", 1), Track::new("b", 2)]);
        assert_eq!(pl.current_track_index(), 0);
        pl.advance();
        assert_eq!(pl.current_track_index(), 1);
        pl.advance();
        assert!(pl.is_past_end());
    }

    #[test]
    fn playlist_round_trip() {
        let pl = Playlist::new(vec![Track::new("a", 10), Track::new("b", DURATION_UNKNOWN_NS)]);
        let json = serde_json::to_string(&pl).unwrap();
        let decoded: Playlist = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.get_tracks(), pl.get_tracks());
        assert_eq!(decoded.current_track_index(), pl.current_track_index());
    }

    #[test]
    fn sync_record_round_trip() {
        let record = SyncRecord {
            version: 1,
            clock_address: "127.0.0.1".parse().unwrap(),
            clock_port: 1234,
            playlist: Playlist::new(vec![Track::new("a", 10)]),
            base_time: 100,
            base_time_offset: 0,
            latency: 0,
            stream_start_delay: 0,
            stopped: false,
            paused: false,
            transforms: HashMap::new(),
        };
        let json = serde_json::to_string(&record).unwrap();
        let decoded: SyncRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn rendering_position_subtracts_offset() {
        let record = SyncRecord {
            version: 1,
            clock_address: "127.0.0.1".parse().unwrap(),
            clock_port: 1234,
            playlist: Playlist::empty(),
            base_time: 1_000,
            base_time_offset: 500,
            latency: 0,
            stream_start_delay: 0,
            stopped: false,
            paused: false,
            transforms: HashMap::new(),
        };
        assert_eq!(record.rendering_position(2_000), 500);
    }

    #[test]
    fn video_transform_empty_when_no_stages() {
        assert!(VideoTransform::default().is_empty());
        let t = VideoTransform {
            scale: Some(ScaleTransform { width: 1280, height: 720 }),
            ..Default::default()
        };
        assert!(!t.is_empty());
    }
}
