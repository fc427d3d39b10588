//! On-the-wire JSON shapes (§6). These differ from the in-memory
//! [`crate::model`] types only in field naming (kebab-case keys, a
//! `(current_track, tracks)` tuple for the playlist); conversions are total
//! in one direction and fallible in the other only insofar as `serde`
//! itself validates required fields.

use std::collections::HashMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::model::{ClientSession, ConfigValue, Playlist, SyncRecord, Track, VideoTransform};

/// Client-to-server join descriptor: `{ "id": ..., "config": { ... } }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinDescriptor {
    pub id: String,
    #[serde(default)]
    pub config: HashMap<String, ConfigValue>,
}

impl From<JoinDescriptor> for ClientSession {
    fn from(descriptor: JoinDescriptor) -> Self {
        ClientSession {
            id: descriptor.id,
            config: descriptor.config,
        }
    }
}

impl From<&ClientSession> for JoinDescriptor {
    fn from(session: &ClientSession) -> Self {
        JoinDescriptor {
            id: session.id.clone(),
            config: session.config.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireTrack {
    uri: String,
    duration: u64,
}

/// §6: `playlist` is the 2-element tuple `(current-track uint, array of
/// {uri, duration})`, encoded on the wire as a JSON array
/// `[current_track, [...]]` rather than a keyed object.
type WirePlaylist = (u64, Vec<WireTrack>);

/// Server-to-client `SyncRecord`, using the wire's kebab-case key names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRecordWire {
    pub version: u64,
    #[serde(rename = "clock-address")]
    pub clock_address: IpAddr,
    #[serde(rename = "clock-port")]
    pub clock_port: u16,
    pub playlist: WirePlaylist,
    #[serde(rename = "base-time")]
    pub base_time: u64,
    #[serde(rename = "base-time-offset")]
    pub base_time_offset: u64,
    pub latency: u64,
    #[serde(rename = "stream-start-delay")]
    pub stream_start_delay: u64,
    pub stopped: bool,
    pub paused: bool,
    #[serde(
        default,
        skip_serializing_if = "HashMap::is_empty",
        rename = "transform"
    )]
    pub transforms: HashMap<String, VideoTransform>,
}

impl From<&SyncRecord> for SyncRecordWire {
    fn from(record: &SyncRecord) -> Self {
        SyncRecordWire {
            version: record.version,
            clock_address: record.clock_address,
            clock_port: record.clock_port,
            playlist: (
                record.playlist.current_track_index(),
                record
                    .playlist
                    .get_tracks()
                    .iter()
                    .map(|t| WireTrack {
                        uri: t.uri.clone(),
                        duration: t.duration_ns,
                    })
                    .collect(),
            ),
            base_time: record.base_time,
            base_time_offset: record.base_time_offset,
            latency: record.latency,
            stream_start_delay: record.stream_start_delay,
            stopped: record.stopped,
            paused: record.paused,
            transforms: record.transforms.clone(),
        }
    }
}

impl From<SyncRecordWire> for SyncRecord {
    fn from(wire: SyncRecordWire) -> Self {
        let (current_track, tracks) = wire.playlist;
        let mut playlist = Playlist::new(
            tracks
                .into_iter()
                .map(|t| Track::new(t.uri, t.duration))
                .collect(),
        );
        playlist.set_current_track(current_track);
        SyncRecord {
            version: wire.version,
            clock_address: wire.clock_address,
            clock_port: wire.clock_port,
            playlist,
            base_time: wire.base_time,
            base_time_offset: wire.base_time_offset,
            latency: wire.latency,
            stream_start_delay: wire.stream_start_delay,
            stopped: wire.stopped,
            paused: wire.paused,
            transforms: wire.transforms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Track;

    #[test]
    fn sync_record_wire_round_trip() {
        let record = SyncRecord {
            version: 7,
            clock_address: "192.168.1.10".parse().unwrap(),
            clock_port: 9000,
            playlist: Playlist::new(vec![Track::new("u1", 10), Track::new("u2", 20)]),
            base_time: 123,
            base_time_offset: 456,
            latency: 10,
            stream_start_delay: 0,
            stopped: false,
            paused: true,
            transforms: HashMap::new(),
        };
        let wire: SyncRecordWire = (&record).into();
        let json = serde_json::to_string(&wire).unwrap();
        assert!(json.contains("\"clock-address\""));
        assert!(json.contains("\"base-time-offset\""));
        let decoded_wire: SyncRecordWire = serde_json::from_str(&json).unwrap();
        let decoded: SyncRecord = decoded_wire.into();
        assert_eq!(decoded, record);
    }

    #[test]
    fn playlist_encodes_as_a_two_element_array_per_schema() {
        let record = SyncRecord {
            version: 1,
            clock_address: "127.0.0.1".parse().unwrap(),
            clock_port: 1,
            playlist: Playlist::new(vec![Track::new("u1", 10)]),
            base_time: 0,
            base_time_offset: 0,
            latency: 0,
            stream_start_delay: 0,
            stopped: false,
            paused: false,
            transforms: HashMap::new(),
        };
        let wire: SyncRecordWire = (&record).into();
        let value = serde_json::to_value(&wire).unwrap();
        let playlist = &value["playlist"];
        assert!(playlist.is_array(), "playlist must encode as a JSON array, got {playlist}");
        assert_eq!(playlist[0], 0);
        assert_eq!(playlist[1][0]["uri"], "u1");
        assert_eq!(playlist[1][0]["duration"], 10);
    }

    #[test]
    fn join_descriptor_decodes_minimal_frame() {
        let decoded: JoinDescriptor = serde_json::from_str(r#"{"id":"c1"}"#).unwrap();
        assert_eq!(decoded.id, "c1");
        assert!(decoded.config.is_empty());
    }
}
