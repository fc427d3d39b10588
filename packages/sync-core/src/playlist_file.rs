//! Playlist text file loader (§6): one track per line, `URI SPACE
//! DURATION_NS`; `DURATION_NS = -1` means unknown. Used by the example CLI
//! to seed the initial playlist.

use std::path::Path;

use crate::error::{SyncError, SyncResult};
use crate::model::{Playlist, Track};
use crate::protocol_constants::DURATION_UNKNOWN_NS;

/// Parses a playlist text file into a [`Playlist`]. Blank lines are
/// skipped. A malformed line aborts the whole load with a `ConfigError`
/// (§7: `ConfigError` is surfaced to the caller of start and aborts
/// startup).
pub fn load_from_path(path: &Path) -> SyncResult<Playlist> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SyncError::Config(format!("failed to read playlist {}: {}", path.display(), e)))?;
    parse(&content)
}

fn parse(content: &str) -> SyncResult<Playlist> {
    let mut tracks = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, char::is_whitespace);
        let uri = parts
            .next()
            .ok_or_else(|| malformed(lineno, line))?
            .to_string();
        let duration_field = parts.next().ok_or_else(|| malformed(lineno, line))?.trim();
        let duration_signed: i64 = duration_field
            .parse()
            .map_err(|_| malformed(lineno, line))?;
        let duration_ns = if duration_signed < 0 {
            DURATION_UNKNOWN_NS
        } else {
            duration_signed as u64
        };
        tracks.push(Track::new(uri, duration_ns));
    }
    if tracks.is_empty() {
        return Err(SyncError::Config("playlist file contains no tracks".into()));
    }
    Ok(Playlist::new(tracks))
}

fn malformed(lineno: usize, line: &str) -> SyncError {
    SyncError::Config(format!(
        "malformed playlist line {}: {:?}",
        lineno + 1,
        line
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn parses_known_and_unknown_durations() {
        let playlist = parse("http://a/1.mp4 10000000000\nhttp://a/2.mp4 -1\n").unwrap();
        let tracks = playlist.get_tracks();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].duration_ns, 10_000_000_000);
        assert_eq!(tracks[1].duration_ns, DURATION_UNKNOWN_NS);
    }

    #[test]
    fn skips_blank_lines() {
        let playlist = parse("http://a/1.mp4 1\n\n\nhttp://a/2.mp4 2\n").unwrap();
        assert_eq!(playlist.get_tracks().len(), 2);
    }

    #[test]
    fn rejects_malformed_line() {
        let err = parse("http://a/1.mp4 not-a-number").unwrap_err();
        assert_eq!(err.code(), "config_error");
    }

    #[test]
    fn rejects_empty_file() {
        let err = parse("").unwrap_err();
        assert_eq!(err.code(), "config_error");
    }
}
