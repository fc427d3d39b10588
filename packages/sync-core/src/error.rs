//! Centralized error types for the sync-core library.
//!
//! Mirrors the six error kinds a synchronised playback service needs to
//! distinguish: configuration, transport, decode, timeline, clock and
//! protocol failures. Each carries enough context to log usefully and maps
//! to a machine-readable code via [`ErrorCode`].

use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code, stable across versions.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for both the sync server and sync client.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing URI/playlist (or other required setting) at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Accept/read/write failure on the control channel.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Malformed JSON or a frame missing required fields.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A pipeline state transition (seek, teardown, rebuild) failed.
    #[error("timeline error: {0}")]
    Timeline(String),

    /// Clock synchronisation did not complete within the configured timeout.
    #[error("clock error: {0}")]
    Clock(String),

    /// A frame violated the wire schema, or named an unsupported `version`.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ErrorCode for SyncError {
    fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Transport(_) => "transport_error",
            Self::Decode(_) => "decode_error",
            Self::Timeline(_) => "timeline_error",
            Self::Clock(_) => "clock_error",
            Self::Protocol(_) => "protocol_error",
        }
    }
}

/// Convenient Result alias for core operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(SyncError::Config("x".into()).code(), "config_error");
        assert_eq!(SyncError::Timeline("x".into()).code(), "timeline_error");
        assert_eq!(SyncError::Clock("x".into()).code(), "clock_error");
        assert_eq!(SyncError::Protocol("x".into()).code(), "protocol_error");
    }

    #[test]
    fn io_error_converts_to_transport() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone");
        let err: SyncError = io_err.into();
        assert_eq!(err.code(), "transport_error");
    }

    #[test]
    fn json_error_converts_to_decode() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: SyncError = json_err.into();
        assert_eq!(err.code(), "decode_error");
    }
}
