//! Self-delimited JSON object framing for the control channel (§4.3/§4.7).
//!
//! Each frame is exactly one JSON object; frame boundaries are found by
//! scanning for a balanced top-level `{ ... }`, tracking whether the scanner
//! is inside a string and honouring backslash escapes. This is the textual
//! form every implementation of the transport must interoperate with; a
//! length-prefixed alternative is not implemented here.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::SyncError;

#[derive(Debug, Default)]
pub struct JsonFrameCodec;

impl JsonFrameCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for JsonFrameCodec {
    type Item = serde_json::Value;
    type Error = SyncError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        skip_inter_frame_whitespace(src);

        // `src` always holds every unconsumed byte from the start of the
        // next frame (nothing is consumed here on a partial return), so the
        // scan must be stateless: recompute depth/in_string/escaped from
        // index 0 on every call rather than resuming from whatever was
        // tallied last time. `Framed` hands the same retained prefix back
        // on the next call alongside newly read bytes; persisting scanner
        // state across calls double-counts the prefix.
        let mut depth = 0u32;
        let mut in_string = false;
        let mut escaped = false;
        let mut started = false;
        let mut end = None;

        for (i, &byte) in src.iter().enumerate() {
            if escaped {
                escaped = false;
                continue;
            }
            match byte {
                b'\\' if in_string => escaped = true,
                b'"' => in_string = !in_string,
                b'{' if !in_string => {
                    started = true;
                    depth += 1;
                }
                b'}' if !in_string => {
                    if depth > 0 {
                        depth -= 1;
                    }
                    if started && depth == 0 {
                        end = Some(i + 1);
                        break;
                    }
                }
                _ => {}
            }
        }

        let Some(end) = end else {
            // No complete object yet; keep buffering. Guard against a
            // pathological unbounded frame.
            if src.len() > 1024 * 1024 {
                return Err(SyncError::Protocol("frame exceeds 1MiB without closing".into()));
            }
            return Ok(None);
        };

        let frame = src.split_to(end);
        let value = serde_json::from_slice(&frame)?;
        Ok(Some(value))
    }
}

impl<T: serde::Serialize> Encoder<T> for JsonFrameCodec {
    type Error = SyncError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = serde_json::to_vec(&item)?;
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}

/// Consumes leading whitespace between frames (tolerates newline-delimited
/// pretty-printed producers without treating the newline itself as part of
/// the schema).
pub fn skip_inter_frame_whitespace(src: &mut BytesMut) {
    while src.first().is_some_and(|b| b.is_ascii_whitespace()) {
        src.advance(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_single_frame() {
        let mut codec = JsonFrameCodec::new();
        let mut buf = BytesMut::from(r#"{"id":"c1"}"#);
        let value = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(value, json!({"id": "c1"}));
        assert!(buf.is_empty());
    }

    #[test]
    fn buffers_partial_frame() {
        let mut codec = JsonFrameCodec::new();
        let mut buf = BytesMut::from(r#"{"id":"c"#);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(br#"1"}"#);
        let value = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(value, json!({"id": "c1"}));
    }

    #[test]
    fn brace_inside_string_does_not_close_frame_early() {
        let mut codec = JsonFrameCodec::new();
        let mut buf = BytesMut::from(r#"{"id":"c1","note":"a { b"}"#);
        let value = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(value["note"], "a { b");
    }

    #[test]
    fn decodes_frame_preceded_by_whitespace() {
        let mut codec = JsonFrameCodec::new();
        let mut buf = BytesMut::from("\n  {\"id\":\"c1\"}");
        let value = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(value, json!({"id": "c1"}));
    }

    #[test]
    fn decodes_two_frames_back_to_back() {
        let mut codec = JsonFrameCodec::new();
        let mut buf = BytesMut::from(r#"{"a":1}{"b":2}"#);
        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first, json!({"a": 1}));
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second, json!({"b": 2}));
    }
}
