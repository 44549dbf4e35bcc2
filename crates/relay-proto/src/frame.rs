//! Binary framing of one CRDT update.
//!
//! ```text
//! +---------+----------------------+------------------------+
//! | version | id (u64, big-endian) | update bytes (rest)    |
//! | 1 byte  | 8 bytes              | 0..n bytes             |
//! +---------+----------------------+------------------------+
//! ```
//!
//! Text transports carry the frame as standard base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Result};

/// A decoded `(id, update)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Update id, monotonic within one benchmark run.
    pub id: u64,
    /// Raw update bytes as produced by the CRDT engine.
    pub update: Bytes,
}

/// Encoder/decoder for update frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCodec;

impl MessageCodec {
    /// Current frame version.
    pub const VERSION: u8 = 1;

    /// Fixed header length (version + id).
    pub const HEADER_LEN: usize = 1 + 8;

    /// Frame an update.
    #[must_use]
    pub fn encode(id: u64, update: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::HEADER_LEN + update.len());
        buf.put_u8(Self::VERSION);
        buf.put_u64(id);
        buf.put_slice(update);
        buf.freeze()
    }

    /// Parse a frame.
    pub fn decode(payload: &[u8]) -> Result<Frame> {
        if payload.len() < Self::HEADER_LEN {
            return Err(CodecError::Truncated {
                len: payload.len(),
                needed: Self::HEADER_LEN,
            });
        }
        let mut buf = payload;
        let version = buf.get_u8();
        if version != Self::VERSION {
            return Err(CodecError::Version(version));
        }
        let id = buf.get_u64();
        Ok(Frame {
            id,
            update: Bytes::copy_from_slice(buf),
        })
    }

    /// Frame an update and base64 it for a text transport.
    #[must_use]
    pub fn encode_text(id: u64, update: &[u8]) -> String {
        STANDARD.encode(Self::encode(id, update))
    }

    /// Inverse of [`MessageCodec::encode_text`].
    pub fn decode_text(text: &str) -> Result<Frame> {
        let raw = STANDARD.decode(text.trim())?;
        Self::decode(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_empty_update() {
        let frame = MessageCodec::decode(&MessageCodec::encode(42, &[])).unwrap();
        assert_eq!(frame.id, 42);
        assert!(frame.update.is_empty());
    }

    #[test]
    fn test_header_layout() {
        let encoded = MessageCodec::encode(0x0102, b"ab");
        assert_eq!(
            &encoded[..],
            &[1, 0, 0, 0, 0, 0, 0, 0x01, 0x02, b'a', b'b']
        );
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let err = MessageCodec::decode(&[1, 0, 0]).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { len: 3, needed: 9 }));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut raw = MessageCodec::encode(1, b"x").to_vec();
        raw[0] = 7;
        assert!(matches!(
            MessageCodec::decode(&raw),
            Err(CodecError::Version(7))
        ));
    }

    #[test]
    fn test_text_roundtrip_max_id() {
        let text = MessageCodec::encode_text(u64::MAX, b"\x00\xff");
        let frame = MessageCodec::decode_text(&text).unwrap();
        assert_eq!(frame.id, u64::MAX);
        assert_eq!(&frame.update[..], b"\x00\xff");
    }

    #[test]
    fn test_text_rejects_garbage() {
        assert!(matches!(
            MessageCodec::decode_text("not base64 !!"),
            Err(CodecError::Base64(_))
        ));
    }
}
