//! Error types for the relay wire format.
//!
//! [`CodecError`] covers everything that can go wrong turning a relay
//! message back into an `(id, update)` pair. [`EventError`] covers the
//! line-delimited event records around it.

use thiserror::Error;

/// Convenience type alias for Results using [`CodecError`].
pub type Result<T, E = CodecError> = std::result::Result<T, E>;

/// A payload could not be decoded into an update frame.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// Frame shorter than its fixed header.
    #[error("truncated frame: {len} bytes (header needs {needed})")]
    Truncated {
        /// Actual frame length.
        len: usize,
        /// Minimum frame length.
        needed: usize,
    },

    /// Frame written by an unknown codec version.
    #[error("unsupported frame version {0}")]
    Version(u8),

    /// Text payload was not valid base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// JSON body did not match the wrapped body layout.
    #[error("malformed message body: {0}")]
    Body(#[source] serde_json::Error),

    /// The id declared by the body disagrees with the id inside the frame.
    #[error("body declares id {declared} but frame carries id {framed}")]
    IdMismatch {
        /// Id in the JSON wrapper.
        declared: u64,
        /// Id in the binary frame.
        framed: u64,
    },
}

/// A relay event line could not be parsed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EventError {
    /// Line was not a JSON event record.
    #[error("invalid event record: {0}")]
    Json(#[from] serde_json::Error),

    /// The record parsed but its message body did not.
    #[error("invalid message body: {0}")]
    Codec(#[from] CodecError),
}

impl CodecError {
    /// Static label used for drop counters.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Truncated { .. } => "truncated",
            Self::Version(_) => "version",
            Self::Base64(_) => "base64",
            Self::Body(_) => "body",
            Self::IdMismatch { .. } => "id_mismatch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(CodecError::Version(9).error_code(), "version");
        assert_eq!(
            CodecError::Truncated { len: 2, needed: 9 }.error_code(),
            "truncated"
        );
        assert_eq!(
            CodecError::IdMismatch {
                declared: 1,
                framed: 2
            }
            .error_code(),
            "id_mismatch"
        );
    }

    #[test]
    fn test_error_display_mentions_sizes() {
        let err = CodecError::Truncated { len: 3, needed: 9 };
        let msg = err.to_string();
        assert!(msg.contains('3'));
        assert!(msg.contains('9'));
    }
}
