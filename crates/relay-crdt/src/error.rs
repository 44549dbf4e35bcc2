//! Engine errors.

use thiserror::Error;

/// Failure of a document operation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DocError {
    /// Edit position past the end of the visible text.
    #[error("position {pos} out of bounds (length {len})")]
    OutOfBounds {
        /// Requested position, in characters.
        pos: usize,
        /// Visible length, in characters.
        len: usize,
    },

    /// Update or state bytes could not be decoded.
    #[error("malformed update: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Update or state could not be encoded.
    #[error("failed to encode: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}
