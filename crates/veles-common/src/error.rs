//! Error types for veles-common.

use thiserror::Error;

/// Common error type for Veles operations.
#[derive(Debug, Error)]
pub enum Error {
    /// End of buffer reached while reading.
    #[error("unexpected end of buffer: needed {needed} bytes but only {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    /// Invalid magic bytes encountered.
    #[error("invalid magic: expected {:?}, got {:?}", String::from_utf8_lossy(expected), String::from_utf8_lossy(actual))]
    InvalidMagic {
        expected: Vec<u8>,
        actual: Vec<u8>,
    },

    /// A sub-view was requested outside of its parent memory.
    #[error("range {offset}+{len} is out of bounds for memory of {size} bytes")]
    OutOfBounds { offset: u64, len: u64, size: usize },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
