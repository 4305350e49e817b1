//! Error types for the front-end.

use thiserror::Error;

/// Errors that can occur while resolving paths and opening files.
#[derive(Debug, Error)]
pub enum Error {
    /// Container or mapping error.
    #[error(transparent)]
    Archive(#[from] veles_archive::Error),

    /// Common library error.
    #[error(transparent)]
    Common(#[from] veles_common::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The extension does not name a registered container format.
    #[error("\"{0}\" is not a container extension")]
    NotAContainer(String),
}

/// Result type for front-end operations.
pub type Result<T> = std::result::Result<T, Error>;
