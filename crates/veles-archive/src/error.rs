//! Error types for the archive crate.

use thiserror::Error;

/// Errors that can occur while opening containers or mapping files out of them.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error (truncated data, bad magic, out-of-range views).
    #[error("{0}")]
    Common(#[from] veles_common::Error),

    /// Invalid ZIP record signature.
    #[error("invalid ZIP signature: expected {expected:#010x}, got {actual:#010x}")]
    InvalidSignature { expected: u32, actual: u32 },

    /// ZIP64 record not found when expected.
    #[error("ZIP64 end of central directory not found")]
    Zip64EocdNotFound,

    /// Malformed WinZip AES extra field.
    #[error("incorrect AES header: {0}")]
    InvalidAesHeader(String),

    /// The decompressed MGX index does not have the declared size.
    #[error("corrupted MGX index: expected {expected} bytes, got {actual}")]
    IndexSizeMismatch { expected: u64, actual: u64 },

    /// An MGX segment lies outside the block it references.
    #[error("segment of \"{name}\" exceeds block {block}")]
    InvalidSegment { name: String, block: u32 },

    /// No entry with this name exists in the container.
    #[error("file \"{0}\" not found")]
    NotFound(String),

    /// The entry is a folder and has no contents to map.
    #[error("\"{0}\" is a directory")]
    IsDirectory(String),

    /// An encrypted entry was mapped without a password.
    #[error("\"{0}\" is encrypted and no password was given")]
    MissingPassword(String),

    /// Password verification failed before decryption.
    #[error("incorrect password for \"{0}\"")]
    IncorrectPassword(String),

    /// The AES authentication code did not match the ciphertext.
    #[error("authentication failed for \"{0}\" (corrupted data or wrong password)")]
    AuthenticationFailed(String),

    /// Unsupported compression method.
    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    /// ZIP LZMA sub-header with a properties size other than 5.
    #[error("incorrect LZMA header: properties size {0}")]
    InvalidLzmaHeader(u16),

    /// A buffer of the declared size cannot be allocated.
    #[error("cannot allocate {0} bytes")]
    Allocation(u64),

    /// A declared size is out of proportion with the data backing it.
    #[error("\"{name}\" declares an implausible size of {size} bytes")]
    ImplausibleSize { name: String, size: u64 },

    /// An MGX file name is not valid UTF-8.
    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    /// Decompression error.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Decryption error.
    #[error("decryption error: {0}")]
    Decryption(String),

    /// Produced data has a different size than the metadata declared.
    #[error("incorrect size for \"{name}\": expected {expected} bytes, got {actual}")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    /// Checksum of the produced data does not match the stored one.
    #[error("checksum mismatch for \"{name}\": expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },
}

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;
