//! PKWARE ZIP container support.
//!
//! This module contains the on-disk record layouts (including ZIP64 and the
//! WinZip AES extra field) and the [`ZipMapper`] built on them.

mod central_dir;
mod eocd;
mod extra;
mod local;
mod mapper;

pub use central_dir::CentralDirectoryHeader;
pub use eocd::{Eocd64Locator, Eocd64Record, EocdRecord};
pub use extra::{AesField, ExtraFields};
pub use local::LocalFileHeader;
pub use mapper::ZipMapper;

use crate::codec::Codec;
use crate::crypto::aes::Strength;

/// Compression method id that marks a WinZip AES entry; the real method is in the extra field.
pub const METHOD_AES: u16 = 99;

/// Compression methods the mapper can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CompressionMethod {
    /// No compression (stored).
    Store = 0,
    /// DEFLATE compression.
    Deflate = 8,
    /// BZIP2 compression.
    Bzip2 = 12,
    /// LZMA with the ZIP-specific 4-byte sub-header.
    Lzma = 14,
    /// Zstandard (method 93; the deprecated id 20 is read as the same).
    Zstd = 93,
    /// XZ.
    Xz = 95,
    /// PPMd variant I (PPMd8).
    Ppmd = 98,
}

impl CompressionMethod {
    /// The codec that decodes this method, `None` for stored data.
    pub fn codec(self) -> Option<Codec> {
        match self {
            CompressionMethod::Store => None,
            CompressionMethod::Deflate => Some(Codec::Deflate),
            CompressionMethod::Bzip2 => Some(Codec::Bzip2),
            CompressionMethod::Lzma => Some(Codec::Lzma),
            CompressionMethod::Zstd => Some(Codec::Zstd),
            CompressionMethod::Xz => Some(Codec::Xz),
            CompressionMethod::Ppmd => Some(Codec::Ppmd),
        }
    }
}

impl TryFrom<u16> for CompressionMethod {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Store),
            8 => Ok(Self::Deflate),
            12 => Ok(Self::Bzip2),
            14 => Ok(Self::Lzma),
            20 | 93 => Ok(Self::Zstd),
            95 => Ok(Self::Xz),
            98 => Ok(Self::Ppmd),
            other => Err(other),
        }
    }
}

/// Encryption applied to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    None,
    /// Traditional PKWARE stream cipher.
    Classic,
    /// WinZip AES.
    Aes(Strength),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_method() {
        assert_eq!(CompressionMethod::try_from(0), Ok(CompressionMethod::Store));
        assert_eq!(CompressionMethod::try_from(20), Ok(CompressionMethod::Zstd));
        assert_eq!(CompressionMethod::try_from(93), Ok(CompressionMethod::Zstd));
        assert_eq!(CompressionMethod::try_from(METHOD_AES), Err(99));
        assert_eq!(CompressionMethod::try_from(9), Err(9));
        assert_eq!(CompressionMethod::Store.codec(), None);
        assert_eq!(CompressionMethod::Lzma.codec(), Some(Codec::Lzma));
    }
}
