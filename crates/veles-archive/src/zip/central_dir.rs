//! Central Directory Header structures.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Central Directory File Header (without signature).
///
/// The 4-byte signature (0x02014b50) is read separately before this struct.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct CentralDirectoryHeader {
    /// Version made by (low byte: ZIP specification version)
    pub version_made_by: u16,
    /// Version needed to extract
    pub version_needed: u16,
    /// General purpose bit flag
    pub flags: u16,
    /// Compression method
    pub compression_method: u16,
    /// File last modification time and date (DOS format)
    pub last_modified: u32,
    /// CRC-32 of uncompressed data
    pub crc32: u32,
    /// Compressed size
    pub compressed_size: u32,
    /// Uncompressed size
    pub uncompressed_size: u32,
    /// File name length
    pub file_name_length: u16,
    /// Extra field length
    pub extra_field_length: u16,
    /// File comment length
    pub file_comment_length: u16,
    /// Disk number where file starts
    pub disk_number_start: u16,
    /// Internal file attributes
    pub internal_attrs: u16,
    /// External file attributes
    pub external_attrs: u32,
    /// Relative offset of local file header
    pub local_header_offset: u32,
}

impl CentralDirectoryHeader {
    /// Central Directory signature as u32.
    pub const SIGNATURE: u32 = 0x02014b50;

    /// General purpose flag: the entry is encrypted.
    pub const FLAG_ENCRYPTED: u16 = 0x0001;

    /// ZIP specification version of the writer.
    #[inline]
    pub fn version(&self) -> u8 {
        (self.version_made_by & 0xFF) as u8
    }

    /// Check whether the entry is encrypted.
    #[inline]
    pub fn is_encrypted(&self) -> bool {
        self.flags & Self::FLAG_ENCRYPTED != 0
    }
}

/// Extra field IDs handled by the mapper.
pub mod extra_field {
    /// ZIP64 extended information extra field.
    pub const ZIP64: u16 = 0x0001;
    /// WinZip AES encryption extra field.
    pub const AES: u16 = 0x9901;
}
