//! Local File Header structures.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Local File Header (without signature).
///
/// Its name and extra field lengths may differ from the central directory's,
/// so the data offset is always computed from this header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct LocalFileHeader {
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
}

impl LocalFileHeader {
    /// Local File Header signature as u32.
    pub const SIGNATURE: u32 = 0x04034b50;

    /// Size of the header including its signature.
    pub const SIZE: u64 = 30;

    /// Total variable-length data size following this header.
    pub fn variable_data_size(&self) -> u64 {
        u64::from(self.file_name_length) + u64::from(self.extra_field_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size() {
        assert_eq!(std::mem::size_of::<LocalFileHeader>() as u64 + 4, LocalFileHeader::SIZE);
    }
}
