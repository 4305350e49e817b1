//! Checksum utilities.
//!
//! ZIP entries carry a CRC-32 (IEEE) of their uncompressed contents, MGX file
//! records carry a CRC-32C (Castagnoli).

/// Compute the CRC-32 (IEEE 802.3, as used by ZIP) of a byte slice.
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Compute the CRC-32C of a byte slice.
///
/// Uses hardware acceleration when available (SSE4.2 on x86).
#[inline]
pub fn crc32c(data: &[u8]) -> u32 {
    crc32c::crc32c(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_hash() {
        assert_eq!(crc32(&[]), 0);
        assert_eq!(crc32c(&[]), 0);
    }

    #[test]
    fn test_known_values() {
        assert_eq!(crc32(b"123456789"), 0xCBF43926);
        assert_eq!(crc32c(b"123456789"), 0xE3069283);
    }
}
