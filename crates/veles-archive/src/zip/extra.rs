//! Central directory extra fields.

use veles_common::BinaryReader;

use super::central_dir::{extra_field, CentralDirectoryHeader};
use crate::crypto::aes::Strength;
use crate::{Error, Result};

/// Contents of the WinZip AES extra field (`0x9901`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesField {
    /// 1 for AE-1, 2 for AE-2 (AE-2 stores no CRC).
    pub vendor_version: u16,
    pub strength: Strength,
    /// The real compression method hidden behind method 99.
    pub compression_method: u16,
}

impl AesField {
    /// Vendor id `"AE"`.
    pub const VENDOR_ID: u16 = 0x4541;

    fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = BinaryReader::new(data);
        let vendor_version = reader.read_u16()?;
        let vendor_id = reader.read_u16()?;

        if !(1..=2).contains(&vendor_version) || vendor_id != Self::VENDOR_ID {
            return Err(Error::InvalidAesHeader(format!(
                "vendor version {vendor_version}, vendor id {vendor_id:#06x}"
            )));
        }

        let mode = reader.read_u8()?;
        let strength = Strength::from_mode(mode)
            .ok_or_else(|| Error::InvalidAesHeader(format!("unknown strength {mode}")))?;
        let compression_method = reader.read_u16()?;

        Ok(Self {
            vendor_version,
            strength,
            compression_method,
        })
    }
}

/// Values resolved from a central directory entry's extra fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtraFields {
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub local_header_offset: u64,
    pub aes: Option<AesField>,
}

impl ExtraFields {
    /// Parse the extra field block of `header`.
    ///
    /// ZIP64 values replace the header fields that hold the 0xFFFFFFFF sentinel,
    /// in the fixed order uncompressed size, compressed size, offset.
    pub fn parse(data: &[u8], header: &CentralDirectoryHeader) -> Result<Self> {
        let mut fields = Self {
            uncompressed_size: u64::from(header.uncompressed_size),
            compressed_size: u64::from(header.compressed_size),
            local_header_offset: u64::from(header.local_header_offset),
            aes: None,
        };

        let mut reader = BinaryReader::new(data);
        while reader.remaining() >= 4 {
            let id = reader.read_u16()?;
            let size = reader.read_u16()? as usize;

            // Some writers pad the extra block; stop at a field that overruns it.
            let Ok(body) = reader.read_bytes(size) else {
                break;
            };

            match id {
                extra_field::ZIP64 => fields.apply_zip64(body, header)?,
                extra_field::AES => fields.aes = Some(AesField::parse(body)?),
                _ => {}
            }
        }

        Ok(fields)
    }

    fn apply_zip64(&mut self, body: &[u8], header: &CentralDirectoryHeader) -> Result<()> {
        let mut reader = BinaryReader::new(body);
        if header.uncompressed_size == u32::MAX {
            self.uncompressed_size = reader.read_u64()?;
        }
        if header.compressed_size == u32::MAX {
            self.compressed_size = reader.read_u64()?;
        }
        if header.local_header_offset == u32::MAX {
            self.local_header_offset = reader.read_u64()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::FromZeros;

    fn header() -> CentralDirectoryHeader {
        let mut header = CentralDirectoryHeader::new_zeroed();
        header.uncompressed_size = 100;
        header.compressed_size = 50;
        header.local_header_offset = 7;
        header
    }

    fn field(id: u16, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&(body.len() as u16).to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    fn aes_body(version: u16, vendor: u16, mode: u8, method: u16) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&version.to_le_bytes());
        body.extend_from_slice(&vendor.to_le_bytes());
        body.push(mode);
        body.extend_from_slice(&method.to_le_bytes());
        body
    }

    #[test]
    fn test_no_fields() {
        let fields = ExtraFields::parse(&[], &header()).unwrap();
        assert_eq!(fields.uncompressed_size, 100);
        assert_eq!(fields.compressed_size, 50);
        assert_eq!(fields.local_header_offset, 7);
        assert!(fields.aes.is_none());
    }

    #[test]
    fn test_zip64_only_sentinels() {
        let mut header = header();
        header.compressed_size = u32::MAX;
        header.local_header_offset = u32::MAX;

        let mut body = Vec::new();
        body.extend_from_slice(&0x1_0000_0000u64.to_le_bytes());
        body.extend_from_slice(&0x2_0000_0000u64.to_le_bytes());

        let mut data = field(0x7875, &[1, 2, 3]);
        data.extend(field(extra_field::ZIP64, &body));

        let fields = ExtraFields::parse(&data, &header).unwrap();
        assert_eq!(fields.uncompressed_size, 100);
        assert_eq!(fields.compressed_size, 0x1_0000_0000);
        assert_eq!(fields.local_header_offset, 0x2_0000_0000);
    }

    #[test]
    fn test_aes_field() {
        let data = field(extra_field::AES, &aes_body(2, AesField::VENDOR_ID, 3, 8));
        let aes = ExtraFields::parse(&data, &header()).unwrap().aes.unwrap();
        assert_eq!(aes.vendor_version, 2);
        assert_eq!(aes.strength, Strength::Aes256);
        assert_eq!(aes.compression_method, 8);
    }

    #[test]
    fn test_invalid_aes_field() {
        for body in [
            aes_body(3, AesField::VENDOR_ID, 1, 0),
            aes_body(1, 0x1234, 1, 0),
            aes_body(1, AesField::VENDOR_ID, 9, 0),
        ] {
            let data = field(extra_field::AES, &body);
            assert!(matches!(
                ExtraFields::parse(&data, &header()),
                Err(Error::InvalidAesHeader(_))
            ));
        }
    }

    #[test]
    fn test_truncated_field_ignored() {
        let mut data = field(0x7875, &[1, 2, 3]);
        data.extend_from_slice(&[0x01, 0x00, 0x20, 0x00, 0xAA]);
        assert!(ExtraFields::parse(&data, &header()).is_ok());
    }
}
