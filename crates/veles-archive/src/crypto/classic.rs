//! Traditional PKWARE encryption.
//!
//! A byte-wise stream cipher driven by three 32-bit keys that are updated with
//! every plaintext byte, so decryption is strictly sequential.

use super::CryptoError;

/// Size of the encryption header preceding the payload.
pub const HEADER_LEN: usize = 12;

const CRC_TABLE: [u32; 256] = crc_table();

const fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

#[inline]
fn crc32_byte(crc: u32, byte: u8) -> u32 {
    CRC_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
}

/// The cipher state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keys {
    k0: u32,
    k1: u32,
    k2: u32,
}

impl Keys {
    /// Initialize the keys from a password.
    pub fn new(password: &[u8]) -> Self {
        let mut keys = Self {
            k0: 0x1234_5678,
            k1: 0x2345_6789,
            k2: 0x3456_7890,
        };
        for &byte in password {
            keys.update(byte);
        }
        keys
    }

    #[inline]
    fn update(&mut self, byte: u8) {
        self.k0 = crc32_byte(self.k0, byte);
        self.k1 = self
            .k1
            .wrapping_add(self.k0 & 0xFF)
            .wrapping_mul(134_775_813)
            .wrapping_add(1);
        self.k2 = crc32_byte(self.k2, (self.k1 >> 24) as u8);
    }

    #[inline]
    fn stream_byte(&self) -> u8 {
        let t = (self.k2 & 0xFFFF) | 2;
        (t.wrapping_mul(t ^ 1) >> 8) as u8
    }

    /// Decrypt one byte and advance the keys.
    #[inline]
    pub fn decrypt_byte(&mut self, byte: u8) -> u8 {
        let plain = byte ^ self.stream_byte();
        self.update(plain);
        plain
    }

    /// Decrypt a buffer in place.
    pub fn decrypt(&mut self, data: &mut [u8]) {
        for byte in data {
            *byte = self.decrypt_byte(*byte);
        }
    }

    /// Encrypt a buffer in place.
    #[cfg(any(test, feature = "testing"))]
    pub fn encrypt(&mut self, data: &mut [u8]) {
        for byte in data {
            let plain = *byte;
            *byte = plain ^ self.stream_byte();
            self.update(plain);
        }
    }
}

/// How the decrypted header is checked against the entry's CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verifier {
    /// Last two header bytes equal the high word of the CRC.
    Word(u16),
    /// Last header byte equals the high byte of the CRC.
    Byte(u8),
    /// No check.
    Skip,
}

impl Verifier {
    /// Pick the check for an entry written by the given ZIP version.
    ///
    /// Writers from 3.0 on disagree about the verification bytes, so those
    /// entries are not checked.
    pub fn for_entry(version: u8, crc32: u32) -> Self {
        match version {
            0..=19 => Verifier::Word((crc32 >> 16) as u16),
            20..=29 => Verifier::Byte((crc32 >> 24) as u8),
            _ => Verifier::Skip,
        }
    }

    fn accepts(self, header: &[u8; HEADER_LEN]) -> bool {
        match self {
            Verifier::Word(expected) => u16::from_le_bytes([header[10], header[11]]) == expected,
            Verifier::Byte(expected) => header[11] == expected,
            Verifier::Skip => true,
        }
    }
}

/// Decrypt `data` (12-byte header followed by the payload).
///
/// The header is checked before any of the payload is touched.
pub fn decrypt(password: &[u8], verifier: Verifier, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < HEADER_LEN {
        return Err(CryptoError::Truncated);
    }

    let (encrypted_header, payload) = data.split_at(HEADER_LEN);
    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(encrypted_header);

    let mut keys = Keys::new(password);
    keys.decrypt(&mut header);

    if !verifier.accepts(&header) {
        return Err(CryptoError::IncorrectPassword);
    }

    let mut plain = payload.to_vec();
    keys.decrypt(&mut plain);
    Ok(plain)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encrypt_with_header(password: &[u8], check: [u8; 2], plain: &[u8]) -> Vec<u8> {
        let mut data = vec![0x5A; HEADER_LEN];
        data[10] = check[0];
        data[11] = check[1];
        data.extend_from_slice(plain);
        Keys::new(password).encrypt(&mut data);
        data
    }

    #[test]
    fn test_crc_table_matches_crc32() {
        let crc = b"123456789".iter().fold(!0u32, |crc, &b| crc32_byte(crc, b));
        assert_eq!(!crc, 0xCBF4_3926);
    }

    #[test]
    fn test_round_trip() {
        let crc = 0xDEAD_BEEFu32;
        let check = ((crc >> 16) as u16).to_le_bytes();
        let data = encrypt_with_header(b"secret", check, b"attack at dawn");

        let plain = decrypt(b"secret", Verifier::for_entry(20, crc), &data).unwrap();
        assert_eq!(plain, b"attack at dawn");

        let plain = decrypt(b"secret", Verifier::for_entry(10, crc), &data).unwrap();
        assert_eq!(plain, b"attack at dawn");
    }

    #[test]
    fn test_wrong_password_rejected() {
        let crc = 0x1234_5678u32;
        let check = ((crc >> 16) as u16).to_le_bytes();
        let data = encrypt_with_header(b"secret", check, b"payload");

        // Two-byte check: a wrong password passes only with probability 2^-16.
        let result = decrypt(b"wrong", Verifier::for_entry(10, crc), &data);
        assert_eq!(result, Err(CryptoError::IncorrectPassword));
    }

    #[test]
    fn test_version_30_skips_check() {
        let data = encrypt_with_header(b"secret", [0, 0], b"payload");
        let plain = decrypt(b"secret", Verifier::for_entry(63, 0xFFFF_FFFF), &data).unwrap();
        assert_eq!(plain, b"payload");
    }

    #[test]
    fn test_truncated() {
        assert_eq!(
            decrypt(b"pw", Verifier::Skip, &[0u8; 11]),
            Err(CryptoError::Truncated)
        );
    }
}
