//! WinZip AES encryption (AE-1 / AE-2).
//!
//! Layout of an encrypted payload: salt, 2-byte password verifier, ciphertext,
//! 10-byte truncated HMAC-SHA1 of the ciphertext. Key material comes from
//! PBKDF2-HMAC-SHA1 and the cipher is AES in CTR mode with a little-endian
//! counter starting at 1.

use aes::{Aes128, Aes192, Aes256};
use cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128LE;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::CryptoError;

type HmacSha1 = Hmac<Sha1>;

/// PBKDF2 iteration count.
pub const ITERATIONS: u32 = 1000;

/// Length of the password verification value.
pub const VERIFIER_LEN: usize = 2;

/// Length of the stored authentication code.
pub const TAG_LEN: usize = 10;

/// AES key strength, from the mode byte of the `0x9901` extra field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strength {
    Aes128,
    Aes192,
    Aes256,
}

impl Strength {
    /// Decode the extra field's mode byte.
    pub fn from_mode(mode: u8) -> Option<Self> {
        match mode {
            1 => Some(Strength::Aes128),
            2 => Some(Strength::Aes192),
            3 => Some(Strength::Aes256),
            _ => None,
        }
    }

    /// The extra field's mode byte.
    pub fn mode(self) -> u8 {
        match self {
            Strength::Aes128 => 1,
            Strength::Aes192 => 2,
            Strength::Aes256 => 3,
        }
    }

    /// AES key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Strength::Aes128 => 16,
            Strength::Aes192 => 24,
            Strength::Aes256 => 32,
        }
    }

    /// Salt length in bytes.
    pub fn salt_len(self) -> usize {
        self.key_len() / 2
    }
}

/// Derived key material: encryption key, authentication key, verifier.
struct KeyMaterial {
    bytes: Vec<u8>,
    key_len: usize,
}

impl KeyMaterial {
    fn derive(password: &[u8], salt: &[u8], strength: Strength) -> Self {
        let key_len = strength.key_len();
        let mut bytes = vec![0u8; key_len * 2 + VERIFIER_LEN];
        pbkdf2::pbkdf2_hmac::<Sha1>(password, salt, ITERATIONS, &mut bytes);
        Self { bytes, key_len }
    }

    fn encryption_key(&self) -> &[u8] {
        &self.bytes[..self.key_len]
    }

    fn authentication_key(&self) -> &[u8] {
        &self.bytes[self.key_len..self.key_len * 2]
    }

    fn verifier(&self) -> &[u8] {
        &self.bytes[self.key_len * 2..]
    }

    fn mac(&self) -> Result<HmacSha1, CryptoError> {
        <HmacSha1 as Mac>::new_from_slice(self.authentication_key())
            .map_err(|_| CryptoError::AuthenticationFailed)
    }

    fn apply_keystream(&self, strength: Strength, data: &mut [u8]) {
        let mut iv = [0u8; 16];
        iv[0] = 1;

        // Key and IV lengths are fixed by the strength, so construction cannot fail.
        match strength {
            Strength::Aes128 => {
                if let Ok(mut cipher) = Ctr128LE::<Aes128>::new_from_slices(self.encryption_key(), &iv) {
                    cipher.apply_keystream(data);
                }
            }
            Strength::Aes192 => {
                if let Ok(mut cipher) = Ctr128LE::<Aes192>::new_from_slices(self.encryption_key(), &iv) {
                    cipher.apply_keystream(data);
                }
            }
            Strength::Aes256 => {
                if let Ok(mut cipher) = Ctr128LE::<Aes256>::new_from_slices(self.encryption_key(), &iv) {
                    cipher.apply_keystream(data);
                }
            }
        }
    }
}

/// Verify and decrypt an AES-encrypted entry payload.
///
/// The password verifier is checked first, then the authentication code over the
/// ciphertext; only then is the ciphertext decrypted.
pub fn decrypt(password: &[u8], strength: Strength, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let salt_len = strength.salt_len();
    if data.len() < salt_len + VERIFIER_LEN + TAG_LEN {
        return Err(CryptoError::Truncated);
    }

    let (salt, rest) = data.split_at(salt_len);
    let (verifier, rest) = rest.split_at(VERIFIER_LEN);
    let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);

    let keys = KeyMaterial::derive(password, salt, strength);
    if keys.verifier() != verifier {
        return Err(CryptoError::IncorrectPassword);
    }

    let mut mac = keys.mac()?;
    mac.update(ciphertext);
    mac.verify_truncated_left(tag)
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    let mut plain = ciphertext.to_vec();
    keys.apply_keystream(strength, &mut plain);
    Ok(plain)
}

/// Encrypt a payload into the layout [`decrypt`] expects.
#[cfg(any(test, feature = "testing"))]
pub fn encrypt(password: &[u8], strength: Strength, salt: &[u8], plain: &[u8]) -> Vec<u8> {
    let keys = KeyMaterial::derive(password, salt, strength);

    let mut ciphertext = plain.to_vec();
    keys.apply_keystream(strength, &mut ciphertext);

    let mut out = Vec::with_capacity(salt.len() + VERIFIER_LEN + ciphertext.len() + TAG_LEN);
    out.extend_from_slice(salt);
    out.extend_from_slice(keys.verifier());
    out.extend_from_slice(&ciphertext);

    if let Ok(mut mac) = keys.mac() {
        mac.update(&ciphertext);
        out.extend_from_slice(&mac.finalize().into_bytes()[..TAG_LEN]);
    }
    out
}
