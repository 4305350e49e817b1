//! ZIP entry decryption.
//!
//! Both schemes verify before they release plaintext: a wrong password or a
//! tampered payload is reported without returning any decrypted bytes.

pub mod aes;
pub mod classic;

use crate::Error;

/// Why an encrypted payload could not be decrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// The payload is shorter than its fixed header and trailer.
    Truncated,
    /// The password verification value did not match.
    IncorrectPassword,
    /// The message authentication code did not match.
    AuthenticationFailed,
}

impl CryptoError {
    /// Attach the entry name.
    pub(crate) fn into_error(self, name: &str) -> Error {
        match self {
            CryptoError::Truncated => {
                Error::Decryption(format!("\"{name}\": encrypted data is truncated"))
            }
            CryptoError::IncorrectPassword => Error::IncorrectPassword(name.to_string()),
            CryptoError::AuthenticationFailed => Error::AuthenticationFailed(name.to_string()),
        }
    }
}
