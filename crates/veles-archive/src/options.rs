//! Mapper configuration.

use std::num::NonZeroUsize;

/// Number of decompressed MGX blocks kept resident per container.
pub const DEFAULT_CACHE_CAPACITY: usize = 6;

/// Options shared by every mapper opened along a path.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MapperOptions {
    /// Password for encrypted ZIP entries.
    pub password: Option<String>,
    /// Capacity of the MGX decompressed block cache.
    pub cache_capacity: usize,
    /// Verify the stored checksum of every mapped file.
    pub verify_checksums: bool,
}

impl MapperOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the password used for encrypted entries.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the MGX block cache capacity.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Enable or disable checksum verification.
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Password as a byte string; empty when none was given.
    #[inline]
    pub(crate) fn password_bytes(&self) -> &[u8] {
        self.password.as_deref().unwrap_or_default().as_bytes()
    }

    #[inline]
    pub(crate) fn cache_size(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.cache_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            password: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            verify_checksums: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let options = MapperOptions::new()
            .password("secret")
            .cache_capacity(0)
            .verify_checksums(true);

        assert_eq!(options.password_bytes(), b"secret");
        assert_eq!(options.cache_size().get(), 1);
        assert!(options.verify_checksums);
    }

    #[test]
    fn test_defaults() {
        let options = MapperOptions::default();
        assert!(options.password_bytes().is_empty());
        assert_eq!(options.cache_size().get(), DEFAULT_CACHE_CAPACITY);
        assert!(!options.verify_checksums);
    }
}
