//! Shared, reference-counted byte views.
//!
//! A [`Memory`] is either a view into a longer-lived storage (the resident bytes of
//! a parent container) or the sole owner of a freshly allocated buffer. Both cases
//! are the same type: the storage is reference counted, so a view handed out to a
//! caller keeps its bytes alive even after the producer drops its own reference.

use std::fmt;
use std::fs::File;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use crate::{Error, Result};

type Storage = Arc<dyn AsRef<[u8]> + Send + Sync>;

/// An immutable byte range backed by shared storage.
///
/// Cloning and slicing never copy bytes.
#[derive(Clone)]
pub struct Memory {
    storage: Storage,
    offset: usize,
    len: usize,
}

impl Memory {
    /// Take ownership of a heap buffer.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            storage: Arc::new(data),
            offset: 0,
            len,
        }
    }

    /// Wrap a static byte slice.
    pub fn from_static(data: &'static [u8]) -> Self {
        Self {
            storage: Arc::new(data),
            offset: 0,
            len: data.len(),
        }
    }

    /// Memory-map a file read-only.
    pub fn map_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        if file.metadata()?.len() == 0 {
            return Ok(Self::from_vec(Vec::new()));
        }

        // The mapping is private and read-only; it stays valid for as long as any view holds it.
        let mmap = unsafe { Mmap::map(&file)? };
        let len = mmap.len();

        Ok(Self {
            storage: Arc::new(mmap),
            offset: 0,
            len,
        })
    }

    /// Get the viewed bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        let bytes: &[u8] = (*self.storage).as_ref();
        &bytes[self.offset..self.offset + self.len]
    }

    /// Number of bytes in the view.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the view is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Create a sub-view sharing the same storage.
    pub fn slice(&self, offset: u64, len: u64) -> Result<Self> {
        let out_of_bounds = || Error::OutOfBounds {
            offset,
            len,
            size: self.len,
        };

        let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
        let count = usize::try_from(len).map_err(|_| out_of_bounds())?;
        let end = start.checked_add(count).ok_or_else(out_of_bounds)?;
        if end > self.len {
            return Err(out_of_bounds());
        }

        Ok(Self {
            storage: Arc::clone(&self.storage),
            offset: self.offset + start,
            len: count,
        })
    }

    /// Check whether two views reference the same underlying storage.
    ///
    /// A file mapped without decompression or decryption shares storage with its
    /// container; anything that had to be materialized does not.
    #[inline]
    pub fn shares_storage(&self, other: &Memory) -> bool {
        Arc::as_ptr(&self.storage) as *const u8 == Arc::as_ptr(&other.storage) as *const u8
    }
}

impl Deref for Memory {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for Memory {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<Vec<u8>> for Memory {
    fn from(data: Vec<u8>) -> Self {
        Self::from_vec(data)
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::from_static(&[])
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_slice_shares_storage() {
        let memory = Memory::from_vec(b"HELLOWORLD".to_vec());
        let hello = memory.slice(0, 5).unwrap();
        let world = memory.slice(5, 5).unwrap();

        assert_eq!(&*hello, b"HELLO");
        assert_eq!(&*world, b"WORLD");
        assert!(hello.shares_storage(&memory));
        assert!(world.shares_storage(&hello));

        let range = memory.as_slice().as_ptr_range();
        assert!(range.contains(&world.as_ptr()));
    }

    #[test]
    fn test_nested_slice() {
        let memory = Memory::from_static(b"0123456789");
        let inner = memory.slice(2, 6).unwrap().slice(1, 3).unwrap();
        assert_eq!(&*inner, b"345");
    }

    #[test]
    fn test_slice_out_of_bounds() {
        let memory = Memory::from_vec(vec![0u8; 8]);
        assert!(matches!(
            memory.slice(4, 5),
            Err(Error::OutOfBounds { offset: 4, len: 5, size: 8 })
        ));
        assert!(memory.slice(u64::MAX, 1).is_err());
        assert!(memory.slice(8, 0).unwrap().is_empty());
    }

    #[test]
    fn test_distinct_storage() {
        let a = Memory::from_vec(vec![1, 2, 3]);
        let b = Memory::from_vec(vec![1, 2, 3]);
        assert!(!a.shares_storage(&b));
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_view_outlives_parent() {
        let view = {
            let parent = Memory::from_vec(b"container bytes".to_vec());
            parent.slice(10, 5).unwrap()
        };
        assert_eq!(&*view, b"bytes");
    }

    #[test]
    fn test_map_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"mapped contents").unwrap();
        file.flush().unwrap();

        let memory = Memory::map_file(file.path()).unwrap();
        assert_eq!(&*memory, b"mapped contents");

        let empty = tempfile::NamedTempFile::new().unwrap();
        assert!(Memory::map_file(empty.path()).unwrap().is_empty());
    }
}
