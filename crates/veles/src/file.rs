//! Files opened through a path chain.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use veles_archive::{split_folder, MapperOptions};
use veles_common::Memory;

use crate::fs::FileMapper;
use crate::path::{MapperChain, Path};
use crate::Result;

/// The mapped contents of one file.
///
/// Reading goes straight through the mapped view; for stored entries that
/// view is the container's own bytes.
#[derive(Debug, Clone)]
pub struct File {
    pathname: String,
    memory: Memory,
    position: u64,
}

impl File {
    /// Open a file by its full pathname.
    pub fn open(pathname: &str, options: MapperOptions) -> Result<Self> {
        let chain = MapperChain::resolve(Arc::new(FileMapper::default()), pathname, &options)?;
        Self::from_chain(pathname.to_string(), &chain)
    }

    /// Open a file relative to an already resolved folder.
    pub fn open_in(path: &Path, name: &str) -> Result<Self> {
        let chain = path.chain().descend(name, path.options())?;
        Self::from_chain(format!("{}{}", path.pathname(), name), &chain)
    }

    fn from_chain(pathname: String, chain: &MapperChain) -> Result<Self> {
        let memory = chain.mapper().map(chain.inner_path())?;
        Ok(Self {
            pathname,
            memory,
            position: 0,
        })
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        self.memory.as_slice()
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.memory.len() as u64
    }

    /// The last component of the pathname.
    pub fn filename(&self) -> &str {
        split_folder(&self.pathname).1
    }

    #[inline]
    pub fn pathname(&self) -> &str {
        &self.pathname
    }

    /// The underlying view, shareable without copying.
    #[inline]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }
}

impl Read for File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.memory.as_slice();
        let start = usize::try_from(self.position)
            .unwrap_or(usize::MAX)
            .min(data.len());
        let count = buf.len().min(data.len() - start);

        buf[..count].copy_from_slice(&data[start..start + count]);
        self.position += count as u64;
        Ok(count)
    }
}

impl Seek for File {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, offset) = match pos {
            SeekFrom::Start(offset) => {
                self.position = offset;
                return Ok(offset);
            }
            SeekFrom::End(offset) => (self.size(), offset),
            SeekFrom::Current(offset) => (self.position, offset),
        };

        match base.checked_add_signed(offset) {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            )),
        }
    }
}
