//! Native filesystem as the root of every path chain.

use std::path::PathBuf;

use tracing::trace;
use veles_archive::{Error, FileIndex, FileInfo, Mapper, Result};
use veles_common::Memory;

/// A [`Mapper`] over a directory of the native filesystem.
///
/// Names are joined onto the root, so absolute names bypass it.
#[derive(Debug, Clone)]
pub struct FileMapper {
    root: PathBuf,
}

impl FileMapper {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl Default for FileMapper {
    fn default() -> Self {
        Self::new(".")
    }
}

impl Mapper for FileMapper {
    fn is_file(&self, name: &str) -> bool {
        self.resolve(name).is_file()
    }

    fn map(&self, name: &str) -> Result<Memory> {
        let path = self.resolve(name);
        if path.is_dir() {
            return Err(Error::IsDirectory(name.to_string()));
        }
        if !path.is_file() {
            return Err(Error::NotFound(name.to_string()));
        }

        trace!(path = %path.display(), "mapping native file");
        Ok(Memory::map_file(&path)?)
    }

    fn index(&self, folder: &str) -> Result<FileIndex> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(self.resolve(folder))? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            let mut name = entry.file_name().to_string_lossy().into_owned();

            if metadata.is_dir() {
                name.push('/');
                entries.push((name, 0, FileInfo::DIRECTORY));
            } else {
                entries.push((name, metadata.len(), 0));
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut index = FileIndex::new();
        for (name, size, flags) in entries {
            index.emplace(name, size, flags);
        }
        Ok(index)
    }
}
