//! Directory listing entries.

use crate::mapper::ContainerKind;

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileInfo {
    /// Name relative to the listed folder; folders end with `/`.
    pub name: String,
    /// Uncompressed size in bytes (0 for folders).
    pub size: u64,
    /// Combination of the flag constants below.
    pub flags: u32,
}

impl FileInfo {
    /// The entry is a folder.
    pub const DIRECTORY: u32 = 0x01;
    /// The entry is a container file browsable as a folder.
    pub const CONTAINER: u32 = 0x02;
    /// The entry's data is compressed.
    pub const COMPRESSED: u32 = 0x04;
    /// The entry's data is encrypted.
    pub const ENCRYPTED: u32 = 0x08;

    /// Create a listing entry.
    pub fn new(name: impl Into<String>, size: u64, flags: u32) -> Self {
        Self {
            name: name.into(),
            size,
            flags,
        }
    }

    #[inline]
    pub fn is_directory(&self) -> bool {
        self.flags & Self::DIRECTORY != 0
    }

    #[inline]
    pub fn is_container(&self) -> bool {
        self.flags & Self::CONTAINER != 0
    }

    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.flags & Self::COMPRESSED != 0
    }

    #[inline]
    pub fn is_encrypted(&self) -> bool {
        self.flags & Self::ENCRYPTED != 0
    }
}

/// An ordered directory listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileIndex {
    files: Vec<FileInfo>,
}

impl FileIndex {
    /// Create an empty listing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    ///
    /// A file whose extension names a known container is listed a second
    /// time as `name/`, flagged as a container folder.
    pub fn emplace(&mut self, name: impl Into<String>, size: u64, flags: u32) {
        let name = name.into();
        let is_file = flags & FileInfo::DIRECTORY == 0;
        let container = is_file && ContainerKind::from_path(&name).is_some();

        if container {
            let folder = format!("{name}/");
            self.files.push(FileInfo::new(name, size, flags));
            self.files.push(FileInfo::new(
                folder,
                0,
                FileInfo::DIRECTORY | FileInfo::CONTAINER,
            ));
        } else {
            self.files.push(FileInfo::new(name, size, flags));
        }
    }

    /// Find an entry by name.
    pub fn find(&self, name: &str) -> Option<&FileInfo> {
        self.files.iter().find(|info| info.name == name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&FileInfo> {
        self.files.get(index)
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, FileInfo> {
        self.files.iter()
    }

    pub(crate) fn sort_by_name(&mut self) {
        self.files.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

impl<'a> IntoIterator for &'a FileIndex {
    type Item = &'a FileInfo;
    type IntoIter = std::slice::Iter<'a, FileInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let info = FileInfo::new("a.bin", 10, FileInfo::COMPRESSED | FileInfo::ENCRYPTED);
        assert!(info.is_compressed());
        assert!(info.is_encrypted());
        assert!(!info.is_directory());
        assert!(!info.is_container());
    }

    #[test]
    fn test_container_listed_twice() {
        let mut index = FileIndex::new();
        index.emplace("textures.ZIP", 1234, 0);
        index.emplace("readme.txt", 5, 0);
        index.emplace("pack.mgx/", 0, FileInfo::DIRECTORY);

        assert_eq!(index.len(), 4);
        assert_eq!(index.get(0).unwrap().name, "textures.ZIP");

        let folder = index.get(1).unwrap();
        assert_eq!(folder.name, "textures.ZIP/");
        assert!(folder.is_directory());
        assert!(folder.is_container());
        assert_eq!(folder.size, 0);

        assert!(!index.find("pack.mgx/").unwrap().is_container());
    }
}
