//! The mapper abstraction and the container registry.

use veles_common::Memory;

use crate::indexer::split_folder;
use crate::mgx::MgxMapper;
use crate::zip::ZipMapper;
use crate::{FileIndex, MapperOptions, Result};

/// Read-only access to the files of one opened container.
///
/// All answers come from metadata parsed when the mapper was created.
pub trait Mapper: Send + Sync {
    /// Check whether `name` is a file (not a folder) in this container.
    fn is_file(&self, name: &str) -> bool;

    /// Map the contents of a file.
    ///
    /// The returned memory shares storage with the container when the file could be
    /// served without decompression or decryption.
    fn map(&self, name: &str) -> Result<Memory>;

    /// List the direct children of a folder (`""` is the root, folders end with `/`).
    fn index(&self, folder: &str) -> Result<FileIndex>;
}

/// Container formats that can be opened as a [`Mapper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// PKWARE ZIP (including ZIP64, classic and AES encryption).
    Zip,
    /// MGX block container.
    Mgx,
}

impl ContainerKind {
    /// Registered file extensions (lowercase, without dot).
    pub const EXTENSIONS: &'static [(&'static str, ContainerKind)] = &[
        ("zip", ContainerKind::Zip),
        ("cbz", ContainerKind::Zip),
        ("mgx", ContainerKind::Mgx),
        ("snitch", ContainerKind::Mgx),
    ];

    /// Look up a container kind by extension (case-insensitive, dot optional).
    pub fn from_extension(extension: &str) -> Option<Self> {
        let extension = extension.strip_prefix('.').unwrap_or(extension);
        Self::EXTENSIONS
            .iter()
            .find(|(ext, _)| ext.eq_ignore_ascii_case(extension))
            .map(|&(_, kind)| kind)
    }

    /// Look up a container kind from the extension of a file name.
    pub fn from_path(name: &str) -> Option<Self> {
        let (_, leaf) = split_folder(name);
        let (_, extension) = leaf.rsplit_once('.')?;
        Self::from_extension(extension)
    }
}

/// Open `parent` as a container of the given kind.
pub fn create_mapper(
    kind: ContainerKind,
    parent: Memory,
    options: &MapperOptions,
) -> Result<Box<dyn Mapper>> {
    let mapper: Box<dyn Mapper> = match kind {
        ContainerKind::Zip => Box::new(ZipMapper::new(parent, options.clone())?),
        ContainerKind::Mgx => Box::new(MgxMapper::new(parent, options.clone())?),
    };
    Ok(mapper)
}
