//! Path resolution across nested containers.
//!
//! A pathname such as `data/outer.zip/levels/pack.mgx/map.bin` is resolved
//! left to right: every prefix ending at a `/` whose extension names a
//! container, and which the current mapper reports as a file, is opened as a
//! new mapper and resolution continues inside it.

use std::sync::Arc;

use tracing::debug;
use veles_archive::{create_mapper, ContainerKind, FileIndex, FileInfo, Mapper, MapperOptions};
use veles_common::Memory;

use crate::fs::FileMapper;
use crate::{Error, Result};

/// The stack of mappers a pathname passes through.
///
/// Outer mappers are kept alive for as long as the chain exists.
#[derive(Clone)]
pub struct MapperChain {
    mappers: Vec<Arc<dyn Mapper>>,
    inner: String,
}

impl MapperChain {
    /// Resolve `pathname` starting at `root`.
    pub fn resolve(
        root: Arc<dyn Mapper>,
        pathname: &str,
        options: &MapperOptions,
    ) -> Result<Self> {
        Self::descend_from(vec![root], pathname, options)
    }

    /// Resolve `name` relative to the end of this chain.
    pub fn descend(&self, name: &str, options: &MapperOptions) -> Result<Self> {
        let path = format!("{}{}", self.inner, name);
        Self::descend_from(self.mappers.clone(), &path, options)
    }

    fn descend_from(
        mut mappers: Vec<Arc<dyn Mapper>>,
        path: &str,
        options: &MapperOptions,
    ) -> Result<Self> {
        let mut start = 0;

        for (separator, _) in path.match_indices('/') {
            if separator <= start {
                continue;
            }

            let prefix = &path[start..separator];
            let Some(kind) = ContainerKind::from_path(prefix) else {
                continue;
            };

            let Some(current) = mappers.last() else {
                break;
            };
            if !current.is_file(prefix) {
                continue;
            }

            let memory = current.map(prefix)?;
            let mapper = create_mapper(kind, memory, options)?;
            debug!(container = prefix, ?kind, depth = mappers.len(), "entered container");

            mappers.push(Arc::from(mapper));
            start = separator + 1;
        }

        Ok(Self {
            mappers,
            inner: path[start..].to_string(),
        })
    }

    /// The innermost mapper.
    pub fn mapper(&self) -> &dyn Mapper {
        // The chain always holds its root.
        self.mappers[self.mappers.len() - 1].as_ref()
    }

    /// The remainder of the pathname inside the innermost mapper.
    #[inline]
    pub fn inner_path(&self) -> &str {
        &self.inner
    }

    /// Number of containers entered below the root.
    #[inline]
    pub fn depth(&self) -> usize {
        self.mappers.len() - 1
    }
}

impl std::fmt::Debug for MapperChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperChain")
            .field("depth", &self.depth())
            .field("inner", &self.inner)
            .finish()
    }
}

/// A listed folder, on disk or inside any number of nested containers.
#[derive(Debug, Clone)]
pub struct Path {
    pathname: String,
    chain: MapperChain,
    files: FileIndex,
    options: MapperOptions,
}

impl Path {
    /// Open a folder. A missing trailing `/` is added.
    pub fn open(pathname: &str, options: MapperOptions) -> Result<Self> {
        let pathname = folder_name(pathname);
        let chain = MapperChain::resolve(Arc::new(FileMapper::default()), &pathname, &options)?;
        Self::with_chain(pathname, chain, options)
    }

    /// Open an in-memory container as the root folder `@memory.<ext>/`.
    pub fn from_memory(memory: Memory, extension: &str, options: MapperOptions) -> Result<Self> {
        let extension = extension.strip_prefix('.').unwrap_or(extension);
        let kind = ContainerKind::from_extension(extension)
            .ok_or_else(|| Error::NotAContainer(extension.to_string()))?;

        let mapper = create_mapper(kind, memory, &options)?;
        let chain = MapperChain {
            mappers: vec![Arc::from(mapper)],
            inner: String::new(),
        };
        Self::with_chain(format!("@memory.{extension}/"), chain, options)
    }

    fn with_chain(pathname: String, chain: MapperChain, options: MapperOptions) -> Result<Self> {
        let files = chain.mapper().index(chain.inner_path())?;
        Ok(Self {
            pathname,
            chain,
            files,
            options,
        })
    }

    /// Open a subfolder, entering it as a container when it names one.
    pub fn join(&self, name: &str) -> Result<Path> {
        let name = folder_name(name);
        let chain = self.chain.descend(&name, &self.options)?;
        Self::with_chain(
            format!("{}{}", self.pathname, name),
            chain,
            self.options.clone(),
        )
    }

    /// Re-read the listing.
    pub fn refresh(&mut self) -> Result<()> {
        self.files = self.chain.mapper().index(self.chain.inner_path())?;
        Ok(())
    }

    #[inline]
    pub fn pathname(&self) -> &str {
        &self.pathname
    }

    #[inline]
    pub fn options(&self) -> &MapperOptions {
        &self.options
    }

    #[inline]
    pub fn chain(&self) -> &MapperChain {
        &self.chain
    }

    #[inline]
    pub fn index(&self) -> &FileIndex {
        &self.files
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

    pub fn iter(&self) -> std::slice::Iter<'_, FileInfo> {
        self.files.iter()
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a FileInfo;
    type IntoIter = std::slice::Iter<'a, FileInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

fn folder_name(name: &str) -> String {
    let mut name = name.to_string();
    if !name.is_empty() && !name.ends_with('/') {
        name.push('/');
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use veles_archive::testing::{MgxBuilder, ZipBuilder};

    fn names(path: &Path) -> Vec<&str> {
        path.iter().map(|info| info.name.as_str()).collect()
    }

    fn nested_zip() -> Vec<u8> {
        let inner = ZipBuilder::new()
            .stored("deep.txt", b"deep contents")
            .build()
            .unwrap();
        let pack = MgxBuilder::new()
            .block(2, b"HELLOWORLD")
            .file("greet.txt", &[(0, 0, 5)])
            .build()
            .unwrap();

        ZipBuilder::new()
            .stored("docs/readme.txt", b"read me")
            .stored("inner.zip", &inner)
            .deflated("pack.mgx", &pack)
            .build()
            .unwrap()
    }

    #[test]
    fn test_resolve_nested() {
        let root: Arc<dyn Mapper> = Arc::from(
            create_mapper(
                ContainerKind::Zip,
                Memory::from_vec(nested_zip()),
                &MapperOptions::default(),
            )
            .unwrap(),
        );

        let chain =
            MapperChain::resolve(root.clone(), "inner.zip/deep.txt", &MapperOptions::default())
                .unwrap();
        assert_eq!(chain.depth(), 1);
        assert_eq!(chain.inner_path(), "deep.txt");
        assert_eq!(chain.mapper().map("deep.txt").unwrap().as_slice(), b"deep contents");

        let chain =
            MapperChain::resolve(root.clone(), "pack.mgx/greet.txt", &MapperOptions::default())
                .unwrap();
        assert_eq!(chain.depth(), 1);
        assert_eq!(chain.mapper().map(chain.inner_path()).unwrap().as_slice(), b"HELLO");

        let chain = MapperChain::resolve(root, "docs/readme.txt", &MapperOptions::default()).unwrap();
        assert_eq!(chain.depth(), 0);
        assert_eq!(chain.inner_path(), "docs/readme.txt");
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("outer.zip"), nested_zip()).unwrap();
        let base = dir.path().to_str().unwrap();

        let root = Path::open(base, MapperOptions::default()).unwrap();
        assert_eq!(names(&root), ["outer.zip", "outer.zip/"]);

        let outer = root.join("outer.zip").unwrap();
        assert_eq!(outer.pathname(), format!("{base}/outer.zip/"));
        assert_eq!(outer.chain().depth(), 1);
        assert_eq!(
            names(&outer),
            ["docs/", "inner.zip", "inner.zip/", "pack.mgx", "pack.mgx/"]
        );

        let inner = outer.join("inner.zip/").unwrap();
        assert_eq!(inner.chain().depth(), 2);
        assert_eq!(names(&inner), ["deep.txt"]);

        let docs = Path::open(&format!("{base}/outer.zip/docs"), MapperOptions::default()).unwrap();
        assert_eq!(names(&docs), ["readme.txt"]);
        assert_eq!(docs.get(0).unwrap().size, 7);
    }

    #[test]
    fn test_directory_named_like_container() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("fake.zip")).unwrap();
        std::fs::write(dir.path().join("fake.zip/plain.txt"), b"plain").unwrap();

        let path = Path::open(
            &format!("{}/fake.zip/", dir.path().display()),
            MapperOptions::default(),
        )
        .unwrap();
        assert_eq!(path.chain().depth(), 0);
        assert_eq!(names(&path), ["plain.txt"]);
    }

    #[test]
    fn test_from_memory() {
        let memory = Memory::from_vec(nested_zip());
        let path = Path::from_memory(memory.clone(), ".zip", MapperOptions::default()).unwrap();
        assert_eq!(path.pathname(), "@memory.zip/");
        assert_eq!(path.len(), 5);

        let pack = path.join("pack.mgx").unwrap();
        assert_eq!(pack.pathname(), "@memory.zip/pack.mgx/");
        assert_eq!(names(&pack), ["greet.txt"]);

        assert!(matches!(
            Path::from_memory(memory, "txt", MapperOptions::default()),
            Err(Error::NotAContainer(ext)) if ext == "txt"
        ));
    }

    #[test]
    fn test_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let mut path = Path::open(dir.path().to_str().unwrap(), MapperOptions::default()).unwrap();
        assert!(path.is_empty());

        std::fs::write(dir.path().join("late.txt"), b"x").unwrap();
        path.refresh().unwrap();
        assert_eq!(names(&path), ["late.txt"]);
    }

    #[test]
    fn test_folder_name() {
        assert_eq!(folder_name(""), "");
        assert_eq!(folder_name("a"), "a/");
        assert_eq!(folder_name("a/"), "a/");
    }
}
