//! Name and folder index shared by the container mappers.
//!
//! Every header is reachable by its full name and through exactly one folder
//! bucket. The index is filled once while a container is opened and only read
//! afterwards.

use rustc_hash::FxHashMap;

/// Split a path into its folder (with trailing `/`) and leaf name.
///
/// Folder paths keep their trailing separator in the leaf:
/// `"a/b/c.txt"` → `("a/b/", "c.txt")`, `"a/b/"` → `("a/", "b/")`, `"a/"` → `("", "a/")`.
pub fn split_folder(name: &str) -> (&str, &str) {
    let trimmed = name.strip_suffix('/').unwrap_or(name);
    match trimmed.rfind('/') {
        Some(pos) => name.split_at(pos + 1),
        None => ("", name),
    }
}

#[derive(Debug)]
struct Slot<H> {
    name: String,
    header: H,
}

/// Maps names to headers and folders to the headers they directly contain.
#[derive(Debug)]
pub struct Indexer<H> {
    slots: Vec<Slot<H>>,
    names: FxHashMap<String, usize>,
    folders: FxHashMap<String, Vec<usize>>,
}

impl<H> Indexer<H> {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            names: FxHashMap::default(),
            folders: FxHashMap::default(),
        }
    }

    /// Store `header` under `filename` inside `folder`.
    ///
    /// Inserting a name again replaces its header and keeps its single folder slot.
    pub fn insert(&mut self, folder: &str, filename: &str, header: H) {
        if let Some(&slot) = self.names.get(filename) {
            self.slots[slot].header = header;
            return;
        }

        let slot = self.slots.len();
        self.slots.push(Slot {
            name: filename.to_string(),
            header,
        });
        self.names.insert(filename.to_string(), slot);
        self.folders.entry(folder.to_string()).or_default().push(slot);
    }

    /// Look up a header by its exact name.
    pub fn header(&self, filename: &str) -> Option<&H> {
        self.names.get(filename).map(|&slot| &self.slots[slot].header)
    }

    /// Get the contents of a folder, or `None` if nothing was inserted into it.
    pub fn folder<'a>(&'a self, path: &'a str) -> Option<Folder<'a, H>> {
        self.folders.get(path).map(|slots| Folder {
            indexer: self,
            path,
            slots,
        })
    }

    /// Number of indexed names.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check whether nothing was indexed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<H> Default for Indexer<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// The direct children of one indexed folder.
#[derive(Debug)]
pub struct Folder<'a, H> {
    indexer: &'a Indexer<H>,
    path: &'a str,
    slots: &'a [usize],
}

impl<'a, H> Folder<'a, H> {
    /// Number of direct children.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check whether the folder has no children.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate children as `(name relative to the folder, header)`.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a H)> + 'a {
        let indexer = self.indexer;
        let path = self.path;
        let slots = self.slots;
        slots.iter().map(move |&slot| {
            let slot = &indexer.slots[slot];
            let name = slot.name.strip_prefix(path).unwrap_or(&slot.name);
            (name, &slot.header)
        })
    }
}
