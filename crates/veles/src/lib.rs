//! Veles - transparent access to files inside nested containers.
//!
//! Pathnames pass through any number of ZIP and MGX containers, on disk or in
//! memory: `data/outer.zip/levels/pack.mgx/map.bin` opens `outer.zip`, then
//! `pack.mgx` inside it, then maps `map.bin`.
//!
//! # Crates
//!
//! - [`veles_common`] - Common utilities (memory views, binary reading, CRC32C)
//! - [`veles_archive`] - ZIP and MGX mappers (ZIP64 + AES, block cache, codecs)
//!
//! # Example
//!
//! ```no_run
//! use veles::prelude::*;
//!
//! // List a folder inside an archive
//! let path = Path::open("assets/textures.zip/stone", MapperOptions::default())?;
//! for info in &path {
//!     println!("{} ({} bytes)", info.name, info.size);
//! }
//!
//! // Read a file from a container nested in the archive
//! let file = File::open_in(&path, "variants.mgx/mossy.png")?;
//! println!("{}: {} bytes", file.filename(), file.size());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod file;
mod fs;
mod path;

// Re-export all sub-crates
pub use veles_archive as archive;
pub use veles_common as common;

pub use error::{Error, Result};
pub use file::File;
pub use fs::FileMapper;
pub use path::{MapperChain, Path};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{File, FileMapper, MapperChain, Path};
    pub use veles_archive::{
        create_mapper, ContainerKind, FileIndex, FileInfo, Mapper, MapperOptions,
    };
    pub use veles_common::Memory;
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
