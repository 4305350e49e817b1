//! Container mappers for Veles.
//!
//! This crate opens ZIP and MGX containers held in memory and maps the files
//! inside them:
//!
//! - [`ZipMapper`] - PKWARE ZIP with ZIP64, traditional and WinZip AES encryption
//! - [`MgxMapper`] - segmented block container with a shared decompression cache
//! - [`Indexer`] - name and folder lookup shared by both mappers
//!
//! Files that can be served without decompression or decryption are returned as
//! views of the container's own bytes.
//!
//! # Example
//!
//! ```no_run
//! use veles_archive::{create_mapper, ContainerKind, MapperOptions};
//! use veles_common::Memory;
//!
//! let memory = Memory::map_file("assets.zip")?;
//! let mapper = create_mapper(ContainerKind::Zip, memory, &MapperOptions::default())?;
//!
//! for info in &mapper.index("")? {
//!     println!("{} ({} bytes)", info.name, info.size);
//! }
//!
//! let data = mapper.map("textures/stone.png")?;
//! println!("{} bytes", data.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod codec;
pub mod crypto;
mod error;
mod indexer;
mod info;
mod mapper;
pub mod mgx;
mod options;
mod scan;
pub mod zip;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Error, Result};
pub use indexer::{split_folder, Folder, Indexer};
pub use info::{FileIndex, FileInfo};
pub use mapper::{create_mapper, ContainerKind, Mapper};
pub use mgx::{CacheStats, MgxMapper};
pub use options::{MapperOptions, DEFAULT_CACHE_CAPACITY};
pub use zip::ZipMapper;
