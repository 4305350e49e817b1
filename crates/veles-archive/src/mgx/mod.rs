//! MGX block container support.
//!
//! An MGX container packs many files into a flat list of independently
//! compressed blocks; a file is an ordered list of segments of those blocks.

mod cache;
mod format;
mod mapper;

pub use cache::{BlockCache, CacheStats};
pub use format::{Block, FileRecord, Layout, Segment};
pub use mapper::MgxMapper;
