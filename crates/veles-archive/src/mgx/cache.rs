//! Decompressed block cache.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;
use veles_common::Memory;

use crate::Result;

/// Hit and miss counts of a [`BlockCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Bounded LRU cache of fully decompressed blocks, keyed by block index.
///
/// The lock is held while a missing block is decompressed, so every block is
/// decompressed at most once while it stays resident, at the cost of
/// serializing concurrent misses on different blocks. Evicting a block only
/// drops the cache's reference; views handed out earlier stay valid.
pub struct BlockCache {
    blocks: Mutex<LruCache<u32, Memory>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BlockCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            blocks: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get a block, decompressing and inserting it on a miss.
    pub fn get_or_insert_with<F>(&self, block: u32, decompress: F) -> Result<Memory>
    where
        F: FnOnce() -> Result<Memory>,
    {
        let mut blocks = self.blocks.lock();

        if let Some(memory) = blocks.get(&block) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(block, "block cache hit");
            return Ok(memory.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(block, "block cache miss");

        let memory = decompress()?;
        blocks.put(block, memory.clone());
        Ok(memory)
    }

    /// Number of resident blocks.
    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCache")
            .field("resident", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}
