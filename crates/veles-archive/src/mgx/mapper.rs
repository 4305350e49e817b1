//! MGX container mapper.

use tracing::{debug, trace};
use veles_common::{crc, Memory};

use super::cache::{BlockCache, CacheStats};
use super::format::{self, Block, FileRecord, Segment};
use crate::codec;
use crate::indexer::{split_folder, Indexer};
use crate::{Error, FileIndex, FileInfo, Mapper, MapperOptions, Result};

/// A [`Mapper`] over an MGX container.
///
/// Files are assembled from segments of shared blocks:
///
/// - a single segment of a stored block is returned as a view of the container,
/// - a single segment packed into a larger compressed block is sliced out of the
///   block cache,
/// - anything else is decoded segment by segment into a new buffer, in parallel
///   when the `parallel` feature is enabled.
pub struct MgxMapper {
    parent: Memory,
    options: MapperOptions,
    blocks: Vec<Block>,
    index: Indexer<FileRecord>,
    cache: BlockCache,
}

impl MgxMapper {
    /// Parse the block and file tables of `parent`.
    pub fn new(parent: Memory, options: MapperOptions) -> Result<Self> {
        let layout = format::parse(parent.as_slice())?;

        let mut index = Indexer::new();
        for (name, record) in layout.files {
            let (folder, _) = split_folder(&name);
            index.insert(folder, &name, record);
        }

        debug!(
            version = layout.version,
            blocks = layout.blocks.len(),
            files = index.len(),
            "opened MGX container"
        );

        let cache = BlockCache::new(options.cache_size());
        Ok(Self {
            parent,
            options,
            blocks: layout.blocks,
            index,
            cache,
        })
    }

    /// Hit and miss counts of the block cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Number of blocks in the container.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    fn block(&self, index: u32) -> Result<&Block> {
        self.blocks
            .get(index as usize)
            .ok_or_else(|| Error::InvalidSegment {
                name: format!("block {index}"),
                block: index,
            })
    }

    /// Check whether a segment spans the whole decompressed block.
    fn covers_block(&self, segment: &Segment) -> bool {
        self.blocks.get(segment.block as usize).is_some_and(|block| {
            segment.offset == 0 && u64::from(segment.size) == block.uncompressed_size
        })
    }

    /// Raw (possibly compressed) bytes of a block.
    fn block_data(&self, block: &Block) -> Result<Memory> {
        Ok(self.parent.slice(block.offset, block.compressed_size)?)
    }

    /// Decompress a whole block into `dest`, which must be exactly its uncompressed size.
    fn decompress_block_into(&self, index: u32, block: &Block, dest: &mut [u8]) -> Result<()> {
        let src = self.block_data(block)?;
        let written = match block.codec()? {
            Some(codec) => codec::decompress(codec, dest, &src)?,
            None => {
                let len = dest.len().min(src.len());
                dest[..len].copy_from_slice(&src[..len]);
                len
            }
        };

        if written as u64 != block.uncompressed_size {
            return Err(Error::SizeMismatch {
                name: format!("block {index}"),
                expected: block.uncompressed_size,
                actual: written as u64,
            });
        }
        Ok(())
    }

    fn decompress_block(&self, index: u32) -> Result<Memory> {
        let block = self.block(index)?;
        let mut buffer = codec::output_buffer(block.uncompressed_size)?;
        self.decompress_block_into(index, block, &mut buffer)?;
        Ok(Memory::from_vec(buffer))
    }

    fn cached_segment(&self, segment: &Segment) -> Result<Memory> {
        let block = self
            .cache
            .get_or_insert_with(segment.block, || self.decompress_block(segment.block))?;
        Ok(block.slice(u64::from(segment.offset), u64::from(segment.size))?)
    }

    fn stored_segment(&self, segment: &Segment) -> Result<Memory> {
        let block = self.block(segment.block)?;
        Ok(self
            .block_data(block)?
            .slice(u64::from(segment.offset), u64::from(segment.size))?)
    }

    /// Decode one segment into its destination range.
    fn decode_segment(&self, segment: &Segment, dest: &mut [u8]) -> Result<()> {
        let block = self.block(segment.block)?;
        let offset = segment.offset as usize;
        let size = segment.size as usize;

        if !block.is_compressed() {
            let src = self.block_data(block)?;
            let src = src.get(offset..offset + size).ok_or_else(|| Error::InvalidSegment {
                name: format!("block {}", segment.block),
                block: segment.block,
            })?;
            dest.copy_from_slice(src);
            return Ok(());
        }

        if offset == 0 && size as u64 == block.uncompressed_size {
            return self.decompress_block_into(segment.block, block, dest);
        }

        let mut scratch = codec::output_buffer(block.uncompressed_size)?;
        self.decompress_block_into(segment.block, block, &mut scratch)?;
        dest.copy_from_slice(&scratch[offset..offset + size]);
        Ok(())
    }

    /// Assemble a file from all of its segments.
    fn assemble(&self, name: &str, record: &FileRecord) -> Result<Memory> {
        let mut buffer = codec::output_buffer(record.size)?;

        let mut jobs = Vec::with_capacity(record.segments.len());
        let mut rest = buffer.as_mut_slice();
        for segment in &record.segments {
            let size = segment.size as usize;
            if size > rest.len() {
                return Err(Error::InvalidSegment {
                    name: name.to_string(),
                    block: segment.block,
                });
            }
            let (dest, tail) = std::mem::take(&mut rest).split_at_mut(size);
            rest = tail;
            jobs.push((segment, dest));
        }

        self.run(jobs)?;
        Ok(Memory::from_vec(buffer))
    }

    #[cfg(feature = "parallel")]
    fn run(&self, jobs: Vec<(&Segment, &mut [u8])>) -> Result<()> {
        use rayon::prelude::*;

        jobs.into_par_iter()
            .try_for_each(|(segment, dest)| self.decode_segment(segment, dest))
    }

    #[cfg(not(feature = "parallel"))]
    fn run(&self, jobs: Vec<(&Segment, &mut [u8])>) -> Result<()> {
        jobs.into_iter()
            .try_for_each(|(segment, dest)| self.decode_segment(segment, dest))
    }

    fn verify(&self, name: &str, record: &FileRecord, data: &[u8]) -> Result<()> {
        if self.options.verify_checksums && record.checksum != 0 {
            let actual = crc::crc32c(data);
            if actual != record.checksum {
                return Err(Error::ChecksumMismatch {
                    name: name.to_string(),
                    expected: record.checksum,
                    actual,
                });
            }
        }
        Ok(())
    }
}

impl Mapper for MgxMapper {
    fn is_file(&self, name: &str) -> bool {
        self.index
            .header(name)
            .is_some_and(|record| !record.is_folder())
    }

    fn map(&self, name: &str) -> Result<Memory> {
        let record = self
            .index
            .header(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        let memory = match record.segments.as_slice() {
            [] => return Err(Error::IsDirectory(name.to_string())),
            [segment] if !record.compressed => {
                trace!(name, "zero-copy MGX segment");
                self.stored_segment(segment)?
            }
            [segment] if !self.covers_block(segment) => {
                trace!(name, block = segment.block, "shared MGX block");
                self.cached_segment(segment)?
            }
            segments => {
                trace!(name, segments = segments.len(), "assembling MGX segments");
                self.assemble(name, record)?
            }
        };

        self.verify(name, record, &memory)?;
        Ok(memory)
    }

    fn index(&self, folder: &str) -> Result<FileIndex> {
        let mut index = FileIndex::new();
        if let Some(folder) = self.index.folder(folder) {
            for (name, record) in folder.iter() {
                if record.is_folder() {
                    index.emplace(name, 0, FileInfo::DIRECTORY);
                } else {
                    let flags = if record.compressed {
                        FileInfo::COMPRESSED
                    } else {
                        0
                    };
                    index.emplace(name, record.size, flags);
                }
            }
        }
        index.sort_by_name();
        Ok(index)
    }
}

impl std::fmt::Debug for MgxMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MgxMapper")
            .field("size", &self.parent.len())
            .field("blocks", &self.blocks.len())
            .field("files", &self.index.len())
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MgxBuilder;

    fn open(bytes: Vec<u8>) -> (Memory, MgxMapper) {
        let parent = Memory::from_vec(bytes);
        let mapper = MgxMapper::new(parent.clone(), MapperOptions::default()).unwrap();
        (parent, mapper)
    }

    fn names(index: &FileIndex) -> Vec<&str> {
        index.iter().map(|info| info.name.as_str()).collect()
    }

    #[test]
    fn test_greet_is_zero_copy() {
        let (parent, mapper) = open(
            MgxBuilder::new()
                .block(0, b"HELLOWORLD")
                .file("greet.txt", &[(0, 0, 5)])
                .build()
                .unwrap(),
        );

        let memory = mapper.map("greet.txt").unwrap();
        assert_eq!(memory.as_slice(), b"HELLO");
        assert!(memory.shares_storage(&parent));

        let range = parent.as_slice().as_ptr_range();
        assert!(range.contains(&memory.as_slice().as_ptr()));
        assert_eq!(mapper.cache_stats(), CacheStats::default());
    }

    #[test]
    fn test_shared_block_uses_cache() {
        let (_, mapper) = open(
            MgxBuilder::new()
                .block(2, b"first-file|second-file")
                .file("a.txt", &[(0, 0, 10)])
                .file("b.txt", &[(0, 11, 11)])
                .build()
                .unwrap(),
        );

        let first = mapper.map("a.txt").unwrap();
        assert_eq!(first.as_slice(), b"first-file");
        assert_eq!(mapper.cache_stats(), CacheStats { hits: 0, misses: 1 });

        let again = mapper.map("a.txt").unwrap();
        assert_eq!(again.as_slice(), first.as_slice());
        assert_eq!(mapper.cache_stats(), CacheStats { hits: 1, misses: 1 });

        assert_eq!(mapper.map("b.txt").unwrap().as_slice(), b"second-file");
        assert_eq!(mapper.cache_stats(), CacheStats { hits: 2, misses: 1 });
    }

    #[test]
    fn test_concurrent_misses_decompress_once() {
        let (_, mapper) = open(
            MgxBuilder::new()
                .block(2, &b"0123456789".repeat(100))
                .file("part.bin", &[(0, 10, 20)])
                .build()
                .unwrap(),
        );

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let memory = mapper.map("part.bin").unwrap();
                    assert_eq!(memory.as_slice(), b"01234567890123456789");
                });
            }
        });

        assert_eq!(mapper.cache_stats(), CacheStats { hits: 7, misses: 1 });
    }

    #[test]
    fn test_multi_segment_reconstruction() {
        let (parent, mapper) = open(
            MgxBuilder::new()
                .block(2, b"AAAAABBBBB")
                .block(2, b"CCCCCCCC")
                .file("other.txt", &[(0, 0, 5)])
                .file("multi.bin", &[(0, 5, 5), (1, 0, 8), (0, 0, 3)])
                .build()
                .unwrap(),
        );

        let memory = mapper.map("multi.bin").unwrap();
        assert_eq!(memory.as_slice(), b"BBBBBCCCCCCCCAAA");
        assert!(!memory.shares_storage(&parent));
        assert_eq!(mapper.map("other.txt").unwrap().as_slice(), b"AAAAA");
    }

    #[test]
    fn test_mixed_blocks_never_zero_copy() {
        let (parent, mapper) = open(
            MgxBuilder::new()
                .block(0, b"plain-")
                .block(1, b"deflated")
                .file("mixed.txt", &[(0, 0, 6), (1, 0, 8)])
                .build()
                .unwrap(),
        );

        let memory = mapper.map("mixed.txt").unwrap();
        assert_eq!(memory.as_slice(), b"plain-deflated");
        assert!(!memory.shares_storage(&parent));

        let listing = mapper.index("").unwrap();
        assert!(listing.find("mixed.txt").unwrap().is_compressed());
    }

    #[test]
    fn test_whole_compressed_block() {
        let text = b"bzip2 block covering one whole file".repeat(3);
        let (_, mapper) = open(
            MgxBuilder::new()
                .block(3, &text)
                .file("whole.txt", &[(0, 0, text.len() as u32)])
                .build()
                .unwrap(),
        );

        assert_eq!(mapper.map("whole.txt").unwrap().as_slice(), text.as_slice());
        assert_eq!(mapper.cache_stats().misses, 0);
    }

    #[test]
    fn test_listing_and_is_file() {
        let (_, mapper) = open(
            MgxBuilder::new()
                .block(0, b"0123456789")
                .folder("data/")
                .folder("data/deep/")
                .file("data/a.bin", &[(0, 0, 4)])
                .file("data/deep/b.bin", &[(0, 4, 4)])
                .file("top.bin", &[(0, 8, 2)])
                .build()
                .unwrap(),
        );

        assert_eq!(names(&mapper.index("").unwrap()), vec!["data/", "top.bin"]);
        assert_eq!(names(&mapper.index("data/").unwrap()), vec!["a.bin", "deep/"]);
        assert_eq!(names(&mapper.index("data/deep/").unwrap()), vec!["b.bin"]);

        assert!(mapper.is_file("data/a.bin"));
        assert!(!mapper.is_file("data/"));
        assert!(!mapper.is_file("a.bin"));

        assert!(matches!(mapper.map("data/"), Err(Error::IsDirectory(_))));
        assert!(matches!(mapper.map("missing"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_checksum_verification() {
        let bytes = MgxBuilder::new()
            .block(2, b"checked contents")
            .file("good.txt", &[(0, 0, 7)])
            .file("bad.txt", &[(0, 8, 8)])
            .checksum(0xDEAD_BEEF)
            .file("unchecked.txt", &[(0, 0, 16)])
            .checksum(0)
            .build()
            .unwrap();

        let mapper =
            MgxMapper::new(Memory::from_vec(bytes), MapperOptions::new().verify_checksums(true))
                .unwrap();

        assert_eq!(mapper.map("good.txt").unwrap().as_slice(), b"checked");
        assert!(matches!(mapper.map("bad.txt"), Err(Error::ChecksumMismatch { .. })));
        assert!(mapper.map("unchecked.txt").is_ok());
    }

    /// Overwrite the declared uncompressed size of one block.
    fn patch_block_size(bytes: &mut [u8], block: usize, size: u64) {
        let trailer = bytes.len() - format::TRAILER_SIZE;
        let table = u64::from_le_bytes(bytes[trailer + 8..trailer + 16].try_into().unwrap());
        let at = table as usize + 8 + block * 28 + 16;
        bytes[at..at + 8].copy_from_slice(&size.to_le_bytes());
    }

    #[test]
    fn test_oversized_block_is_an_error() {
        let mut bytes = MgxBuilder::new()
            .block(2, b"first|second")
            .file("a.txt", &[(0, 0, 5)])
            .file("both.txt", &[(0, 0, 5), (0, 6, 6)])
            .build()
            .unwrap();
        patch_block_size(&mut bytes, 0, u64::MAX);

        let (_, mapper) = open(bytes);
        assert!(matches!(mapper.map("a.txt"), Err(Error::Allocation(u64::MAX))));
        assert!(matches!(mapper.map("both.txt"), Err(Error::Allocation(u64::MAX))));
        assert!(mapper.cache_stats().misses >= 1);
    }

    #[test]
    fn test_not_a_container() {
        let parent = Memory::from_static(b"PK\x03\x04 not mgx");
        let result = MgxMapper::new(parent, MapperOptions::default());
        assert!(result.is_err());
    }
}
