//! MGX on-disk layout.
//!
//! ```text
//! "mgx0"                                   container marker at offset 0
//! block data ...
//! "mgx1" u32 count                         block table
//!     { u64 offset, u64 compressed, u64 uncompressed, u32 method } * count
//! "mgx2" u64 compressed u64 uncompressed   file table (zstd blob)
//!     blob ...
//! "mgx3" u32 version u64 blocks u64 files  trailer, last 24 bytes
//! ```
//!
//! The magic closing one table opens the next one, so the block table ends on
//! the file table's `"mgx2"` and the file table ends on the trailer's `"mgx3"`.

use veles_common::BinaryReader;

use crate::codec::{self, Codec};
use crate::{Error, Result};

pub const MAGIC_HEADER: &[u8; 4] = b"mgx0";
pub const MAGIC_BLOCKS: &[u8; 4] = b"mgx1";
pub const MAGIC_FILES: &[u8; 4] = b"mgx2";
pub const MAGIC_TRAILER: &[u8; 4] = b"mgx3";

/// Size of the trailer at the end of the container.
pub const TRAILER_SIZE: usize = 24;

/// Largest accepted expansion of the compressed file table.
pub const MAX_INDEX_RATIO: u64 = 1 << 12;

/// A physical block: a compressed range of the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub offset: u64,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub method: u32,
}

impl Block {
    /// Check whether the block needs decompression.
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.method != 0
    }

    /// The codec for this block, `None` when stored.
    pub fn codec(&self) -> Result<Option<Codec>> {
        let codec = match self.method {
            0 => return Ok(None),
            1 => Codec::Deflate,
            2 => Codec::Zstd,
            3 => Codec::Bzip2,
            4 => Codec::Lzma,
            5 => Codec::Xz,
            6 => Codec::Ppmd,
            other => {
                return Err(Error::UnsupportedCompression(
                    u16::try_from(other).unwrap_or(u16::MAX),
                ))
            }
        };
        Ok(Some(codec))
    }
}

/// A byte range of one block's decompressed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub block: u32,
    pub offset: u32,
    pub size: u32,
}

/// Metadata of one logical file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub size: u64,
    /// CRC-32C of the contents, 0 when not stored.
    pub checksum: u32,
    /// Set when any referenced block is compressed.
    pub compressed: bool,
    pub segments: Vec<Segment>,
}

impl FileRecord {
    #[inline]
    pub fn is_folder(&self) -> bool {
        self.segments.is_empty()
    }

    #[inline]
    pub fn is_multi_segment(&self) -> bool {
        self.segments.len() > 1
    }
}

/// Everything parsed from a container.
#[derive(Debug, Default)]
pub struct Layout {
    pub version: u32,
    pub blocks: Vec<Block>,
    pub files: Vec<(String, FileRecord)>,
}

/// Parse the block table and the file table of a container.
pub fn parse(data: &[u8]) -> Result<Layout> {
    BinaryReader::new(data).expect_magic(MAGIC_HEADER)?;

    let mut trailer = BinaryReader::new_at(data, data.len().saturating_sub(TRAILER_SIZE));
    trailer.expect_magic(MAGIC_TRAILER)?;
    let version = trailer.read_u32()?;
    let block_table_offset = trailer.read_u64()?;
    let file_table_offset = trailer.read_u64()?;

    let blocks = parse_blocks(data, block_table_offset)?;
    let files = parse_files(data, file_table_offset, &blocks)?;

    Ok(Layout {
        version,
        blocks,
        files,
    })
}

fn reader_at(data: &[u8], offset: u64) -> BinaryReader<'_> {
    BinaryReader::new_at(data, usize::try_from(offset).unwrap_or(usize::MAX))
}

fn parse_blocks(data: &[u8], offset: u64) -> Result<Vec<Block>> {
    let mut reader = reader_at(data, offset);
    reader.expect_magic(MAGIC_BLOCKS)?;

    let count = reader.read_u32()?;
    let mut blocks = Vec::with_capacity(count.min(1 << 16) as usize);
    for _ in 0..count {
        let block = Block {
            offset: reader.read_u64()?,
            compressed_size: reader.read_u64()?,
            uncompressed_size: reader.read_u64()?,
            method: reader.read_u32()?,
        };

        let in_bounds = block
            .offset
            .checked_add(block.compressed_size)
            .is_some_and(|end| end <= data.len() as u64);
        if !in_bounds {
            return Err(veles_common::Error::OutOfBounds {
                offset: block.offset,
                len: block.compressed_size,
                size: data.len(),
            }
            .into());
        }
        blocks.push(block);
    }

    reader.clone().expect_magic(MAGIC_FILES)?;
    Ok(blocks)
}

fn parse_files(data: &[u8], offset: u64, blocks: &[Block]) -> Result<Vec<(String, FileRecord)>> {
    let mut reader = reader_at(data, offset);
    reader.expect_magic(MAGIC_FILES)?;

    let compressed_size = reader.read_u64()?;
    let uncompressed_size = reader.read_u64()?;
    let blob = reader.read_bytes(usize::try_from(compressed_size).unwrap_or(usize::MAX))?;
    reader.clone().expect_magic(MAGIC_TRAILER)?;

    if uncompressed_size > compressed_size.saturating_mul(MAX_INDEX_RATIO) {
        return Err(Error::ImplausibleSize {
            name: "file table".to_string(),
            size: uncompressed_size,
        });
    }

    let mut index = codec::output_buffer(uncompressed_size)?;
    let written = codec::decompress(Codec::Zstd, &mut index, blob)?;
    if written as u64 != uncompressed_size {
        return Err(Error::IndexSizeMismatch {
            expected: uncompressed_size,
            actual: written as u64,
        });
    }

    let mut reader = BinaryReader::new(&index);
    let count = reader.read_u32()?;
    let mut files = Vec::with_capacity(count.min(1 << 16) as usize);

    for _ in 0..count {
        let name_len = reader.read_u32()? as usize;
        let name_bytes = reader.read_bytes(name_len)?;
        let name = match std::str::from_utf8(name_bytes) {
            Ok(name) => name.to_string(),
            Err(_) => {
                let lossy = String::from_utf8_lossy(name_bytes).into_owned();
                return Err(Error::InvalidFileName(lossy));
            }
        };
        let size = reader.read_u64()?;
        let checksum = reader.read_u32()?;
        let segment_count = reader.read_u32()?;

        let mut segments = Vec::with_capacity(segment_count.min(1 << 12) as usize);
        let mut compressed = false;
        let mut total = 0u64;
        for _ in 0..segment_count {
            let segment = Segment {
                block: reader.read_u32()?,
                offset: reader.read_u32()?,
                size: reader.read_u32()?,
            };

            let block = blocks
                .get(segment.block as usize)
                .filter(|block| {
                    u64::from(segment.offset) + u64::from(segment.size) <= block.uncompressed_size
                })
                .ok_or_else(|| Error::InvalidSegment {
                    name: name.clone(),
                    block: segment.block,
                })?;

            compressed |= block.is_compressed();
            total += u64::from(segment.size);
            segments.push(segment);
        }

        if total != size && !segments.is_empty() {
            return Err(Error::SizeMismatch {
                name,
                expected: size,
                actual: total,
            });
        }

        files.push((
            name,
            FileRecord {
                size,
                checksum,
                compressed,
                segments,
            },
        ));
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MgxBuilder;

    #[test]
    fn test_parse_layout() {
        let data = MgxBuilder::new()
            .block(0, b"HELLOWORLD")
            .block(2, b"compressed block contents")
            .folder("docs/")
            .file("docs/greet.txt", &[(0, 0, 5)])
            .file("docs/mixed.bin", &[(0, 5, 5), (1, 0, 10)])
            .build()
            .unwrap();

        let layout = parse(&data).unwrap();
        assert_eq!(layout.version, 1);
        assert_eq!(layout.blocks.len(), 2);
        assert_eq!(layout.blocks[0].uncompressed_size, 10);
        assert!(!layout.blocks[0].is_compressed());
        assert!(layout.blocks[1].is_compressed());

        let (name, folder) = &layout.files[0];
        assert_eq!(name, "docs/");
        assert!(folder.is_folder());

        let (_, greet) = &layout.files[1];
        assert!(!greet.compressed);
        assert!(!greet.is_multi_segment());

        let (_, mixed) = &layout.files[2];
        assert_eq!(mixed.size, 15);
        assert!(mixed.compressed);
        assert!(mixed.is_multi_segment());
    }

    #[test]
    fn test_bad_header_magic() {
        let mut data = MgxBuilder::new().block(0, b"x").file("x", &[(0, 0, 1)]).build().unwrap();
        data[3] = b'9';
        assert!(matches!(
            parse(&data),
            Err(Error::Common(veles_common::Error::InvalidMagic { .. }))
        ));
    }

    #[test]
    fn test_bad_trailer_magic() {
        let mut data = MgxBuilder::new().block(0, b"x").file("x", &[(0, 0, 1)]).build().unwrap();
        let trailer = data.len() - TRAILER_SIZE;
        data[trailer] = b'X';
        assert!(parse(&data).is_err());
    }

    #[test]
    fn test_index_size_mismatch() {
        let data = MgxBuilder::new()
            .block(0, b"abc")
            .file("abc", &[(0, 0, 3)])
            .misdeclare_index_size()
            .build()
            .unwrap();
        assert!(matches!(parse(&data), Err(Error::IndexSizeMismatch { .. })));
    }

    #[test]
    fn test_implausible_index_size() {
        let mut data = MgxBuilder::new()
            .block(0, b"abc")
            .file("abc", &[(0, 0, 3)])
            .build()
            .unwrap();
        let table = u64::from_le_bytes(data[data.len() - 8..].try_into().unwrap()) as usize;
        // "mgx2", compressed size, then the declared uncompressed size.
        data[table + 12..table + 20].copy_from_slice(&u64::MAX.to_le_bytes());

        assert!(matches!(
            parse(&data),
            Err(Error::ImplausibleSize { size: u64::MAX, .. })
        ));
    }

    #[test]
    fn test_invalid_utf8_name() {
        let data = MgxBuilder::new()
            .block(0, b"abcd")
            .file_with_raw_name(b"bad\xFF.bin", &[(0, 0, 2)])
            .file_with_raw_name(b"bad\xFE.bin", &[(0, 2, 2)])
            .build()
            .unwrap();
        assert!(matches!(parse(&data), Err(Error::InvalidFileName(_))));
    }

    #[test]
    fn test_segment_outside_block() {
        let data = MgxBuilder::new()
            .block(0, b"abc")
            .file("abc", &[(0, 2, 5)])
            .build()
            .unwrap();
        assert!(matches!(parse(&data), Err(Error::InvalidSegment { block: 0, .. })));

        let data = MgxBuilder::new()
            .block(0, b"abc")
            .file("abc", &[(3, 0, 1)])
            .build()
            .unwrap();
        assert!(matches!(parse(&data), Err(Error::InvalidSegment { block: 3, .. })));
    }

    #[test]
    fn test_block_codecs() {
        let block = |method| Block {
            offset: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            method,
        };
        assert_eq!(block(0).codec().unwrap(), None);
        assert_eq!(block(2).codec().unwrap(), Some(Codec::Zstd));
        assert_eq!(block(6).codec().unwrap(), Some(Codec::Ppmd));
        assert!(matches!(block(42).codec(), Err(Error::UnsupportedCompression(42))));
    }
}
