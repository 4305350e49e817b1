//! Builders for synthetic containers used by tests.
//!
//! Writing archives is not a feature of this crate; these builders produce just
//! enough of the ZIP and MGX layouts to exercise the mappers, including entries
//! that real writers rarely emit (classic encryption with a chosen version,
//! unsupported methods, malformed LZMA headers, ZIP64 records).

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use ppmd_rust::{Ppmd8Encoder, RestoreMethod};
use veles_common::crc;

use crate::crypto::aes::{self, Strength};
use crate::crypto::classic::{self, Keys};
use crate::zip::METHOD_AES;

/// One ZIP entry with its data already in stored form.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    pub method: u16,
    pub flags: u16,
    pub version_made_by: u16,
    pub crc32: u32,
    pub uncompressed_size: u64,
    pub data: Vec<u8>,
    /// Extra field written to both the local and central headers.
    pub extra: Vec<u8>,
    /// Additional bytes of extra field written only to the local header.
    pub local_padding: usize,
}

impl ZipEntry {
    /// An entry with arbitrary method and data; the CRC is left at 0.
    pub fn raw(name: &str, method: u16, data: Vec<u8>, uncompressed_size: u64) -> Self {
        Self {
            name: name.to_string(),
            method,
            flags: 0,
            version_made_by: 20,
            crc32: 0,
            uncompressed_size,
            data,
            extra: Vec::new(),
            local_padding: 0,
        }
    }

    fn plain(name: &str, method: u16, original: &[u8], data: Vec<u8>) -> Self {
        Self {
            crc32: crc::crc32(original),
            ..Self::raw(name, method, data, original.len() as u64)
        }
    }
}

/// Assembles a ZIP archive from [`ZipEntry`] values.
#[derive(Debug, Clone, Default)]
pub struct ZipBuilder {
    entries: Vec<ZipEntry>,
    comment: Vec<u8>,
    zip64: bool,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a prepared entry.
    pub fn entry(mut self, entry: ZipEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn stored(self, name: &str, data: &[u8]) -> Self {
        self.entry(ZipEntry::plain(name, 0, data, data.to_vec()))
    }

    pub fn folder(self, name: &str) -> Self {
        self.entry(ZipEntry::plain(name, 0, &[], Vec::new()))
    }

    pub fn deflated(self, name: &str, data: &[u8]) -> Self {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        let compressed = encoder
            .write_all(data)
            .and_then(|_| encoder.finish())
            .unwrap_or_default();
        self.entry(ZipEntry::plain(name, 8, data, compressed))
    }

    /// A PPMd8 entry with order 6, 16 MiB of model memory and restart on overflow.
    pub fn ppmd(self, name: &str, data: &[u8]) -> Self {
        let (order, memory_mib) = (6u16, 16u16);
        let mut compressed = ((order - 1) | ((memory_mib - 1) << 4)).to_le_bytes().to_vec();
        if let Ok(mut encoder) = Ppmd8Encoder::new(
            Vec::new(),
            u32::from(order),
            u32::from(memory_mib) << 20,
            RestoreMethod::Restart,
        ) {
            if let Ok(stream) = encoder.write_all(data).and_then(|_| encoder.finish(true)) {
                compressed.extend_from_slice(&stream);
            }
        }
        self.entry(ZipEntry::plain(name, 98, data, compressed))
    }

    /// An LZMA entry with the given value in the properties-size field.
    pub fn lzma(self, name: &str, data: &[u8], properties_size: u16) -> Self {
        let mut alone = Vec::new();
        let _ = lzma_rs::lzma_compress(&mut &data[..], &mut alone);

        let mut payload = vec![0x10, 0x02];
        payload.extend_from_slice(&properties_size.to_le_bytes());
        if alone.len() >= 13 {
            payload.extend_from_slice(&alone[..5]);
            payload.extend_from_slice(&alone[13..]);
        }
        self.entry(ZipEntry::plain(name, 14, data, payload))
    }

    /// A stored entry with traditional PKWARE encryption.
    pub fn classic(self, name: &str, data: &[u8], password: &str, version_made_by: u16) -> Self {
        let crc32 = crc::crc32(data);

        let mut encrypted = vec![0xA5; classic::HEADER_LEN];
        encrypted[10..12].copy_from_slice(&((crc32 >> 16) as u16).to_le_bytes());
        encrypted.extend_from_slice(data);
        Keys::new(password.as_bytes()).encrypt(&mut encrypted);

        self.entry(ZipEntry {
            flags: 0x0001,
            version_made_by,
            ..ZipEntry::plain(name, 0, data, encrypted)
        })
    }

    /// A stored AE-1 entry.
    pub fn aes(self, name: &str, data: &[u8], password: &str, strength: Strength) -> Self {
        let salt: Vec<u8> = (0..strength.salt_len() as u8).map(|i| i.wrapping_mul(37)).collect();
        let encrypted = aes::encrypt(password.as_bytes(), strength, &salt, data);

        let mut extra = Vec::with_capacity(11);
        extra.extend_from_slice(&0x9901u16.to_le_bytes());
        extra.extend_from_slice(&7u16.to_le_bytes());
        extra.extend_from_slice(&1u16.to_le_bytes());
        extra.extend_from_slice(b"AE");
        extra.push(strength.mode());
        extra.extend_from_slice(&0u16.to_le_bytes());

        self.entry(ZipEntry {
            flags: 0x0001,
            extra,
            ..ZipEntry::plain(name, METHOD_AES, data, encrypted)
        })
    }

    /// Give the last entry's local header extra bytes the central directory does not have.
    pub fn pad_local_header(mut self, padding: usize) -> Self {
        if let Some(entry) = self.entries.last_mut() {
            entry.local_padding = padding;
        }
        self
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    /// Write every size and offset through ZIP64 records.
    pub fn zip64(mut self) -> Self {
        self.zip64 = true;
        self
    }

    pub fn build(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut offsets = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            offsets.push(out.len() as u64);
            let (compressed, uncompressed, mut extra) = self.sizes(entry, None);
            extra.extend_from_slice(&entry.extra);
            if entry.local_padding > 0 {
                extra.write_u16::<LittleEndian>(0xCAFE)?;
                extra.write_u16::<LittleEndian>(entry.local_padding as u16)?;
                extra.resize(extra.len() + entry.local_padding, 0);
            }

            out.write_u32::<LittleEndian>(0x04034b50)?;
            out.write_u16::<LittleEndian>(20)?;
            out.write_u16::<LittleEndian>(entry.flags)?;
            out.write_u16::<LittleEndian>(entry.method)?;
            out.write_u32::<LittleEndian>(0)?;
            out.write_u32::<LittleEndian>(entry.crc32)?;
            out.write_u32::<LittleEndian>(compressed)?;
            out.write_u32::<LittleEndian>(uncompressed)?;
            out.write_u16::<LittleEndian>(entry.name.len() as u16)?;
            out.write_u16::<LittleEndian>(extra.len() as u16)?;
            out.write_all(entry.name.as_bytes())?;
            out.write_all(&extra)?;
            out.write_all(&entry.data)?;
        }

        let directory_offset = out.len() as u64;
        for (entry, &offset) in self.entries.iter().zip(&offsets) {
            let (compressed, uncompressed, mut extra) = self.sizes(entry, Some(offset));
            extra.extend_from_slice(&entry.extra);
            let local_offset = if self.zip64 { u32::MAX } else { offset as u32 };

            out.write_u32::<LittleEndian>(0x02014b50)?;
            out.write_u16::<LittleEndian>(entry.version_made_by)?;
            out.write_u16::<LittleEndian>(20)?;
            out.write_u16::<LittleEndian>(entry.flags)?;
            out.write_u16::<LittleEndian>(entry.method)?;
            out.write_u32::<LittleEndian>(0)?;
            out.write_u32::<LittleEndian>(entry.crc32)?;
            out.write_u32::<LittleEndian>(compressed)?;
            out.write_u32::<LittleEndian>(uncompressed)?;
            out.write_u16::<LittleEndian>(entry.name.len() as u16)?;
            out.write_u16::<LittleEndian>(extra.len() as u16)?;
            out.write_u16::<LittleEndian>(0)?;
            out.write_u16::<LittleEndian>(0)?;
            out.write_u16::<LittleEndian>(0)?;
            out.write_u32::<LittleEndian>(0)?;
            out.write_u32::<LittleEndian>(local_offset)?;
            out.write_all(entry.name.as_bytes())?;
            out.write_all(&extra)?;
        }
        let directory_size = out.len() as u64 - directory_offset;
        let count = self.entries.len() as u64;

        if self.zip64 {
            let record_offset = out.len() as u64;
            out.write_u32::<LittleEndian>(0x06064b50)?;
            out.write_u64::<LittleEndian>(44)?;
            out.write_u16::<LittleEndian>(45)?;
            out.write_u16::<LittleEndian>(45)?;
            out.write_u32::<LittleEndian>(0)?;
            out.write_u32::<LittleEndian>(0)?;
            out.write_u64::<LittleEndian>(count)?;
            out.write_u64::<LittleEndian>(count)?;
            out.write_u64::<LittleEndian>(directory_size)?;
            out.write_u64::<LittleEndian>(directory_offset)?;

            out.write_u32::<LittleEndian>(0x07064b50)?;
            out.write_u32::<LittleEndian>(0)?;
            out.write_u64::<LittleEndian>(record_offset)?;
            out.write_u32::<LittleEndian>(1)?;
        }

        let (count16, size32, offset32) = if self.zip64 {
            (u16::MAX, u32::MAX, u32::MAX)
        } else {
            (count as u16, directory_size as u32, directory_offset as u32)
        };
        out.write_u32::<LittleEndian>(0x06054b50)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u16::<LittleEndian>(count16)?;
        out.write_u16::<LittleEndian>(count16)?;
        out.write_u32::<LittleEndian>(size32)?;
        out.write_u32::<LittleEndian>(offset32)?;
        out.write_u16::<LittleEndian>(self.comment.len() as u16)?;
        out.write_all(&self.comment)?;

        Ok(out)
    }

    /// Header size fields plus the ZIP64 extra field when sizes go through it.
    fn sizes(&self, entry: &ZipEntry, local_offset: Option<u64>) -> (u32, u32, Vec<u8>) {
        if !self.zip64 {
            return (entry.data.len() as u32, entry.uncompressed_size as u32, Vec::new());
        }

        let mut body = Vec::new();
        body.extend_from_slice(&entry.uncompressed_size.to_le_bytes());
        body.extend_from_slice(&(entry.data.len() as u64).to_le_bytes());
        if let Some(offset) = local_offset {
            body.extend_from_slice(&offset.to_le_bytes());
        }

        let mut extra = Vec::with_capacity(4 + body.len());
        extra.extend_from_slice(&0x0001u16.to_le_bytes());
        extra.extend_from_slice(&(body.len() as u16).to_le_bytes());
        extra.extend_from_slice(&body);
        (u32::MAX, u32::MAX, extra)
    }
}

/// One block of an MGX container, given uncompressed.
#[derive(Debug, Clone)]
struct MgxBlock {
    method: u32,
    data: Vec<u8>,
}

/// One file record of an MGX container.
#[derive(Debug, Clone)]
struct MgxFile {
    name: Vec<u8>,
    checksum: u32,
    segments: Vec<(u32, u32, u32)>,
}

/// Assembles an MGX container.
#[derive(Debug, Clone, Default)]
pub struct MgxBuilder {
    blocks: Vec<MgxBlock>,
    files: Vec<MgxFile>,
    misdeclare_index_size: bool,
}

impl MgxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block holding `data`, compressed with the given MGX method id (0–3).
    pub fn block(mut self, method: u32, data: &[u8]) -> Self {
        self.blocks.push(MgxBlock {
            method,
            data: data.to_vec(),
        });
        self
    }

    /// Add a file made of `(block, offset, size)` segments, with its CRC-32C as checksum.
    pub fn file(self, name: &str, segments: &[(u32, u32, u32)]) -> Self {
        self.file_with_raw_name(name.as_bytes(), segments)
    }

    /// Like [`MgxBuilder::file`], with a name that need not be UTF-8.
    pub fn file_with_raw_name(mut self, name: &[u8], segments: &[(u32, u32, u32)]) -> Self {
        let mut content = Vec::new();
        for &(block, offset, size) in segments {
            if let Some(block) = self.blocks.get(block as usize) {
                let start = (offset as usize).min(block.data.len());
                let end = (start + size as usize).min(block.data.len());
                content.extend_from_slice(&block.data[start..end]);
            }
        }

        self.files.push(MgxFile {
            name: name.to_vec(),
            checksum: crc::crc32c(&content),
            segments: segments.to_vec(),
        });
        self
    }

    /// Add a folder record.
    pub fn folder(mut self, name: &str) -> Self {
        self.files.push(MgxFile {
            name: name.as_bytes().to_vec(),
            checksum: 0,
            segments: Vec::new(),
        });
        self
    }

    /// Override the checksum of the last file.
    pub fn checksum(mut self, checksum: u32) -> Self {
        if let Some(file) = self.files.last_mut() {
            file.checksum = checksum;
        }
        self
    }

    /// Declare a file table size one byte larger than the real one.
    pub fn misdeclare_index_size(mut self) -> Self {
        self.misdeclare_index_size = true;
        self
    }

    pub fn build(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        out.write_all(b"mgx0")?;

        let mut table = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let compressed = compress_block(block)?;
            table.push((out.len() as u64, compressed.len() as u64, block.data.len() as u64));
            out.write_all(&compressed)?;
        }

        let block_table_offset = out.len() as u64;
        out.write_all(b"mgx1")?;
        out.write_u32::<LittleEndian>(self.blocks.len() as u32)?;
        for (block, &(offset, compressed, uncompressed)) in self.blocks.iter().zip(&table) {
            out.write_u64::<LittleEndian>(offset)?;
            out.write_u64::<LittleEndian>(compressed)?;
            out.write_u64::<LittleEndian>(uncompressed)?;
            out.write_u32::<LittleEndian>(block.method)?;
        }

        let mut blob = Vec::new();
        blob.write_u32::<LittleEndian>(self.files.len() as u32)?;
        for file in &self.files {
            let size: u64 = file.segments.iter().map(|&(_, _, size)| u64::from(size)).sum();
            blob.write_u32::<LittleEndian>(file.name.len() as u32)?;
            blob.write_all(&file.name)?;
            blob.write_u64::<LittleEndian>(size)?;
            blob.write_u32::<LittleEndian>(file.checksum)?;
            blob.write_u32::<LittleEndian>(file.segments.len() as u32)?;
            for &(block, offset, size) in &file.segments {
                blob.write_u32::<LittleEndian>(block)?;
                blob.write_u32::<LittleEndian>(offset)?;
                blob.write_u32::<LittleEndian>(size)?;
            }
        }
        let compressed_blob = zstd::bulk::compress(&blob, 3)?;
        let declared = blob.len() as u64 + u64::from(self.misdeclare_index_size);

        // "mgx2" closes the block table and opens the file table.
        let file_table_offset = out.len() as u64;
        out.write_all(b"mgx2")?;
        out.write_u64::<LittleEndian>(compressed_blob.len() as u64)?;
        out.write_u64::<LittleEndian>(declared)?;
        out.write_all(&compressed_blob)?;

        // "mgx3" closes the file table and opens the trailer.
        out.write_all(b"mgx3")?;
        out.write_u32::<LittleEndian>(1)?;
        out.write_u64::<LittleEndian>(block_table_offset)?;
        out.write_u64::<LittleEndian>(file_table_offset)?;

        Ok(out)
    }
}

fn compress_block(block: &MgxBlock) -> io::Result<Vec<u8>> {
    match block.method {
        0 => Ok(block.data.clone()),
        1 => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&block.data)?;
            encoder.finish()
        }
        2 => zstd::bulk::compress(&block.data, 3),
        3 => {
            let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
            encoder.write_all(&block.data)?;
            encoder.finish()
        }
        other => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("cannot build MGX block with method {other}"),
        )),
    }
}
