//! ZIP container mapper.
//!
//! The central directory is parsed once when the mapper is created; `map`
//! then reads the local header of the requested entry and runs the
//! decrypt → decompress pipeline on its data.

use tracing::{debug, trace, warn};
use veles_common::{crc, BinaryReader, Memory};

use super::central_dir::CentralDirectoryHeader;
use super::eocd::{Eocd64Locator, Eocd64Record, EocdRecord};
use super::extra::ExtraFields;
use super::local::LocalFileHeader;
use super::{CompressionMethod, Encryption, METHOD_AES};
use crate::codec;
use crate::crypto::{aes, classic};
use crate::indexer::{split_folder, Indexer};
use crate::{scan, Error, FileIndex, FileInfo, Mapper, MapperOptions, Result};

/// Metadata of one indexed ZIP entry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ZipRecord {
    uncompressed_size: u64,
    compressed_size: u64,
    method: CompressionMethod,
    encryption: Encryption,
    crc32: u32,
    local_header_offset: u64,
    /// ZIP specification version of the writer.
    version: u8,
    /// AE-2 entries carry no CRC.
    has_crc: bool,
    is_folder: bool,
}

impl ZipRecord {
    /// A folder that has no central directory entry of its own.
    fn synthetic_folder() -> Self {
        Self {
            uncompressed_size: 0,
            compressed_size: 0,
            method: CompressionMethod::Store,
            encryption: Encryption::None,
            crc32: 0,
            local_header_offset: 0,
            version: 0,
            has_crc: false,
            is_folder: true,
        }
    }

    fn flags(&self) -> u32 {
        let mut flags = 0;
        if self.is_folder {
            flags |= FileInfo::DIRECTORY;
        }
        if self.method != CompressionMethod::Store {
            flags |= FileInfo::COMPRESSED;
        }
        if self.encryption != Encryption::None {
            flags |= FileInfo::ENCRYPTED;
        }
        flags
    }
}

/// Location of the central directory.
#[derive(Debug, Clone, Copy)]
struct CentralDirectory {
    offset: u64,
    entries: u64,
}

/// A [`Mapper`] over a ZIP archive.
pub struct ZipMapper {
    parent: Memory,
    options: MapperOptions,
    index: Indexer<ZipRecord>,
}

impl ZipMapper {
    /// Parse the central directory of `parent`.
    ///
    /// An archive without a usable End of Central Directory record (missing, or
    /// spanning several disks) yields a mapper with an empty index.
    pub fn new(parent: Memory, options: MapperOptions) -> Result<Self> {
        let index = match locate_central_directory(&parent)? {
            Some(directory) => parse_central_directory(&parent, directory)?,
            None => {
                warn!(size = parent.len(), "no usable ZIP end of central directory record");
                Indexer::new()
            }
        };

        debug!(entries = index.len(), "opened ZIP container");

        Ok(Self {
            parent,
            options,
            index,
        })
    }

    /// Number of indexed names, synthesized folders included.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check whether the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn password(&self, name: &str) -> Result<&[u8]> {
        let password = self.options.password_bytes();
        if password.is_empty() {
            return Err(Error::MissingPassword(name.to_string()));
        }
        Ok(password)
    }

    /// Slice of the parent holding the entry's (possibly encrypted) data.
    fn entry_data(&self, record: &ZipRecord) -> Result<Memory> {
        let offset = usize::try_from(record.local_header_offset).unwrap_or(usize::MAX);
        let mut reader = BinaryReader::new_at(self.parent.as_slice(), offset);

        let sig = reader.read_u32()?;
        if sig != LocalFileHeader::SIGNATURE {
            return Err(Error::InvalidSignature {
                expected: LocalFileHeader::SIGNATURE,
                actual: sig,
            });
        }
        let local: LocalFileHeader = reader.read_struct()?;

        let data_offset =
            record.local_header_offset + LocalFileHeader::SIZE + local.variable_data_size();
        Ok(self.parent.slice(data_offset, record.compressed_size)?)
    }

    fn decrypt(&self, name: &str, record: &ZipRecord, data: &[u8]) -> Result<Option<Vec<u8>>> {
        match record.encryption {
            Encryption::None => Ok(None),
            Encryption::Classic => {
                let verifier = classic::Verifier::for_entry(record.version, record.crc32);
                classic::decrypt(self.password(name)?, verifier, data)
                    .map(Some)
                    .map_err(|e| e.into_error(name))
            }
            Encryption::Aes(strength) => aes::decrypt(self.password(name)?, strength, data)
                .map(Some)
                .map_err(|e| e.into_error(name)),
        }
    }

    fn decompress(&self, name: &str, record: &ZipRecord, src: &[u8]) -> Result<Vec<u8>> {
        let Some(codec) = record.method.codec() else {
            return Ok(src.to_vec());
        };

        let src = if record.method == CompressionMethod::Lzma {
            lzma_payload(src)?
        } else {
            src
        };

        let mut buffer = codec::output_buffer(record.uncompressed_size)?;
        let written = codec::decompress(codec, &mut buffer, src)?;
        if written != buffer.len() {
            return Err(Error::SizeMismatch {
                name: name.to_string(),
                expected: record.uncompressed_size,
                actual: written as u64,
            });
        }
        Ok(buffer)
    }

    fn verify(&self, name: &str, record: &ZipRecord, data: &[u8]) -> Result<()> {
        if data.len() as u64 != record.uncompressed_size {
            return Err(Error::SizeMismatch {
                name: name.to_string(),
                expected: record.uncompressed_size,
                actual: data.len() as u64,
            });
        }

        if self.options.verify_checksums && record.has_crc {
            let actual = crc::crc32(data);
            if actual != record.crc32 {
                return Err(Error::ChecksumMismatch {
                    name: name.to_string(),
                    expected: record.crc32,
                    actual,
                });
            }
        }
        Ok(())
    }
}

impl Mapper for ZipMapper {
    fn is_file(&self, name: &str) -> bool {
        self.index
            .header(name)
            .is_some_and(|record| !record.is_folder)
    }

    fn map(&self, name: &str) -> Result<Memory> {
        let record = self
            .index
            .header(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        if record.is_folder {
            return Err(Error::IsDirectory(name.to_string()));
        }

        let data = self.entry_data(record)?;
        let decrypted = self.decrypt(name, record, &data)?;

        let memory = match (record.method, decrypted) {
            (CompressionMethod::Store, None) => {
                trace!(name, "zero-copy ZIP entry");
                data
            }
            (CompressionMethod::Store, Some(plain)) => Memory::from_vec(plain),
            (_, decrypted) => {
                let src = decrypted.as_deref().unwrap_or(data.as_slice());
                Memory::from_vec(self.decompress(name, record, src)?)
            }
        };

        self.verify(name, record, &memory)?;
        Ok(memory)
    }

    fn index(&self, folder: &str) -> Result<FileIndex> {
        let mut index = FileIndex::new();
        if let Some(folder) = self.index.folder(folder) {
            for (name, record) in folder.iter() {
                let size = if record.is_folder {
                    0
                } else {
                    record.uncompressed_size
                };
                index.emplace(name, size, record.flags());
            }
        }
        index.sort_by_name();
        Ok(index)
    }
}

impl std::fmt::Debug for ZipMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipMapper")
            .field("size", &self.parent.len())
            .field("entries", &self.index.len())
            .finish()
    }
}

/// Strip the ZIP LZMA sub-header (version, properties size) from the payload.
fn lzma_payload(src: &[u8]) -> Result<&[u8]> {
    let mut reader = BinaryReader::new(src);
    reader.advance(2);
    let properties_size = reader.read_u16()?;
    if properties_size != 5 {
        return Err(Error::InvalidLzmaHeader(properties_size));
    }
    Ok(&src[4..])
}

/// The last complete EOCD record whose comment fits inside the archive.
fn find_eocd_record(data: &[u8]) -> Option<(usize, EocdRecord)> {
    scan::eocd_candidates(data, &EocdRecord::MAGIC).find_map(|offset| {
        let eocd: EocdRecord = BinaryReader::new_at(data, offset + 4).read_struct().ok()?;
        let end = offset + 4 + std::mem::size_of::<EocdRecord>() + eocd.comment_length as usize;
        (end <= data.len()).then_some((offset, eocd))
    })
}

fn locate_central_directory(parent: &Memory) -> Result<Option<CentralDirectory>> {
    let data = parent.as_slice();
    let Some((eocd_offset, eocd)) = find_eocd_record(data) else {
        return Ok(None);
    };

    if !eocd.is_zip64() {
        if eocd.is_multi_disk() {
            return Ok(None);
        }
        return Ok(Some(CentralDirectory {
            offset: u64::from(eocd.central_dir_offset),
            entries: u64::from(eocd.central_dir_count_total),
        }));
    }

    let locator_offset = eocd_offset
        .checked_sub(Eocd64Locator::SIZE)
        .ok_or(Error::Zip64EocdNotFound)?;
    let mut reader = BinaryReader::new_at(data, locator_offset);
    if reader.read_u32()? != Eocd64Locator::SIGNATURE {
        return Err(Error::Zip64EocdNotFound);
    }
    let locator: Eocd64Locator = reader.read_struct()?;
    if locator.zip64_eocd_disk != 0 || locator.total_disks > 1 {
        return Ok(None);
    }

    let record_offset = usize::try_from(locator.zip64_eocd_offset).unwrap_or(usize::MAX);
    let mut reader = BinaryReader::new_at(data, record_offset);
    let sig = reader.read_u32()?;
    if sig != Eocd64Record::SIGNATURE {
        return Err(Error::InvalidSignature {
            expected: Eocd64Record::SIGNATURE,
            actual: sig,
        });
    }
    let record: Eocd64Record = reader.read_struct()?;
    if record.is_multi_disk() {
        return Ok(None);
    }

    Ok(Some(CentralDirectory {
        offset: record.central_dir_offset,
        entries: record.central_dir_count_total,
    }))
}

fn parse_central_directory(
    parent: &Memory,
    directory: CentralDirectory,
) -> Result<Indexer<ZipRecord>> {
    let data = parent.as_slice();
    let offset = usize::try_from(directory.offset).unwrap_or(usize::MAX);
    let mut reader = BinaryReader::new_at(data, offset);
    let mut index = Indexer::new();

    for _ in 0..directory.entries {
        let sig = reader.read_u32()?;
        if sig != CentralDirectoryHeader::SIGNATURE {
            return Err(Error::InvalidSignature {
                expected: CentralDirectoryHeader::SIGNATURE,
                actual: sig,
            });
        }

        let header: CentralDirectoryHeader = reader.read_struct()?;
        let name_bytes = reader.read_bytes(header.file_name_length as usize)?;
        let name = String::from_utf8_lossy(name_bytes).into_owned();
        let extra = ExtraFields::parse(
            reader.read_bytes(header.extra_field_length as usize)?,
            &header,
        )?;
        reader.advance(header.file_comment_length as usize);

        let Some(record) = make_record(&name, &header, &extra) else {
            continue;
        };

        let (folder, _) = split_folder(&name);
        index.insert(folder, &name, record);
        insert_ancestors(&mut index, folder);
    }

    Ok(index)
}

/// Build the record for one entry, or `None` when its method cannot be decoded.
fn make_record(
    name: &str,
    header: &CentralDirectoryHeader,
    extra: &ExtraFields,
) -> Option<ZipRecord> {
    let stored_method = header.compression_method;

    let (raw_method, encryption, has_crc) = match extra.aes {
        Some(aes) if stored_method == METHOD_AES => {
            (aes.compression_method, Encryption::Aes(aes.strength), aes.vendor_version == 1)
        }
        _ if header.is_encrypted() => (stored_method, Encryption::Classic, true),
        _ => (stored_method, Encryption::None, true),
    };

    let method = match CompressionMethod::try_from(raw_method) {
        Ok(method) => method,
        Err(method) => {
            warn!(name, method, "skipping ZIP entry with unsupported compression method");
            return None;
        }
    };

    Some(ZipRecord {
        uncompressed_size: extra.uncompressed_size,
        compressed_size: extra.compressed_size,
        method,
        encryption,
        crc32: header.crc32,
        local_header_offset: extra.local_header_offset,
        version: header.version(),
        has_crc,
        is_folder: name.ends_with('/'),
    })
}

/// Index every ancestor of `folder` that has no entry yet.
fn insert_ancestors(index: &mut Indexer<ZipRecord>, mut folder: &str) {
    while !folder.is_empty() {
        let (parent, _) = split_folder(folder);
        if index.header(folder).is_none() {
            index.insert(parent, folder, ZipRecord::synthetic_folder());
        }
        folder = parent;
    }
}
