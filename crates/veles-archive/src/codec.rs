//! Decompression backends.
//!
//! Every codec decompresses into a pre-sized destination and reports how many
//! bytes it produced; callers compare that against the size their metadata declared.

use std::io::{Cursor, Read};

use flate2::{Decompress, FlushDecompress, Status};

use crate::{Error, Result};

/// Compression algorithms understood by the mappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Raw DEFLATE stream (no zlib header).
    Deflate,
    /// Zstandard frame.
    Zstd,
    /// BZIP2 stream.
    Bzip2,
    /// LZMA: 5 property bytes followed by the raw stream; the size comes from the destination.
    Lzma,
    /// XZ stream (LZMA2).
    Xz,
    /// PPMd variant I (PPMd8), prefixed by the 2-byte ZIP parameter word.
    Ppmd,
}

/// Allocate a zeroed output buffer of a size read from container metadata.
///
/// Sizes that do not fit the address space or cannot be reserved are reported
/// as [`Error::Allocation`].
pub fn output_buffer(len: u64) -> Result<Vec<u8>> {
    let size = usize::try_from(len).map_err(|_| Error::Allocation(len))?;
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(size)
        .map_err(|_| Error::Allocation(len))?;
    buffer.resize(size, 0);
    Ok(buffer)
}

/// Decompress `src` into `dest`, returning the number of bytes written.
pub fn decompress(codec: Codec, dest: &mut [u8], src: &[u8]) -> Result<usize> {
    if dest.is_empty() {
        return Ok(0);
    }

    match codec {
        Codec::Deflate => decompress_deflate(dest, src),
        Codec::Zstd => zstd::bulk::decompress_to_buffer(src, dest)
            .map_err(|e| Error::Decompression(format!("zstd: {e}"))),
        Codec::Bzip2 => {
            let mut decoder = bzip2::read::BzDecoder::new(src);
            read_exactly(&mut decoder, dest, "bzip2")
        }
        Codec::Lzma => decompress_lzma(dest, src),
        Codec::Xz => {
            let mut input = src;
            let mut output = Cursor::new(dest);
            lzma_rs::xz_decompress(&mut input, &mut output)
                .map_err(|e| Error::Decompression(format!("xz: {e}")))?;
            Ok(output.position() as usize)
        }
        Codec::Ppmd => decompress_ppmd(dest, src),
    }
}

fn decompress_deflate(dest: &mut [u8], src: &[u8]) -> Result<usize> {
    let mut inflater = Decompress::new(false);
    let status = inflater
        .decompress(src, dest, FlushDecompress::Finish)
        .map_err(|e| Error::Decompression(format!("deflate: {e}")))?;

    match status {
        Status::StreamEnd => Ok(inflater.total_out() as usize),
        _ => Err(Error::Decompression(
            "deflate: stream did not end within the declared size".to_string(),
        )),
    }
}

fn decompress_lzma(dest: &mut [u8], src: &[u8]) -> Result<usize> {
    use lzma_rs::decompress::{Options, UnpackedSize};

    let options = Options {
        unpacked_size: UnpackedSize::UseProvided(Some(dest.len() as u64)),
        ..Default::default()
    };

    let mut input = src;
    let mut output = Cursor::new(dest);
    lzma_rs::lzma_decompress_with_options(&mut input, &mut output, &options)
        .map_err(|e| Error::Decompression(format!("lzma: {e}")))?;

    Ok(output.position() as usize)
}

fn decompress_ppmd(dest: &mut [u8], src: &[u8]) -> Result<usize> {
    use ppmd_rust::{Ppmd8Decoder, RestoreMethod};

    if src.len() < 2 {
        return Err(Error::Decompression("ppmd: missing parameter header".to_string()));
    }

    let parameters = u16::from_le_bytes([src[0], src[1]]);
    let order = u32::from(parameters & 0x0F) + 1;
    let memory_size = (u32::from((parameters >> 4) & 0xFF) + 1) << 20;
    let restore_method = match parameters >> 12 {
        0 => RestoreMethod::Restart,
        1 => RestoreMethod::CutOff,
        other => {
            return Err(Error::Decompression(format!(
                "ppmd: unknown restore method {other}"
            )))
        }
    };

    let mut decoder = Ppmd8Decoder::new(&src[2..], order, memory_size, restore_method)
        .map_err(|e| Error::Decompression(format!("ppmd: {e:?}")))?;

    let mut written = 0;
    while written < dest.len() {
        let n = decoder
            .read(&mut dest[written..])
            .map_err(|e| Error::Decompression(format!("ppmd: {e}")))?;
        if n == 0 {
            break;
        }
        written += n;
    }
    Ok(written)
}

/// Fill `dest` from a decoder and reject streams that produce more than that.
fn read_exactly<R: Read>(decoder: &mut R, dest: &mut [u8], name: &str) -> Result<usize> {
    let mut written = 0;
    while written < dest.len() {
        let n = decoder
            .read(&mut dest[written..])
            .map_err(|e| Error::Decompression(format!("{name}: {e}")))?;
        if n == 0 {
            return Ok(written);
        }
        written += n;
    }

    let mut trailing = [0u8; 1];
    let extra = decoder
        .read(&mut trailing)
        .map_err(|e| Error::Decompression(format!("{name}: {e}")))?;
    if extra != 0 {
        return Err(Error::Decompression(format!(
            "{name}: stream is larger than the declared size"
        )));
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TEXT: &[u8] = b"Hello, World! This is a test of block decompression. \
        Hello, World! This is a test of block decompression.";

    #[test]
    fn test_zstd() {
        let compressed = zstd::encode_all(TEXT, 3).unwrap();
        let mut out = vec![0u8; TEXT.len()];
        assert_eq!(decompress(Codec::Zstd, &mut out, &compressed).unwrap(), TEXT.len());
        assert_eq!(out, TEXT);
    }

    #[test]
    fn test_deflate() {
        use flate2::write::DeflateEncoder;
        use flate2::Compression;

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(TEXT).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut out = vec![0u8; TEXT.len()];
        assert_eq!(decompress(Codec::Deflate, &mut out, &compressed).unwrap(), TEXT.len());
        assert_eq!(out, TEXT);

        let mut short = vec![0u8; TEXT.len() - 1];
        assert!(decompress(Codec::Deflate, &mut short, &compressed).is_err());
    }

    #[test]
    fn test_bzip2() {
        let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(TEXT).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut out = vec![0u8; TEXT.len()];
        assert_eq!(decompress(Codec::Bzip2, &mut out, &compressed).unwrap(), TEXT.len());
        assert_eq!(out, TEXT);

        let mut short = vec![0u8; 10];
        assert!(decompress(Codec::Bzip2, &mut short, &compressed).is_err());
    }

    #[test]
    fn test_lzma_raw() {
        let mut alone = Vec::new();
        lzma_rs::lzma_compress(&mut &TEXT[..], &mut alone).unwrap();

        // Drop the 8-byte size field of the .lzma header, keep the properties.
        let mut raw = alone[..5].to_vec();
        raw.extend_from_slice(&alone[13..]);

        let mut out = vec![0u8; TEXT.len()];
        assert_eq!(decompress(Codec::Lzma, &mut out, &raw).unwrap(), TEXT.len());
        assert_eq!(out, TEXT);
    }

    #[test]
    fn test_xz() {
        let mut compressed = Vec::new();
        lzma_rs::xz_compress(&mut &TEXT[..], &mut compressed).unwrap();

        let mut out = vec![0u8; TEXT.len()];
        assert_eq!(decompress(Codec::Xz, &mut out, &compressed).unwrap(), TEXT.len());
        assert_eq!(out, TEXT);
    }

    /// ZIP PPMd parameter word: order - 1, memory in MiB - 1, restore method.
    fn ppmd_parameters(order: u16, memory_mib: u16, restore: u16) -> [u8; 2] {
        ((order - 1) | ((memory_mib - 1) << 4) | (restore << 12)).to_le_bytes()
    }

    #[test]
    fn test_ppmd() {
        use ppmd_rust::{Ppmd8Encoder, RestoreMethod};

        let text = TEXT.repeat(12);
        let mut encoder =
            Ppmd8Encoder::new(Vec::new(), 6, 16 << 20, RestoreMethod::Restart).unwrap();
        encoder.write_all(&text).unwrap();
        let stream = encoder.finish(true).unwrap();

        let mut compressed = ppmd_parameters(6, 16, 0).to_vec();
        compressed.extend_from_slice(&stream);

        let mut out = vec![0u8; text.len()];
        assert_eq!(decompress(Codec::Ppmd, &mut out, &compressed).unwrap(), text.len());
        assert_eq!(out, text);
    }

    #[test]
    fn test_ppmd_bad_parameters() {
        let mut out = vec![0u8; 16];

        let unknown_restore = ppmd_parameters(6, 16, 2);
        assert!(matches!(
            decompress(Codec::Ppmd, &mut out, &unknown_restore),
            Err(Error::Decompression(message)) if message.contains("restore method 2")
        ));

        assert!(decompress(Codec::Ppmd, &mut out, &[0x05]).is_err());
    }

    #[test]
    fn test_output_buffer() {
        assert_eq!(output_buffer(4).unwrap(), vec![0u8; 4]);
        assert!(output_buffer(0).unwrap().is_empty());
        assert!(matches!(output_buffer(u64::MAX), Err(Error::Allocation(u64::MAX))));
    }

    #[test]
    fn test_empty_destination() {
        let mut out = [0u8; 0];
        assert_eq!(decompress(Codec::Zstd, &mut out, &[]).unwrap(), 0);
    }

    #[test]
    fn test_corrupted_input() {
        let mut out = vec![0u8; 16];
        assert!(decompress(Codec::Zstd, &mut out, b"definitely not zstd").is_err());
    }
}
