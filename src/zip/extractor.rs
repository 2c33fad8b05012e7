use flate2::Crc;
use flate2::read::DeflateDecoder;
use std::io::Read;

use crate::io::ReadAt;
use anyhow::{Result, bail};

use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

/// Upper bound of DEFLATE's expansion ratio
const MAX_DEFLATE_RATIO: u64 = 1032;

/// ZIP file extractor
pub struct ZipExtractor<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ZipExtractor<R> {
    /// Open the archive behind `reader`, failing if it is not a ZIP file
    pub fn new(reader: R) -> Result<Self> {
        Ok(Self {
            parser: ZipParser::open(reader)?,
        })
    }

    /// List all files in the archive
    pub fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        self.parser.list_files()
    }

    /// Extract file data to memory, checking its size and CRC-32
    pub fn extract_to_memory(&self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        let data_offset = self.parser.get_data_offset(entry)?;
        let archive_size = self.parser.reader().size();
        match data_offset.checked_add(entry.compressed_size) {
            Some(end) if end <= archive_size => {}
            _ => bail!(
                "Data of {} ({} bytes at offset {}) runs past the end of the archive ({} bytes)",
                entry.file_name,
                entry.compressed_size,
                data_offset,
                archive_size
            ),
        }

        let mut raw = vec![0u8; entry.compressed_size as usize];
        self.parser.reader().read_exact_at(data_offset, &mut raw)?;

        let data = match entry.compression_method {
            CompressionMethod::Stored => raw,
            CompressionMethod::Deflate => {
                // Headers are untrusted: bound both the reservation and the output
                let hint = entry
                    .uncompressed_size
                    .min(entry.compressed_size.saturating_mul(MAX_DEFLATE_RATIO));
                let mut data = Vec::with_capacity(usize::try_from(hint).unwrap_or(0));
                DeflateDecoder::new(raw.as_slice())
                    .take(entry.uncompressed_size.saturating_add(1))
                    .read_to_end(&mut data)?;
                data
            }
            CompressionMethod::Unknown(method) => bail!(
                "Unsupported compression method {} for {} (only STORED and DEFLATE are supported)",
                method,
                entry.file_name
            ),
        };

        if data.len() as u64 != entry.uncompressed_size {
            bail!(
                "Size mismatch for {}: expected {} bytes, got {}",
                entry.file_name,
                entry.uncompressed_size,
                data.len()
            );
        }

        let mut crc = Crc::new();
        crc.update(&data);
        if crc.sum() != entry.crc32 {
            bail!(
                "CRC-32 mismatch for {}: expected {:08x}, got {:08x}",
                entry.file_name,
                entry.crc32,
                crc.sum()
            );
        }

        Ok(data)
    }
}
