//! Low-level ZIP archive parser.
//!
//! Reads ZIP structures from any source implementing [`ReadAt`].
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, follow the locator to the ZIP64 EOCD
//! 3. Read the Central Directory to get metadata for all members
//! 4. On extraction, read each member's Local File Header to find its data
//!
//! Steps 1 and 2 run once in [`ZipParser::open`]; an input that fails them
//! is not a ZIP archive at all.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use crate::io::ReadAt;
use anyhow::{Result, bail};

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Extra field tag holding ZIP64 sizes and offsets
const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Where the Central Directory lives and how many records it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CentralDirectory {
    pub offset: u64,
    pub size: u64,
    pub total_entries: u64,
}

/// Low-level ZIP file parser.
///
/// Owns its reader, so the underlying file handle is released as soon as
/// the parser (or the [`ZipExtractor`](super::ZipExtractor) wrapping it) is
/// dropped.
pub struct ZipParser<R: ReadAt> {
    reader: R,
    directory: CentralDirectory,
}

impl<R: ReadAt> ZipParser<R> {
    /// Open an archive and locate its Central Directory.
    ///
    /// # Errors
    ///
    /// Fails when no End of Central Directory record can be found or the
    /// recorded directory does not fit inside the data source.
    pub fn open(reader: R) -> Result<Self> {
        let size = reader.size();
        let (eocd, eocd_offset) = find_eocd(&reader, size)?;

        let directory = if eocd.is_zip64() {
            let eocd64 = read_zip64_eocd(&reader, eocd_offset)?;
            CentralDirectory {
                offset: eocd64.cd_offset,
                size: eocd64.cd_size,
                total_entries: eocd64.total_entries,
            }
        } else {
            CentralDirectory {
                offset: eocd.cd_offset as u64,
                size: eocd.cd_size as u64,
                total_entries: eocd.total_entries as u64,
            }
        };

        if directory.offset.saturating_add(directory.size) > size {
            bail!("Central Directory extends past end of archive");
        }

        Ok(Self { reader, directory })
    }

    pub fn central_directory(&self) -> CentralDirectory {
        self.directory
    }

    /// List every member recorded in the Central Directory, in order.
    pub fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        let mut cd_data = vec![0u8; self.directory.size as usize];
        self.reader
            .read_exact_at(self.directory.offset, &mut cd_data)?;

        // A corrupt count must not drive a huge up-front allocation
        let capacity = self.directory.total_entries.min(u16::MAX as u64) as usize;
        let mut entries = Vec::with_capacity(capacity);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for _ in 0..self.directory.total_entries {
            entries.push(parse_cdfh(&mut cursor)?);
        }

        Ok(entries)
    }

    /// Offset of the first byte of `entry`'s (possibly compressed) data.
    ///
    /// The Local File Header repeats the name and may carry a different
    /// extra field than the Central Directory, so its own lengths are used.
    pub fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        let mut lfh_buf = [0u8; LFH_SIZE];
        self.reader.read_exact_at(entry.lfh_offset, &mut lfh_buf)?;

        if &lfh_buf[0..4] != LFH_SIGNATURE {
            bail!("Invalid Local File Header for {}", entry.file_name);
        }

        // Name and extra lengths sit at fixed offsets 26 and 28
        let mut cursor = Cursor::new(&lfh_buf[26..]);
        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        Ok(entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length)
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }
}

/// Find and parse the End of Central Directory record.
///
/// Tries the comment-less position first, then scans backwards through the
/// largest possible comment for a signature whose comment length matches
/// the bytes that follow it.
fn find_eocd<R: ReadAt>(reader: &R, size: u64) -> Result<(EndOfCentralDirectory, u64)> {
    let eocd_size = EndOfCentralDirectory::SIZE as u64;
    if size < eocd_size {
        bail!("Not a valid ZIP file (only {} bytes)", size);
    }

    let offset = size - eocd_size;
    let mut buf = [0u8; EndOfCentralDirectory::SIZE];
    reader.read_exact_at(offset, &mut buf)?;
    if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && buf[20..22] == [0, 0] {
        return Ok((EndOfCentralDirectory::from_bytes(&buf)?, offset));
    }

    let search_size = (MAX_COMMENT_SIZE + eocd_size).min(size);
    let search_start = size - search_size;
    let mut buf = vec![0u8; search_size as usize];
    reader.read_exact_at(search_start, &mut buf)?;

    for i in (0..buf.len() - EndOfCentralDirectory::SIZE).rev() {
        if &buf[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
            continue;
        }
        let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
        if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
            let eocd = EndOfCentralDirectory::from_bytes(&buf[i..i + EndOfCentralDirectory::SIZE])?;
            return Ok((eocd, search_start + i as u64));
        }
    }

    bail!("Not a valid ZIP file")
}

/// Read the ZIP64 EOCD through the locator that sits right before the EOCD.
fn read_zip64_eocd<R: ReadAt>(reader: &R, eocd_offset: u64) -> Result<Zip64EOCD> {
    let Some(locator_offset) = eocd_offset.checked_sub(Zip64EOCDLocator::SIZE as u64) else {
        bail!("Invalid ZIP64 format");
    };
    let mut locator_buf = [0u8; Zip64EOCDLocator::SIZE];
    reader.read_exact_at(locator_offset, &mut locator_buf)?;
    let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

    let mut eocd64_buf = [0u8; Zip64EOCD::MIN_SIZE];
    reader.read_exact_at(locator.eocd64_offset, &mut eocd64_buf)?;
    Zip64EOCD::from_bytes(&eocd64_buf)
}

/// Parse one Central Directory File Header, leaving the cursor on the next.
fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> Result<ZipFileEntry> {
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig)?;
    if sig != CDFH_SIGNATURE {
        bail!("Invalid Central Directory File Header");
    }

    let _version_made_by = cursor.read_u16::<LittleEndian>()?;
    let _version_needed = cursor.read_u16::<LittleEndian>()?;
    let _flags = cursor.read_u16::<LittleEndian>()?;
    let compression_method = cursor.read_u16::<LittleEndian>()?;
    let _last_mod_time = cursor.read_u16::<LittleEndian>()?;
    let _last_mod_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let file_name_length = cursor.read_u16::<LittleEndian>()?;
    let extra_field_length = cursor.read_u16::<LittleEndian>()?;
    let file_comment_length = cursor.read_u16::<LittleEndian>()?;
    let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
    let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
    let _external_attrs = cursor.read_u32::<LittleEndian>()?;
    let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

    let mut file_name_bytes = vec![0u8; file_name_length as usize];
    cursor.read_exact(&mut file_name_bytes)?;
    // Non-UTF-8 names are kept lossily rather than rejected
    let file_name = String::from_utf8_lossy(&file_name_bytes).into_owned();
    let is_directory = file_name.ends_with('/');

    let extra_field_end = cursor.position() + extra_field_length as u64;
    while cursor.position() + 4 <= extra_field_end {
        let header_id = cursor.read_u16::<LittleEndian>()?;
        let field_size = cursor.read_u16::<LittleEndian>()? as u64;
        let field_end = cursor.position() + field_size;

        if header_id == ZIP64_EXTRA_ID {
            // Only the saturated header fields are present, in this order
            if uncompressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                uncompressed_size = cursor.read_u64::<LittleEndian>()?;
            }
            if compressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                compressed_size = cursor.read_u64::<LittleEndian>()?;
            }
            if lfh_offset == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                lfh_offset = cursor.read_u64::<LittleEndian>()?;
            }
        }
        cursor.set_position(field_end);
    }

    cursor.set_position(extra_field_end + file_comment_length as u64);

    Ok(ZipFileEntry {
        file_name,
        compression_method: CompressionMethod::from_u16(compression_method),
        compressed_size,
        uncompressed_size,
        crc32,
        lfh_offset,
        is_directory,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use crate::zip::ZipWriter;

    fn archive_with_comment(comment: &[u8]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Vec::new());
        writer.add_directory("OEBPS").unwrap();
        writer
            .add_file("OEBPS/ch1.html", b"<p>one</p>", CompressionMethod::Stored)
            .unwrap();
        let mut data = writer.finish().unwrap();
        // Patch the comment length and append the comment body
        let len = data.len();
        data[len - 2..].copy_from_slice(&(comment.len() as u16).to_le_bytes());
        data.extend_from_slice(comment);
        data
    }

    #[test]
    fn lists_members_in_directory_order() {
        let parser = ZipParser::open(MemoryReader::new(archive_with_comment(b""))).unwrap();
        let entries = parser.list_files().unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, ["OEBPS/", "OEBPS/ch1.html"]);
        assert!(entries[0].is_directory);
        assert!(!entries[1].is_directory);
        assert_eq!(entries[1].uncompressed_size, 10);
    }

    #[test]
    fn finds_eocd_behind_a_comment() {
        let parser =
            ZipParser::open(MemoryReader::new(archive_with_comment(b"made by hand"))).unwrap();
        assert_eq!(parser.central_directory().total_entries, 2);
    }

    #[test]
    fn data_offset_skips_local_header_and_name() {
        let parser = ZipParser::open(MemoryReader::new(archive_with_comment(b""))).unwrap();
        let entries = parser.list_files().unwrap();
        let file = &entries[1];
        let offset = parser.get_data_offset(file).unwrap();
        assert_eq!(
            offset,
            file.lfh_offset + LFH_SIZE as u64 + file.file_name.len() as u64
        );
    }

    #[test]
    fn rejects_non_zip_data() {
        let err = ZipParser::open(MemoryReader::new(b"definitely not a zip file at all".to_vec()))
            .err()
            .unwrap();
        assert!(err.to_string().contains("Not a valid ZIP file"));
        assert!(ZipParser::open(MemoryReader::new(Vec::new())).is_err());
    }

    #[test]
    fn reads_zip64_extra_field() {
        let mut record = Vec::new();
        record.extend_from_slice(CDFH_SIGNATURE);
        record.extend_from_slice(&[0u8; 6]); // versions and flags
        record.extend_from_slice(&8u16.to_le_bytes());
        record.extend_from_slice(&[0u8; 4]); // time and date
        record.extend_from_slice(&0xDEADBEEFu32.to_le_bytes());
        record.extend_from_slice(&0xFFFFFFFFu32.to_le_bytes());
        record.extend_from_slice(&0xFFFFFFFFu32.to_le_bytes());
        record.extend_from_slice(&1u16.to_le_bytes()); // name length
        record.extend_from_slice(&20u16.to_le_bytes()); // extra length
        record.extend_from_slice(&[0u8; 6]); // comment, disk, internal attrs
        record.extend_from_slice(&0u32.to_le_bytes()); // external attrs
        record.extend_from_slice(&7u32.to_le_bytes()); // lfh offset
        record.push(b'a');
        record.extend_from_slice(&ZIP64_EXTRA_ID.to_le_bytes());
        record.extend_from_slice(&16u16.to_le_bytes());
        record.extend_from_slice(&(5u64 << 32).to_le_bytes());
        record.extend_from_slice(&(3u64 << 32).to_le_bytes());

        let mut cursor = Cursor::new(record.as_slice());
        let entry = parse_cdfh(&mut cursor).unwrap();
        assert_eq!(entry.file_name, "a");
        assert_eq!(entry.compression_method, CompressionMethod::Deflate);
        assert_eq!(entry.uncompressed_size, 5u64 << 32);
        assert_eq!(entry.compressed_size, 3u64 << 32);
        assert_eq!(entry.lfh_offset, 7);
        assert_eq!(entry.crc32, 0xDEADBEEF);
        assert_eq!(cursor.position() as usize, record.len());
    }
}
