//! Minimal ZIP writer.
//!
//! Members are compressed in memory and written with their final sizes in
//! the Local File Header, so no data descriptors are needed. Every header
//! carries the same timestamp, which makes the output a pure function of
//! the member names, contents and order.

use flate2::Crc;
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::Write;

use anyhow::{Result, bail};

use super::structures::{CompressionMethod, EndOfCentralDirectory, LFH_SIZE, MemberHeader};

/// Unix `drwxr-xr-x` plus the MS-DOS directory attribute
const DIR_ATTRS: u32 = (0o040755 << 16) | 0x10;
/// Unix `-rw-r--r--`
const FILE_ATTRS: u32 = 0o100644 << 16;

/// Sequential ZIP writer over any [`Write`] sink.
pub struct ZipWriter<W: Write> {
    out: W,
    offset: u64,
    members: Vec<MemberHeader>,
}

impl<W: Write> ZipWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            offset: 0,
            members: Vec::new(),
        }
    }

    /// Add a directory marker. A trailing `/` is appended if missing.
    pub fn add_directory(&mut self, name: &str) -> Result<()> {
        let mut name = name.to_string();
        if !name.ends_with('/') {
            name.push('/');
        }
        self.add_member(name, &[], CompressionMethod::Stored, 0, DIR_ATTRS)
    }

    /// Add a regular file compressed with `method`.
    pub fn add_file(&mut self, name: &str, data: &[u8], method: CompressionMethod) -> Result<()> {
        if name.ends_with('/') {
            bail!("File name {} looks like a directory", name);
        }

        let mut crc = Crc::new();
        crc.update(data);

        match method {
            CompressionMethod::Stored => {
                self.add_member(name.to_string(), data, method, crc.sum(), FILE_ATTRS)
            }
            CompressionMethod::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                let compressed = encoder.finish()?;
                self.add_member_with_size(
                    name.to_string(),
                    &compressed,
                    data.len(),
                    method,
                    crc.sum(),
                    FILE_ATTRS,
                )
            }
            CompressionMethod::Unknown(m) => bail!("Cannot write compression method {}", m),
        }
    }

    fn add_member(
        &mut self,
        name: String,
        data: &[u8],
        method: CompressionMethod,
        crc32: u32,
        external_attrs: u32,
    ) -> Result<()> {
        self.add_member_with_size(name, data, data.len(), method, crc32, external_attrs)
    }

    fn add_member_with_size(
        &mut self,
        file_name: String,
        payload: &[u8],
        uncompressed_size: usize,
        method: CompressionMethod,
        crc32: u32,
        external_attrs: u32,
    ) -> Result<()> {
        // A count of 0xFFFF would read as the ZIP64 marker
        if self.members.len() >= u16::MAX as usize - 1 {
            bail!("Too many members for a non-ZIP64 archive");
        }

        let header = MemberHeader {
            compression_method: method,
            crc32,
            compressed_size: fits_u32(payload.len() as u64, "compressed size")?,
            uncompressed_size: fits_u32(uncompressed_size as u64, "uncompressed size")?,
            external_attrs,
            lfh_offset: fits_u32(self.offset, "member offset")?,
            file_name,
        };

        header.write_local(&mut self.out)?;
        self.out.write_all(payload)?;
        self.offset += (LFH_SIZE + header.file_name.len() + payload.len()) as u64;
        self.members.push(header);
        Ok(())
    }

    /// Write the Central Directory and EOCD, returning the sink.
    pub fn finish(mut self) -> Result<W> {
        let cd_offset = fits_u32(self.offset, "central directory offset")?;
        let mut cd_size = 0u64;
        for member in &self.members {
            member.write_central(&mut self.out)?;
            cd_size += member.central_size() as u64;
        }

        let count = self.members.len() as u16;
        EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: count,
            total_entries: count,
            cd_size: fits_u32(cd_size, "central directory size")?,
            cd_offset,
            comment_len: 0,
        }
        .write_to(&mut self.out)?;

        self.out.flush()?;
        Ok(self.out)
    }
}

fn fits_u32(value: u64, what: &str) -> Result<u32> {
    // 0xFFFFFFFF itself is the ZIP64 marker
    if value >= u32::MAX as u64 {
        bail!("{} {} needs ZIP64, which is not written", what, value);
    }
    Ok(value as u32)
}
