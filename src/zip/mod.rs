//! ZIP archive reading and writing.
//!
//! ## Architecture
//!
//! - [`structures`]: records of the ZIP format (EOCD, file headers) and their
//!   byte layouts
//! - [`parser`]: locates the Central Directory and lists members
//! - [`extractor`]: reads member data back out, inflating and verifying it
//! - [`writer`]: produces new archives member by member
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions when reading
//! - STORED and DEFLATE, both directions
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods
//! - The writer never emits ZIP64 records

mod extractor;
mod parser;
mod structures;
mod writer;

pub use extractor::ZipExtractor;
pub use parser::{CentralDirectory, ZipParser};
pub use structures::*;
pub use writer::ZipWriter;
