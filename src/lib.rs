//! # epubsort
//!
//! Repackage EPUB archives so that their content files are named, and
//! therefore sorted, in table-of-contents order.
//!
//! The book's `toc.ncx` is walked depth-first; every distinct content file
//! it references is renamed to `<ordinal>-<title>.html` inside its original
//! directory, with the ordinal zero-padded to the width of the total count.
//! Files the table of contents does not mention keep their path. The result
//! is written as a plain zip beside the input.
//!
//! Titles have `/` replaced by `|` and surrounding whitespace trimmed, so an
//! indented `<text>` label in a pretty-printed `toc.ncx` does not leak
//! newlines into file names.
//!
//! ## Features
//!
//! - Self-contained zip reader (ZIP64 aware) and writer, STORED and DEFLATE
//! - Deterministic output: sorted members and fixed header timestamps
//! - Per-archive error isolation in the command-line driver
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     // Inspect the reading order without writing anything
//!     let plan = epubsort::plan(Path::new("book.epub"))?;
//!     for placement in plan.placements() {
//!         println!("{} <- {}", placement.dest_path, placement.entry.name);
//!     }
//!
//!     // Produce book.zip
//!     let report = epubsort::repack(Path::new("book.epub"))?;
//!     println!("wrote {}", report.output.display());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod epub;
pub mod error;
pub mod io;
pub mod package;
pub mod repack;
pub mod zip;

pub use cli::Cli;
pub use error::RepackError;
pub use io::{LocalFileReader, MemoryReader, ReadAt};
pub use repack::{ArchivePaths, Plan, RepackReport, plan, repack};
pub use zip::{ZipExtractor, ZipFileEntry, ZipWriter};
