//! Errors raised while repackaging one archive.
//!
//! Each variant aborts only the archive being processed; the CLI reports it
//! and moves on to the next path.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::epub::NavError;

pub type Result<T> = std::result::Result<T, RepackError>;

#[derive(Debug, Error)]
pub enum RepackError {
    #[error("cannot resolve path {}: {source}", path.display())]
    PathResolution {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("can not support ext '{ext}' for {}", path.display())]
    UnsupportedExtension { path: PathBuf, ext: String },

    /// The zip layer reports `anyhow` errors; `{error:#}` keeps the chain.
    #[error("cannot open archive {}: {error:#}", path.display())]
    ArchiveOpen { path: PathBuf, error: anyhow::Error },

    #[error("cannot prepare working directory {}: {source}", path.display())]
    WorkingDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read {name} error: {error:#}")]
    EntryRead { name: String, error: anyhow::Error },

    #[error("write {} error: {source}", path.display())]
    EntryWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("navigation document: {0}")]
    Navigation(#[from] NavError),

    #[error("cannot package {}: {error:#}", path.display())]
    Package { path: PathBuf, error: anyhow::Error },
}
