//! Per-archive pipeline: read, order, place, package.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::epub::nav::{self, VisitRecord};
use crate::epub::placement;
use crate::epub::reader::{self, Book};
use crate::epub::Placement;
use crate::error::{RepackError, Result};
use crate::package::{self, WorkDir};

/// The only extension accepted on input.
pub const INPUT_EXTENSION: &str = "epub";
/// Extension of the produced package.
pub const OUTPUT_EXTENSION: &str = "zip";

/// Paths involved in repackaging one archive, all beside the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePaths {
    pub input: PathBuf,
    /// Scratch directory: the input without its extension
    pub work_dir: PathBuf,
    pub output: PathBuf,
}

impl ArchivePaths {
    /// Canonicalize `path` and derive the working directory and output.
    pub fn resolve(path: &Path) -> Result<Self> {
        let input = path
            .canonicalize()
            .map_err(|source| RepackError::PathResolution {
                path: path.to_path_buf(),
                source,
            })?;

        let ext = input
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();
        if ext != INPUT_EXTENSION {
            return Err(RepackError::UnsupportedExtension {
                path: input,
                ext: if ext.is_empty() { ext } else { format!(".{ext}") },
            });
        }

        Ok(Self {
            work_dir: input.with_extension(""),
            output: input.with_extension(OUTPUT_EXTENSION),
            input,
        })
    }
}

/// Everything decided about one archive before anything is written.
#[derive(Debug)]
pub struct Plan {
    pub paths: ArchivePaths,
    pub book: Book,
    pub visits: Vec<VisitRecord>,
}

impl Plan {
    pub fn placements(&self) -> Vec<Placement<'_>> {
        placement::resolve(self.book.entries.values(), &self.visits)
    }

    /// The reading-order record behind an ordered placement.
    pub fn visit_for(&self, placement: &Placement<'_>) -> Option<&VisitRecord> {
        placement.ordinal.and_then(|ordinal| self.visits.get(ordinal))
    }
}

/// Outcome of a successful [`repack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepackReport {
    pub output: PathBuf,
    /// Entries renamed into reading order
    pub ordered: usize,
    /// Entries copied under their original name
    pub passthrough: usize,
    /// Members in the written package, directories included
    pub members: usize,
}

/// Read the archive at `path` and work out its placements.
pub fn plan(path: &Path) -> Result<Plan> {
    let paths = ArchivePaths::resolve(path)?;
    let book = reader::read_book(&paths.input)?;
    let visits = nav::visit_order(&book.navigation.content, &book.navigation.prefix)?;
    info!(
        input = %paths.input.display(),
        entries = book.entries.len(),
        visits = visits.len(),
        "planned"
    );
    Ok(Plan {
        paths,
        book,
        visits,
    })
}

/// Repackage the archive at `path` into `<path without extension>.zip`.
pub fn repack(path: &Path) -> Result<RepackReport> {
    let plan = plan(path)?;
    let placements = plan.placements();
    let ordered = placements.iter().filter(|p| p.ordinal.is_some()).count();

    let work_dir = WorkDir::create(&plan.paths.work_dir)?;
    package::materialize(&placements, work_dir.path())?;
    let members = package::pack_directory(work_dir.path(), &plan.paths.output)?;
    drop(work_dir);

    info!(
        output = %plan.paths.output.display(),
        ordered,
        members,
        "packaged"
    );
    Ok(RepackReport {
        output: plan.paths.output.clone(),
        ordered,
        passthrough: placements.len() - ordered,
        members,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn derives_paths_beside_input() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("my.book.epub");
        fs::write(&input, b"").unwrap();
        let paths = ArchivePaths::resolve(&input).unwrap();
        let dir = tmp.path().canonicalize().unwrap();
        assert_eq!(paths.input, dir.join("my.book.epub"));
        assert_eq!(paths.work_dir, dir.join("my.book"));
        assert_eq!(paths.output, dir.join("my.book.zip"));
    }

    #[test]
    fn rejects_other_extensions() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("book.zip");
        fs::write(&input, b"").unwrap();
        let err = ArchivePaths::resolve(&input).unwrap_err();
        assert!(matches!(err, RepackError::UnsupportedExtension { ref ext, .. } if ext == ".zip"));
    }

    #[test]
    fn missing_input_is_a_path_error() {
        let tmp = TempDir::new().unwrap();
        let err = ArchivePaths::resolve(&tmp.path().join("nope.epub")).unwrap_err();
        assert!(matches!(err, RepackError::PathResolution { .. }));
    }
}
