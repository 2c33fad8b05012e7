//! Archive Writer: lay placements out on disk and zip the result.

use std::collections::HashSet;
use std::fs;
use std::io::{self, BufWriter};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, bail};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::epub::Placement;
use crate::error::{RepackError, Result};
use crate::zip::{CompressionMethod, ZipWriter};

/// Scratch directory that is removed when dropped.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    /// Create `path`, reusing it if it already exists.
    pub fn create(path: &Path) -> Result<Self> {
        if path.is_dir() {
            warn!(path = %path.display(), "working directory already exists, reusing it");
        }
        fs::create_dir_all(path).map_err(|source| RepackError::WorkingDirectory {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), %err, "cannot remove working directory");
        }
    }
}

/// Join a `/`-separated archive path onto `root`, resolving `.` and `..`
/// lexically. Returns `None` if the result would leave `root` or names
/// nothing.
pub fn safe_join(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut parts: Vec<&str> = Vec::new();
    for part in relative.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            part => {
                let mut components = Path::new(part).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(_)), None) => parts.push(part),
                    _ => return None,
                }
            }
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.iter().fold(root.to_path_buf(), |path, part| path.join(part)))
}

/// Write every placement's content under `root`.
pub fn materialize(placements: &[Placement<'_>], root: &Path) -> Result<()> {
    let mut written = HashSet::new();

    for placement in placements {
        let Some(dest) = safe_join(root, &placement.dest_path) else {
            return Err(RepackError::EntryWrite {
                path: root.join(&placement.dest_path),
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "destination escapes the working directory",
                ),
            });
        };

        if !written.insert(dest.clone()) {
            warn!(dest = %placement.dest_path, src = %placement.entry.name, "overwriting an earlier placement");
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|source| RepackError::EntryWrite {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        debug!(src = %placement.entry.name, dest = %placement.dest_path, "placing");
        fs::write(&dest, placement.content()).map_err(|source| RepackError::EntryWrite {
            path: dest.clone(),
            source,
        })?;
    }

    Ok(())
}

/// Remove a file or directory tree; a missing path is not an error.
fn remove_existing(path: &Path) -> io::Result<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

/// Zip the contents of `root` into `output`, returning the member count.
///
/// Members are named relative to `root`, in sorted walk order; directories
/// get a trailing `/` and files are deflated. A partially written `output`
/// is removed on failure.
pub fn pack_directory(root: &Path, output: &Path) -> Result<usize> {
    let package_error = |error| RepackError::Package {
        path: output.to_path_buf(),
        error,
    };

    remove_existing(output)
        .with_context(|| format!("remove old {}", output.display()))
        .map_err(package_error)?;

    let result = write_package(root, output);
    if result.is_err() {
        let _ = fs::remove_file(output);
    }
    result.map_err(package_error)
}

fn write_package(root: &Path, output: &Path) -> anyhow::Result<usize> {
    let file = fs::File::create(output).with_context(|| format!("create {}", output.display()))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let mut members = 0;

    for item in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let item = item?;
        let relative = item.path().strip_prefix(root)?;
        let name = archive_name(relative)?;

        if item.file_type().is_dir() {
            zip.add_directory(&name)?;
        } else {
            let data = fs::read(item.path())
                .with_context(|| format!("read {}", item.path().display()))?;
            zip.add_file(&name, &data, CompressionMethod::Deflate)?;
        }
        members += 1;
    }

    let out = zip.finish()?;
    out.into_inner()
        .map_err(|err| err.into_error())?
        .sync_all()?;
    Ok(members)
}

/// `/`-joined name of a path relative to the packaged directory.
fn archive_name(relative: &Path) -> anyhow::Result<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy()),
            other => bail!("unexpected path component {:?}", other),
        }
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::Entry;
    use crate::io::LocalFileReader;
    use crate::zip::ZipExtractor;
    use tempfile::TempDir;

    fn entry(name: &str, content: &str) -> Entry {
        Entry {
            name: name.to_string(),
            content: content.as_bytes().to_vec(),
        }
    }

    #[test]
    fn safe_join_stays_inside_root() {
        let root = Path::new("/work");
        assert_eq!(
            safe_join(root, "OEBPS/text/0-A.html"),
            Some(PathBuf::from("/work/OEBPS/text/0-A.html"))
        );
        assert_eq!(safe_join(root, "./a/../b.css"), Some(PathBuf::from("/work/b.css")));
        assert_eq!(safe_join(root, "/abs.css"), Some(PathBuf::from("/work/abs.css")));
        assert_eq!(safe_join(root, "../escape.css"), None);
        assert_eq!(safe_join(root, "a/../../escape.css"), None);
        assert_eq!(safe_join(root, ""), None);
    }

    #[test]
    fn work_dir_is_removed_on_drop() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("book");
        {
            let work = WorkDir::create(&path).unwrap();
            fs::write(work.path().join("x"), b"x").unwrap();
            assert!(path.is_dir());
        }
        assert!(!path.exists());
    }

    #[test]
    fn materialize_writes_bytes_at_destinations() {
        let tmp = TempDir::new().unwrap();
        let entries = [entry("t/a.html", "<p>a</p>"), entry("s.css", "p{}")];
        let placements = [
            Placement {
                entry: &entries[0],
                dest_path: "t/0-A.html".to_string(),
                ordinal: Some(0),
            },
            Placement {
                entry: &entries[1],
                dest_path: "s.css".to_string(),
                ordinal: None,
            },
        ];
        materialize(&placements, tmp.path()).unwrap();
        assert_eq!(fs::read(tmp.path().join("t/0-A.html")).unwrap(), b"<p>a</p>");
        assert_eq!(fs::read(tmp.path().join("s.css")).unwrap(), b"p{}");
    }

    #[test]
    fn materialize_rejects_escaping_paths() {
        let tmp = TempDir::new().unwrap();
        let evil = entry("../evil.html", "x");
        let placements = [Placement {
            entry: &evil,
            dest_path: evil.name.clone(),
            ordinal: None,
        }];
        let err = materialize(&placements, tmp.path()).unwrap_err();
        assert!(matches!(err, RepackError::EntryWrite { .. }));
    }

    #[test]
    fn packs_sorted_tree_with_directory_markers() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("book");
        fs::create_dir_all(root.join("text")).unwrap();
        fs::write(root.join("text/1-B.html"), b"b").unwrap();
        fs::write(root.join("text/0-A.html"), b"a").unwrap();
        fs::write(root.join("mimetype"), b"application/epub+zip").unwrap();

        let output = tmp.path().join("book.zip");
        fs::write(&output, b"stale").unwrap();
        assert_eq!(pack_directory(&root, &output).unwrap(), 4);

        let extractor = ZipExtractor::new(LocalFileReader::new(&output).unwrap()).unwrap();
        let entries = extractor.list_files().unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, ["mimetype", "text/", "text/0-A.html", "text/1-B.html"]);
        assert_eq!(entries[2].compression_method, CompressionMethod::Deflate);
        assert_eq!(extractor.extract_to_memory(&entries[3]).unwrap(), b"b");
    }
}
