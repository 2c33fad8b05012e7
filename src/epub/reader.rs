//! Archive Reader: load every member of an EPUB into memory.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, warn};

use super::nav::NavError;
use super::parent_dir;
use crate::error::{RepackError, Result};
use crate::io::{LocalFileReader, ReadAt};
use crate::zip::ZipExtractor;

/// Base name of the navigation document.
pub const NAVIGATION_FILE_NAME: &str = "toc.ncx";

/// One non-directory archive member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub content: Vec<u8>,
}

/// The `toc.ncx` member, kept apart from the content entries.
#[derive(Debug, Clone)]
pub struct NavigationDocument {
    pub name: String,
    /// Directory holding the document plus `/`, or empty at archive root
    pub prefix: String,
    pub content: Vec<u8>,
}

/// Everything read out of one EPUB.
#[derive(Debug)]
pub struct Book {
    /// Content entries keyed by archive path; excludes the navigation document
    pub entries: BTreeMap<String, Entry>,
    pub navigation: NavigationDocument,
}

/// Prefix that `toc.ncx`-relative references need to become archive paths.
pub fn toc_prefix(nav_name: &str) -> String {
    match parent_dir(nav_name) {
        "." => String::new(),
        dir => format!("{dir}/"),
    }
}

/// Open the EPUB at `path` and read it completely.
///
/// The file handle is closed before this returns, whatever the outcome.
pub fn read_book(path: &Path) -> Result<Book> {
    let reader = LocalFileReader::new(path).map_err(|error| RepackError::ArchiveOpen {
        path: path.to_path_buf(),
        error,
    })?;
    read_book_from(reader, path)
}

/// Read a book from any random-access source; `origin` only labels errors.
pub fn read_book_from<R: ReadAt>(reader: R, origin: &Path) -> Result<Book> {
    let open_error = |error| RepackError::ArchiveOpen {
        path: origin.to_path_buf(),
        error,
    };
    let extractor = ZipExtractor::new(reader).map_err(open_error)?;
    let members = extractor.list_files().map_err(open_error)?;

    let mut entries = BTreeMap::new();
    let mut navigation = None;

    for member in members.iter().filter(|m| !m.is_directory) {
        let base_name = member
            .file_name
            .rsplit('/')
            .next()
            .unwrap_or(&member.file_name);

        if base_name == NAVIGATION_FILE_NAME {
            if navigation.is_none() {
                let content = extractor.extract_to_memory(member).map_err(|error| {
                    NavError::Unreadable {
                        name: member.file_name.clone(),
                        error,
                    }
                })?;
                let prefix = toc_prefix(&member.file_name);
                debug!(name = %member.file_name, %prefix, "found navigation document");
                navigation = Some(NavigationDocument {
                    name: member.file_name.clone(),
                    prefix,
                    content,
                });
                continue;
            }
            warn!(name = %member.file_name, "ignoring extra navigation document");
        }

        let content = extractor
            .extract_to_memory(member)
            .map_err(|error| RepackError::EntryRead {
                name: member.file_name.clone(),
                error,
            })?;
        let entry = Entry {
            name: member.file_name.clone(),
            content,
        };
        if entries.insert(entry.name.clone(), entry).is_some() {
            warn!(name = %member.file_name, "duplicate member name, keeping the later one");
        }
    }

    let navigation = navigation.ok_or(NavError::Missing)?;
    Ok(Book {
        entries,
        navigation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use crate::zip::{CDFH_MIN_SIZE, CDFH_SIGNATURE, CompressionMethod, ZipWriter};

    fn archive(members: &[(&str, &[u8])]) -> MemoryReader {
        let mut writer = ZipWriter::new(Vec::new());
        for (name, data) in members {
            if name.ends_with('/') {
                writer.add_directory(name).unwrap();
            } else {
                writer
                    .add_file(name, data, CompressionMethod::Deflate)
                    .unwrap();
            }
        }
        MemoryReader::new(writer.finish().unwrap())
    }

    #[test]
    fn toc_prefix_at_root_is_empty() {
        assert_eq!(toc_prefix("toc.ncx"), "");
        assert_eq!(toc_prefix("OEBPS/toc.ncx"), "OEBPS/");
        assert_eq!(toc_prefix("a/b/toc.ncx"), "a/b/");
    }

    #[test]
    fn separates_navigation_from_entries() {
        let reader = archive(&[
            ("mimetype", b"application/epub+zip"),
            ("OEBPS/", b""),
            ("OEBPS/toc.ncx", b"<ncx/>"),
            ("OEBPS/ch1.html", b"<p>1</p>"),
        ]);
        let book = read_book_from(reader, Path::new("book.epub")).unwrap();

        assert_eq!(book.navigation.name, "OEBPS/toc.ncx");
        assert_eq!(book.navigation.prefix, "OEBPS/");
        assert_eq!(book.navigation.content, b"<ncx/>");
        let names: Vec<_> = book.entries.keys().map(String::as_str).collect();
        assert_eq!(names, ["OEBPS/ch1.html", "mimetype"]);
        assert_eq!(book.entries["OEBPS/ch1.html"].content, b"<p>1</p>");
    }

    #[test]
    fn first_navigation_document_wins() {
        let reader = archive(&[("toc.ncx", b"<first/>"), ("extra/toc.ncx", b"<second/>")]);
        let book = read_book_from(reader, Path::new("book.epub")).unwrap();
        assert_eq!(book.navigation.content, b"<first/>");
        assert_eq!(book.navigation.prefix, "");
        assert!(book.entries.contains_key("extra/toc.ncx"));
    }

    #[test]
    fn missing_navigation_document_is_an_error() {
        let reader = archive(&[("OEBPS/ch1.html", b"<p>1</p>")]);
        let err = read_book_from(reader, Path::new("book.epub")).unwrap_err();
        assert!(matches!(err, RepackError::Navigation(NavError::Missing)));
    }

    /// Overwrite the central directory sizes recorded for `name`.
    fn forge_sizes(data: &mut [u8], name: &str, compressed: u32, uncompressed: u32) {
        let pos = (0..data.len() - CDFH_MIN_SIZE)
            .find(|&i| {
                &data[i..i + 4] == CDFH_SIGNATURE
                    && data[i + CDFH_MIN_SIZE..].starts_with(name.as_bytes())
            })
            .unwrap();
        data[pos + 20..pos + 24].copy_from_slice(&compressed.to_le_bytes());
        data[pos + 24..pos + 28].copy_from_slice(&uncompressed.to_le_bytes());
    }

    fn forged_book(compressed: Option<u32>, uncompressed: Option<u32>) -> Result<Book> {
        let mut writer = ZipWriter::new(Vec::new());
        writer
            .add_file("toc.ncx", b"<ncx/>", CompressionMethod::Deflate)
            .unwrap();
        writer
            .add_file("ch1.html", b"<p>hi</p>", CompressionMethod::Deflate)
            .unwrap();
        let mut data = writer.finish().unwrap();
        let entry = ZipExtractor::new(MemoryReader::new(data.clone()))
            .unwrap()
            .list_files()
            .unwrap()
            .remove(1);
        forge_sizes(
            &mut data,
            "ch1.html",
            compressed.unwrap_or(entry.compressed_size as u32),
            uncompressed.unwrap_or(entry.uncompressed_size as u32),
        );
        read_book_from(MemoryReader::new(data), Path::new("forged.epub"))
    }

    #[test]
    fn oversized_uncompressed_claim_is_an_entry_error() {
        let err = forged_book(None, Some(0xFFFF_FFF0)).unwrap_err();
        assert!(matches!(err, RepackError::EntryRead { ref name, .. } if name == "ch1.html"));
    }

    #[test]
    fn oversized_compressed_claim_is_an_entry_error() {
        let err = forged_book(Some(0xFFFF_FFF0), None).unwrap_err();
        assert!(matches!(err, RepackError::EntryRead { ref name, .. } if name == "ch1.html"));
    }

    #[test]
    fn invalid_archive_is_an_open_error() {
        let reader = MemoryReader::new(b"PK but not really a zip archive".to_vec());
        let err = read_book_from(reader, Path::new("broken.epub")).unwrap_err();
        assert!(matches!(err, RepackError::ArchiveOpen { .. }));
        assert!(err.to_string().contains("broken.epub"));
    }
}
