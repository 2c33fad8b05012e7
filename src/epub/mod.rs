//! EPUB-specific layers on top of the zip codec.
//!
//! - [`reader`]: splits an archive into content entries and its `toc.ncx`
//! - [`nav`]: turns `toc.ncx` into the reading order
//! - [`placement`]: decides where every entry lands in the new archive

pub mod nav;
pub mod placement;
pub mod reader;

pub use nav::{NavError, NavNode, VisitRecord};
pub use placement::Placement;
pub use reader::{Book, Entry, NavigationDocument};

/// Directory part of a `/`-separated archive path, as `path.Dir` would
/// report it: `"."` when there is no directory, `"/"` for the root.
pub(crate) fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        None => ".",
        Some(i) => match path[..i].trim_end_matches('/') {
            "" => "/",
            dir => dir,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::parent_dir;

    #[test]
    fn parent_dir_matches_path_semantics() {
        assert_eq!(parent_dir("toc.ncx"), ".");
        assert_eq!(parent_dir("OEBPS/toc.ncx"), "OEBPS");
        assert_eq!(parent_dir("OEBPS/text/ch1.html"), "OEBPS/text");
        assert_eq!(parent_dir("OEBPS//toc.ncx"), "OEBPS");
        assert_eq!(parent_dir("/toc.ncx"), "/");
    }
}
