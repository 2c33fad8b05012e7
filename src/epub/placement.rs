//! Placement Resolver: map every entry to its path in the new archive.

use std::borrow::Cow;
use std::collections::HashMap;

use super::nav::{ORDINAL_PLACEHOLDER, VisitRecord};
use super::reader::Entry;

/// Where one entry goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement<'a> {
    pub entry: &'a Entry,
    /// Archive-relative destination, `/`-separated
    pub dest_path: String,
    /// Position in reading order, `None` for passthrough entries
    pub ordinal: Option<usize>,
}

impl<'a> Placement<'a> {
    /// Bytes to write at `dest_path`.
    pub fn content(&self) -> Cow<'a, [u8]> {
        let entry: &'a Entry = self.entry;
        match self.ordinal {
            Some(_) => rewrite_headings(&entry.content),
            None => Cow::Borrowed(&entry.content),
        }
    }
}

/// Hook for rewriting the headings of ordered content files.
///
/// Content passes through untouched for now; renumbering headings to match
/// their new position would happen here.
pub fn rewrite_headings(content: &[u8]) -> Cow<'_, [u8]> {
    Cow::Borrowed(content)
}

/// Number of decimal digits in `count`, with 0 taking one digit.
pub fn digit_width(count: usize) -> usize {
    count.checked_ilog10().map_or(1, |digits| digits as usize + 1)
}

/// Zero-padded ordinal substituted into `template`.
pub fn render_template(template: &str, ordinal: usize, width: usize) -> String {
    template.replacen(ORDINAL_PLACEHOLDER, &format!("{ordinal:0width$}"), 1)
}

/// Resolve one [`Placement`] per entry, in the entries' iteration order.
pub fn resolve<'a, I>(entries: I, visits: &[VisitRecord]) -> Vec<Placement<'a>>
where
    I: IntoIterator<Item = &'a Entry>,
{
    let width = digit_width(visits.len());
    let by_src: HashMap<&str, (usize, &VisitRecord)> = visits
        .iter()
        .enumerate()
        .map(|(i, record)| (record.src.as_str(), (i, record)))
        .collect();

    entries
        .into_iter()
        .map(|entry| match by_src.get(entry.name.as_str()) {
            Some(&(ordinal, record)) => Placement {
                entry,
                dest_path: render_template(&record.dest_template, ordinal, width),
                ordinal: Some(ordinal),
            },
            None => Placement {
                entry,
                dest_path: entry.name.clone(),
                ordinal: None,
            },
        })
        .collect()
}
