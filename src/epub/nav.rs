//! Navigation Parser: read `toc.ncx` and flatten it into reading order.
//!
//! The document is a tree of `navPoint`s under `ncx/navMap`:
//!
//! ```xml
//! <ncx xmlns="http://www.daisy.org/z3986/2005/ncx/">
//!   <navMap>
//!     <navPoint id="p1">
//!       <navLabel><text>Chapter 1</text></navLabel>
//!       <content src="text/ch1.html#top"/>
//!       <navPoint>...</navPoint>
//!     </navPoint>
//!   </navMap>
//! </ncx>
//! ```
//!
//! Flattening is a pre-order walk. A `src` seen before does not produce a
//! second [`VisitRecord`], but the walk still descends into its children.

use std::collections::HashSet;

use roxmltree::{Document, Node, ParsingOptions};
use thiserror::Error;

use super::parent_dir;

/// Token in a destination template that is replaced by the padded ordinal.
pub const ORDINAL_PLACEHOLDER: &str = "{ordinal}";

/// Stands in for `/` inside titles, which become file names.
pub const SEPARATOR_SUBSTITUTE: char = '|';

/// Content files are renamed to this extension regardless of their own.
pub const OUTPUT_EXTENSION: &str = "html";

#[derive(Debug, Error)]
pub enum NavError {
    #[error("no toc.ncx in archive")]
    Missing,

    #[error("read {name} error: {error:#}")]
    Unreadable { name: String, error: anyhow::Error },

    #[error("toc.ncx is not UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    #[error("parse toc.ncx error: {0}")]
    Unparsable(#[from] roxmltree::Error),

    #[error("malformed toc.ncx: {0}")]
    Malformed(String),
}

/// One `navPoint` of the table of contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavNode {
    /// Label text with `/` replaced by [`SEPARATOR_SUBSTITUTE`]
    pub title: String,
    /// `content/@src` without its `#fragment`
    pub content_src: String,
    pub children: Vec<NavNode>,
}

/// A unique content file in reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitRecord {
    /// Archive path of the content file
    pub src: String,
    /// Sanitized title of the first `navPoint` pointing at `src`
    pub title: String,
    /// Destination path holding one [`ORDINAL_PLACEHOLDER`]
    pub dest_template: String,
}

impl VisitRecord {
    fn new(src: String, title: &str) -> Self {
        let file_name = format!("{ORDINAL_PLACEHOLDER}-{title}.{OUTPUT_EXTENSION}");
        let dest_template = match parent_dir(&src) {
            "." => file_name,
            dir => format!("{dir}/{file_name}"),
        };
        Self {
            src,
            title: title.to_string(),
            dest_template,
        }
    }
}

pub fn sanitize_title(title: &str) -> String {
    title.trim().replace('/', &SEPARATOR_SUBSTITUTE.to_string())
}

pub fn strip_fragment(src: &str) -> &str {
    src.split_once('#').map_or(src, |(path, _)| path)
}

/// Parse a navigation document into its `navPoint` tree.
pub fn parse_nav_tree(content: &[u8]) -> Result<Vec<NavNode>, NavError> {
    let text = std::str::from_utf8(content)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    // Most NCX files carry a DOCTYPE
    let mut options = ParsingOptions::default();
    options.allow_dtd = true;
    let doc = Document::parse_with_options(text, options)?;

    let root = doc.root_element();
    if root.tag_name().name() != "ncx" {
        return Err(NavError::Malformed(format!(
            "root element is <{}>, expected <ncx>",
            root.tag_name().name()
        )));
    }

    let mut nodes = Vec::new();
    for nav_map in child_elements(root, "navMap") {
        for nav_point in child_elements(nav_map, "navPoint") {
            nodes.push(parse_nav_point(nav_point)?);
        }
    }
    Ok(nodes)
}

fn parse_nav_point(node: Node) -> Result<NavNode, NavError> {
    let title = child_elements(node, "navLabel")
        .flat_map(|label| child_elements(label, "text"))
        .next()
        .and_then(|text| text.text())
        .unwrap_or_default();

    let Some(src) = child_elements(node, "content")
        .next()
        .and_then(|content| content.attribute("src"))
    else {
        let id = node.attribute("id").unwrap_or("?");
        return Err(NavError::Malformed(format!(
            "navPoint {id} has no content src"
        )));
    };

    let children = child_elements(node, "navPoint")
        .map(parse_nav_point)
        .collect::<Result<_, _>>()?;

    Ok(NavNode {
        title: sanitize_title(title),
        content_src: strip_fragment(src).to_string(),
        children,
    })
}

/// Element children matched by local name, so namespaced NCX works too
fn child_elements<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |child| child.is_element() && child.tag_name().name() == name)
}

/// Flatten the tree into unique [`VisitRecord`]s, first occurrence first.
pub fn flatten(nodes: &[NavNode], toc_prefix: &str) -> Vec<VisitRecord> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();
    visit(nodes, toc_prefix, &mut seen, &mut records);
    records
}

fn visit(
    nodes: &[NavNode],
    toc_prefix: &str,
    seen: &mut HashSet<String>,
    records: &mut Vec<VisitRecord>,
) {
    for node in nodes {
        let src = format!("{toc_prefix}{}", node.content_src);
        if seen.insert(src.clone()) {
            records.push(VisitRecord::new(src, &node.title));
        }
        visit(&node.children, toc_prefix, seen, records);
    }
}

/// Parse `content` and return the reading order it defines.
pub fn visit_order(content: &[u8], toc_prefix: &str) -> Result<Vec<VisitRecord>, NavError> {
    Ok(flatten(&parse_nav_tree(content)?, toc_prefix))
}
