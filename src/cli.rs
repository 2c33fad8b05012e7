use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "epubsort")]
#[command(version)]
#[command(about = "Repackage EPUB files with content renamed in table-of-contents order", long_about = None)]
#[command(after_help = "Examples:\n  \
  epubsort book.epub             write book.zip next to book.epub\n  \
  epubsort -l book.epub          show where every file would go\n  \
  epubsort -q *.epub             repackage many books, errors only")]
pub struct Cli {
    /// EPUB files to repackage
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// List the planned placements instead of writing archives
    #[arg(short = 'l')]
    pub list: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    /// Log filter used when `RUST_LOG` is not set
    pub fn default_log_filter(&self) -> &'static str {
        if self.is_very_quiet() { "error" } else { "warn" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_at_least_one_file() {
        assert!(Cli::try_parse_from(["epubsort"]).is_err());
    }

    #[test]
    fn parses_flags_and_files() {
        let cli = Cli::try_parse_from(["epubsort", "-l", "-qq", "a.epub", "b.epub"]).unwrap();
        assert!(cli.list);
        assert!(cli.is_very_quiet());
        assert_eq!(cli.default_log_filter(), "error");
        assert_eq!(cli.files, [PathBuf::from("a.epub"), PathBuf::from("b.epub")]);
    }
}
