//! Command-line driver: repackage each EPUB argument in turn.
//!
//! A failing archive is reported on stderr and does not stop the batch.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use epubsort::{Cli, RepackError, plan, repack};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let mut failed = 0usize;
    for path in &cli.files {
        let outcome = if cli.list {
            list_placements(path)
        } else {
            repack_file(path, &cli)
        };
        if let Err(err) = outcome {
            eprintln!("{}: {}", path.display(), err);
            failed += 1;
        }
    }

    if failed > 0 {
        warn!(failed, total = cli.files.len(), "some archives were not repackaged");
    }
    Ok(())
}

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.default_log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Print `dest <- src` for every entry, reading order first.
fn list_placements(path: &Path) -> Result<(), RepackError> {
    let plan = plan(path)?;
    let mut placements = plan.placements();
    placements.sort_by_key(|p| (p.ordinal.is_none(), p.ordinal, p.dest_path.clone()));

    println!("{}:", plan.paths.input.display());
    for placement in &placements {
        match plan.visit_for(placement) {
            Some(visit) => println!(
                "  {}  <-  {}  \"{}\"",
                placement.dest_path, placement.entry.name, visit.title
            ),
            None => println!("  {}  <-  {}", placement.dest_path, placement.entry.name),
        }
    }
    println!("  => {}", plan.paths.output.display());
    Ok(())
}

fn repack_file(path: &Path, cli: &Cli) -> Result<(), RepackError> {
    let report = repack(path)?;
    if !cli.is_quiet() {
        println!(
            "  repacked: {} -> {} ({} ordered, {} kept)",
            path.display(),
            report.output.display(),
            report.ordered,
            report.passthrough
        );
    }
    Ok(())
}
