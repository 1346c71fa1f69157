//! Preview command: run the reconciler against a local export

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tally_core::{compose_summary, month_start, parse_export, ParsedExport};

pub fn cmd_preview(file: &Path, now: Option<&str>) -> Result<()> {
    let export = preview_export(file, now)?;

    if export.groups.is_empty() {
        println!("No ended months to write.");
    }

    for group in export.groups.values() {
        println!();
        println!("📄 Sheet {} ({} expenses)", group.month, group.records.len());
        for row in group.rows() {
            println!("   {}", row.join(" | "));
        }
    }

    println!();
    println!("{}", compose_summary(&export.notes));

    Ok(())
}

/// Parse `file` with the cutoff derived from `now` (defaults to the clock)
pub fn preview_export(file: &Path, now: Option<&str>) -> Result<ParsedExport> {
    let now = match now {
        Some(s) => DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("Invalid --now timestamp: {}", s))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let csv_file =
        File::open(file).with_context(|| format!("Failed to open file: {}", file.display()))?;

    Ok(parse_export(BufReader::new(csv_file), month_start(now)))
}
