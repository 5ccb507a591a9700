//! Scan command - lists the titles recorded in an output tree

use anyhow::{bail, Context, Result};
use console::style;
use discshelf_core::{Title, Worklist};
use std::path::Path;

/// Execute the scan command
pub fn execute(dir: &Path, json: bool, silent: bool) -> Result<()> {
    if !dir.is_dir() {
        bail!("Not a directory: {}", dir.display());
    }

    let mut worklist = Worklist::new();
    let report = worklist.scan_manifests(dir);

    if json {
        let output = serde_json::to_string_pretty(worklist.titles())
            .context("Failed to serialize titles to JSON")?;
        println!("{}", output);
        return Ok(());
    }

    if silent {
        return Ok(());
    }

    if worklist.is_empty() {
        println!("No README manifests found in {}", dir.display());
    } else {
        println!(
            "{} {} titles in {}",
            style("Found").bold(),
            worklist.len(),
            style(dir.display()).cyan()
        );
        println!();
        for title in worklist.titles() {
            println!("{}", format_row(title));
        }
    }

    if !report.errors.is_empty() {
        eprintln!();
        eprintln!(
            "{} {} manifest(s) could not be read:",
            style("Warning:").yellow(),
            report.errors.len()
        );
        for e in &report.errors {
            eprintln!("  - {}", e);
        }
    }

    Ok(())
}

/// One line per title: ID, platform, track count, title
fn format_row(title: &Title) -> String {
    format!(
        "  {:<12} {:<14} {:>2} tracks  {}",
        title.identifier(),
        title.platform.name(),
        title.archive.track_hashes.len(),
        title.display_title()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use discshelf_core::Platform;

    #[test]
    fn test_format_row() {
        let mut title = Title::new("Tekken 3", "SLUS-00402", Platform::SonyPSX, "");
        title.archive.track_hashes.insert(1, "AA");
        let row = format_row(&title);
        assert!(row.contains("SLUS-00402"));
        assert!(row.contains("SonyPSX"));
        assert!(row.contains(" 1 tracks"));
        assert!(row.ends_with("Tekken 3"));
    }

    #[test]
    fn test_not_a_directory() {
        let result = execute(Path::new("/nonexistent/archive"), false, true);
        assert!(result.is_err());
    }
}
