//! Info command - chdman metadata of one archive

use anyhow::{bail, Context, Result};
use console::style;
use discshelf_core::Inspector;
use std::path::{Path, PathBuf};

use super::load_settings;

/// Execute the info command
pub fn execute(
    archive: &Path,
    chdman: Option<PathBuf>,
    config_file: Option<PathBuf>,
    json: bool,
    silent: bool,
) -> Result<()> {
    if !archive.is_file() {
        bail!("Archive not found: {}", archive.display());
    }

    let tool = match chdman {
        Some(tool) => tool,
        None => load_settings(config_file).to_config().tool_path,
    };

    let info = Inspector::new()
        .inspect_path(&tool, archive)
        .with_context(|| format!("Failed to read chdman info for {}", archive.display()))?;

    if json {
        let output =
            serde_json::to_string_pretty(&info).context("Failed to serialize info to JSON")?;
        println!("{}", output);
        return Ok(());
    }

    if silent {
        return Ok(());
    }

    println!("{} {}", style("Archive:").bold(), style(archive.display()).cyan());
    println!("  {} {}", style("chdman version:").dim(), info.tool_version);
    println!("  {} {}", style("CHD version:").dim(), info.format_version);
    println!("  {} {}", style("SHA1:").dim(), info.full_file_hash);
    println!("  {} {}", style("Data SHA1:").dim(), info.content_hash);
    Ok(())
}
