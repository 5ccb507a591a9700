//! Edit command - change a recorded title and rewrite its manifest

use anyhow::{bail, Context, Result};
use console::style;
use discshelf_core::{ArchivePolicy, CancelToken, Worklist};
use std::path::PathBuf;

use super::load_settings;
use super::process::{print_report, run_batch};

/// Arguments for the edit command
pub struct EditArgs {
    /// Game ID of the title to edit
    pub identifier: String,
    /// Output root holding the title
    pub output: Option<PathBuf>,
    /// New display title
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// chdman override, used to refresh archive info
    pub chdman: Option<PathBuf>,
    /// Custom configuration file path
    pub config_file: Option<PathBuf>,
    /// Set by the Ctrl+C handler
    pub cancel: CancelToken,
    /// Suppress output
    pub silent: bool,
}

/// Execute the edit command
pub fn execute(args: EditArgs) -> Result<()> {
    if args.title.is_none() && args.description.is_none() {
        bail!("Nothing to edit, pass --title and/or --description");
    }

    let mut config = load_settings(args.config_file.clone()).to_config();
    if let Some(output) = &args.output {
        config = config.output_dir(output);
    }
    if let Some(chdman) = &args.chdman {
        config = config.tool_path(chdman);
    }
    config.validate()?;
    if !config.output_dir.is_dir() {
        bail!("Not a directory: {}", config.output_dir.display());
    }

    // Archives are never rebuilt here; only the manifest is rewritten
    let config = config
        .archive_policy(ArchivePolicy::Skip)
        .overwrite_manifests(true)
        .only_modified(true);

    let mut worklist = Worklist::new();
    worklist.scan_manifests(&config.output_dir);
    let Some(title) = worklist.get_mut(&args.identifier) else {
        bail!(
            "No manifest for game ID {} in {}",
            args.identifier,
            config.output_dir.display()
        );
    };

    if let Some(new_title) = args.title {
        title.set_display_title(new_title);
    }
    if let Some(description) = args.description {
        title.set_description(description);
    }
    println_if!(
        args.silent,
        "{} {} ({})",
        style("Editing").bold(),
        style(title.display_title()).cyan(),
        title.identifier()
    );

    let report = run_batch(config, worklist, args.cancel, args.silent)
        .with_context(|| format!("Failed to rewrite manifest of {}", args.identifier))?;
    print_report(&report, args.silent);
    if !report.is_clean() {
        bail!("Manifest of {} was not rewritten", args.identifier);
    }
    Ok(())
}
