//! Process command - discovers titles and runs the batch

use anyhow::{anyhow, Context, Result};
use console::style;
use discshelf_core::{
    ArchivePolicy, Batch, BatchReport, CancelToken, Config, FilenameInspector, Platform, Settings,
    Worklist,
};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use super::load_settings;
use crate::progress::BatchView;

/// Arguments for the process command
pub struct ProcessArgs {
    /// Image files or directories
    pub inputs: Vec<PathBuf>,
    /// Output root
    pub output: Option<PathBuf>,
    /// Archive policy override
    pub policy: Option<ArchivePolicy>,
    /// Rewrite existing manifests
    pub overwrite_manifests: bool,
    /// Only process modified titles
    pub only_modified: bool,
    /// Name archives after the game ID
    pub id_as_archive_name: bool,
    /// Use the image file name as title
    pub title_from_filename: bool,
    /// Platform for discovered images
    pub platform: Option<Platform>,
    /// chdman override
    pub chdman: Option<PathBuf>,
    /// Template override
    pub template: Option<PathBuf>,
    /// Post-processor override
    pub post_processor: Option<PathBuf>,
    /// Custom configuration file path
    pub config_file: Option<PathBuf>,
    /// Set by the Ctrl+C handler
    pub cancel: CancelToken,
    /// Suppress output
    pub silent: bool,
}

/// Execute the process command
pub fn execute(args: ProcessArgs) -> Result<()> {
    let settings = load_settings(args.config_file.clone());
    let config = build_config(&settings, &args);
    config.validate()?;
    let silent = args.silent;

    println_if!(
        silent,
        "{} {}",
        style("Output:").bold(),
        style(config.output_dir.display()).cyan()
    );

    let worklist = discover(&config, &args);
    if worklist.is_empty() {
        println_if!(silent, "No titles to process.");
        return Ok(());
    }
    println_if!(
        silent,
        "{} {} titles",
        style("Processing").bold(),
        worklist.len()
    );

    let report = run_batch(config, worklist, args.cancel, silent)?;
    print_report(&report, silent);
    Ok(())
}

/// Settings from the configuration file, overridden by command-line flags
fn build_config(settings: &Settings, args: &ProcessArgs) -> Config {
    let mut config = settings.to_config();
    if let Some(output) = &args.output {
        config = config.output_dir(output);
    }
    if let Some(policy) = args.policy {
        config = config.archive_policy(policy);
    }
    if let Some(chdman) = &args.chdman {
        config = config.tool_path(chdman);
    }
    if args.template.is_some() {
        config = config.template_path(args.template.clone());
    }
    if args.post_processor.is_some() {
        config = config.post_processor(args.post_processor.clone());
    }

    let overwrite = config.overwrite_manifests || args.overwrite_manifests;
    let only_modified = config.only_modified || args.only_modified;
    let id_as_name = config.id_as_archive_name || args.id_as_archive_name;
    let from_filename = config.title_from_filename || args.title_from_filename;
    config
        .overwrite_manifests(overwrite)
        .only_modified(only_modified)
        .id_as_archive_name(id_as_name)
        .title_from_filename(from_filename)
}

/// Build the worklist from existing manifests, then from the given inputs
fn discover(config: &Config, args: &ProcessArgs) -> Worklist {
    let mut worklist = Worklist::new();
    let mut errors = Vec::new();

    if config.output_dir.is_dir() {
        let report = worklist.scan_manifests(&config.output_dir);
        tracing::debug!("Recovered {} titles from manifests", report.added);
        errors.extend(report.errors);
    }

    let inspector = FilenameInspector::new().platform(args.platform.unwrap_or_default());
    for input in &args.inputs {
        let report = worklist.scan_images(input, &inspector, config);
        tracing::debug!(
            "{}: {} added, {} updated",
            input.display(),
            report.added,
            report.updated
        );
        errors.extend(report.errors);
    }

    if !errors.is_empty() {
        eprintln!(
            "{} {} item(s) could not be added:",
            style("Warning:").yellow(),
            errors.len()
        );
        for e in &errors {
            eprintln!("  - {}", e);
        }
    }

    worklist
}

/// Run the batch on a worker thread and render its events here
pub(super) fn run_batch(
    config: Config,
    worklist: Worklist,
    cancel: CancelToken,
    silent: bool,
) -> Result<BatchReport> {
    let count = worklist.len();
    let (tx, rx) = mpsc::channel();
    let mut batch = Batch::new(config).on_progress(move |event| {
        // The receiver only goes away once rendering is over
        let _ = tx.send(event.clone());
    });

    let worker = thread::spawn(move || {
        let mut titles = worklist.into_titles();
        batch.run(&mut titles, &cancel)
    });

    let mut view = BatchView::new(count, silent);
    for event in rx {
        view.apply(&event);
    }
    view.finish();

    worker
        .join()
        .map_err(|_| anyhow!("Batch worker panicked"))?
        .context("Batch stopped")
}

pub(super) fn print_report(report: &BatchReport, silent: bool) {
    println_if!(silent);
    if report.cancelled {
        println_if!(silent, "{}", style("Batch cancelled by user.").yellow());
    }
    println_if!(
        silent,
        "  {} {} processed, {} skipped, {} failed",
        style("✓").green(),
        report.processed,
        report.skipped,
        report.errors.len()
    );

    if !report.errors.is_empty() {
        eprintln!("{} Some titles failed:", style("Warning:").yellow());
        for e in &report.errors {
            eprintln!("  - {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ProcessArgs {
        ProcessArgs {
            inputs: Vec::new(),
            output: None,
            policy: None,
            overwrite_manifests: false,
            only_modified: false,
            id_as_archive_name: false,
            title_from_filename: false,
            platform: None,
            chdman: None,
            template: None,
            post_processor: None,
            config_file: None,
            cancel: CancelToken::new(),
            silent: true,
        }
    }

    #[test]
    fn test_flags_override_settings() {
        let mut settings = Settings::default();
        settings.output.dir = "/from/settings".to_string();
        settings.archive.policy = ArchivePolicy::RegenerateAll;
        settings.tools.chdman = "/opt/chdman".to_string();

        let mut args = args();
        args.output = Some(PathBuf::from("/from/flag"));
        args.policy = Some(ArchivePolicy::Skip);
        args.only_modified = true;

        let config = build_config(&settings, &args);
        assert_eq!(config.output_dir, PathBuf::from("/from/flag"));
        assert_eq!(config.archive_policy, ArchivePolicy::Skip);
        assert_eq!(config.tool_path, PathBuf::from("/opt/chdman"));
        assert!(config.only_modified);
    }

    #[test]
    fn test_settings_flags_are_kept() {
        let mut settings = Settings::default();
        settings.manifest.overwrite = true;
        settings.archive.id_as_name = true;

        let config = build_config(&settings, &args());
        assert!(config.overwrite_manifests);
        assert!(config.id_as_archive_name);
        assert!(!config.title_from_filename);
        assert!(config.template_path.is_none());
    }

    #[test]
    fn test_missing_output_is_an_error() {
        let mut args = args();
        args.config_file = Some(PathBuf::from("/nonexistent/discshelf_config.toml"));
        let err = execute(args).unwrap_err();
        assert!(err.to_string().contains("output directory"));
    }
}
