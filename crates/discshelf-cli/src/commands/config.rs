//! Configuration file management command

use anyhow::{Context, Result};
use console::style;
use discshelf_core::Settings;
use std::path::PathBuf;

/// Arguments for the config command
pub struct ConfigArgs {
    /// Initialize a new configuration file with defaults
    pub init: bool,
    /// Show the path to the configuration file
    pub path: bool,
    /// Show configuration in JSON format
    pub json: bool,
    /// Suppress output (for scripting)
    pub silent: bool,
    /// Custom configuration file path (overrides default)
    pub config_file: Option<PathBuf>,
}

/// Execute the config command
pub fn execute(args: ConfigArgs) -> Result<()> {
    let config_path = args.config_file.clone().or_else(Settings::config_path);

    if args.path {
        if let Some(path) = &config_path {
            if !args.silent {
                println!("{}", path.display());
            }
        } else if !args.silent {
            eprintln!("{}", style("Could not determine config path").yellow());
        }
        return Ok(());
    }

    if args.init {
        return init_config(config_path, args.silent);
    }

    show_config(config_path, args.json, args.silent)
}

/// Initialize a new configuration file with default values
fn init_config(config_path: Option<PathBuf>, silent: bool) -> Result<()> {
    let path = config_path.context("Could not determine configuration directory")?;

    if path.exists() {
        if !silent {
            eprintln!(
                "{} Configuration file already exists at: {}",
                style("Warning:").yellow(),
                path.display()
            );
            eprintln!("Use a text editor to modify it, or delete it to re-initialize.");
        }
        return Ok(());
    }

    let saved_path = Settings::default()
        .save_to_path(Some(path))
        .context("Failed to save configuration file")?;

    if !silent {
        println!(
            "{} Created configuration file at: {}",
            style("Success:").green(),
            saved_path.display()
        );
        println!();
        println!("You can edit this file to customize default settings.");
        println!("Example settings:");
        println!();
        println!("  [output]");
        println!("  dir = \"/srv/archive\"      # Default --output");
        println!();
        println!("  [archive]");
        println!("  policy = \"skip\"           # skip, generate-missing, regenerate-all");
        println!();
        println!("  [tools]");
        println!("  chdman = \"/usr/local/bin/chdman\"");
    }

    Ok(())
}

/// Show the current configuration
fn show_config(config_path: Option<PathBuf>, json: bool, silent: bool) -> Result<()> {
    if silent {
        return Ok(());
    }

    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let settings = Settings::load_from_path(config_path.clone());

    if json {
        let json_output = serde_json::to_string_pretty(&settings)
            .context("Failed to serialize settings to JSON")?;
        println!("{}", json_output);
        return Ok(());
    }

    println!("{}", style("Discshelf Configuration").bold());
    println!();

    if let Some(path) = &config_path {
        if config_exists {
            println!("  {} {}", style("Config file:").dim(), path.display());
        } else {
            println!(
                "  {} {} {}",
                style("Config file:").dim(),
                path.display(),
                style("(not found, using defaults)").yellow()
            );
        }
    }
    println!();

    println!("{}", style("[output]").cyan());
    println!("  dir = \"{}\"", settings.output.dir);
    println!();

    println!("{}", style("[archive]").cyan());
    println!("  policy = \"{}\"", settings.archive.policy);
    println!("  id_as_name = {}", settings.archive.id_as_name);
    println!();

    println!("{}", style("[manifest]").cyan());
    println!("  overwrite = {}", settings.manifest.overwrite);
    println!("  only_modified = {}", settings.manifest.only_modified);
    println!(
        "  title_from_filename = {}",
        settings.manifest.title_from_filename
    );
    println!("  template = \"{}\"", settings.manifest.template);
    println!();

    println!("{}", style("[tools]").cyan());
    println!("  chdman = \"{}\"", settings.tools.chdman);
    println!("  post_processor = \"{}\"", settings.tools.post_processor);

    if !config_exists {
        println!();
        println!(
            "{}",
            style("Run 'discshelf config --init' to create a configuration file.").dim()
        );
    }

    Ok(())
}
