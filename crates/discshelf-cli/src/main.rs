//! Discshelf - turn a library of CD images into CHD archives
//!
//! # Usage
//!
//! ```bash
//! # Convert every image under ~/roms into /srv/archive
//! discshelf process ~/roms --output /srv/archive
//!
//! # Only reprocess titles edited since the last run
//! discshelf process ~/roms --output /srv/archive --only-modified
//!
//! # Give a title a description and rewrite its README
//! discshelf edit SLUS-00402 --output /srv/archive --description "Third entry"
//!
//! # List what an output tree already holds
//! discshelf scan /srv/archive
//!
//! # Per-track MD5 of one image
//! discshelf hash "Tekken 3 (USA).cue"
//! ```

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use console::style;
use discshelf_core::{ArchivePolicy, CancelToken, Platform};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod progress;

/// Discshelf - turn a library of CD images into CHD archives
#[derive(Parser)]
#[command(name = "discshelf")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Suppress ALL output (implies --quiet)
    #[arg(long, global = true)]
    silent: bool,

    /// Use this configuration file instead of the default one
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert images to CHD and write README manifests
    Process {
        /// Image files (.cue, .iso) or directories to scan for them
        inputs: Vec<PathBuf>,

        /// Output root (<output>/<platform>/<game id>/)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// When to run chdman (skip, missing, all)
        #[arg(long, value_name = "POLICY")]
        policy: Option<ArchivePolicy>,

        /// Rewrite existing README files and re-hash their tracks
        #[arg(long)]
        overwrite_manifests: bool,

        /// Only process titles that changed since they were last processed
        #[arg(long)]
        only_modified: bool,

        /// Name archives after the game ID instead of the image file
        #[arg(long)]
        id_as_archive_name: bool,

        /// Use the image file name as the game title
        #[arg(long)]
        title_from_filename: bool,

        /// Platform assigned to discovered images (e.g. SonyPSX)
        #[arg(long, value_name = "PLATFORM")]
        platform: Option<Platform>,

        /// Path to the chdman executable
        #[arg(long, value_name = "PATH", env = "DISCSHELF_CHDMAN")]
        chdman: Option<PathBuf>,

        /// README template file
        #[arg(long, value_name = "PATH")]
        template: Option<PathBuf>,

        /// Executable run after each title as `<exe> <output> <id> <title>`
        #[arg(long, value_name = "PATH")]
        post_processor: Option<PathBuf>,
    },

    /// Change the title or description of a recorded game and rewrite its README
    Edit {
        /// Game ID of the title (e.g. SLUS-00402)
        identifier: String,

        /// Output root holding the title
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// New game title
        #[arg(long)]
        title: Option<String>,

        /// New description
        #[arg(long)]
        description: Option<String>,

        /// Path to the chdman executable
        #[arg(long, value_name = "PATH", env = "DISCSHELF_CHDMAN")]
        chdman: Option<PathBuf>,
    },

    /// List titles recorded in an output tree
    Scan {
        /// Output root to scan for README files
        dir: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Calculate per-track MD5 of an image
    Hash {
        /// Cue sheet or ISO image
        source: PathBuf,
    },

    /// Show chdman info for an archive
    Info {
        /// CHD archive
        archive: PathBuf,

        /// Path to the chdman executable
        #[arg(long, value_name = "PATH", env = "DISCSHELF_CHDMAN")]
        chdman: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show or create the configuration file
    Config {
        /// Create a configuration file with default values
        #[arg(long)]
        init: bool,

        /// Print the configuration file path
        #[arg(long)]
        path: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    // Set up panic handler for nicer error messages
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{} {}", style("Error:").red().bold(), panic_info);
    }));

    if let Err(e) = run() {
        // `{:#}` prints the whole cause chain
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // --silent implies --quiet (no logs at all, not even errors to tracing)
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else if cli.quiet || cli.silent {
        EnvFilter::new("off")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let silent = cli.silent;

    // First Ctrl+C cancels the batch, the second one exits
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            if !silent {
                eprintln!("\n{}", style("Forced exit").red().bold());
            }
            std::process::exit(130);
        }
        handler_token.cancel();
        if !silent {
            eprintln!(
                "\n{}",
                style("Cancelling... Press Ctrl+C again to force exit").yellow()
            );
        }
    })?;

    match cli.command {
        Commands::Process {
            inputs,
            output,
            policy,
            overwrite_manifests,
            only_modified,
            id_as_archive_name,
            title_from_filename,
            platform,
            chdman,
            template,
            post_processor,
        } => commands::process::execute(commands::process::ProcessArgs {
            inputs,
            output,
            policy,
            overwrite_manifests,
            only_modified,
            id_as_archive_name,
            title_from_filename,
            platform,
            chdman,
            template,
            post_processor,
            config_file: cli.config,
            cancel,
            silent,
        }),
        Commands::Edit {
            identifier,
            output,
            title,
            description,
            chdman,
        } => commands::edit::execute(commands::edit::EditArgs {
            identifier,
            output,
            title,
            description,
            chdman,
            config_file: cli.config,
            cancel,
            silent,
        }),
        Commands::Scan { dir, json } => commands::scan::execute(&dir, json, silent),
        Commands::Hash { source } => commands::hash::execute(&source, &cancel, silent),
        Commands::Info {
            archive,
            chdman,
            json,
        } => commands::info::execute(&archive, chdman, cli.config, json, silent),
        Commands::Config { init, path, json } => {
            commands::config::execute(commands::config::ConfigArgs {
                init,
                path,
                json,
                silent,
                config_file: cli.config,
            })
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    }
}
