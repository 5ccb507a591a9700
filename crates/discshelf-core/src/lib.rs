//! # Discshelf Core
//!
//! Core library turning a library of CD images into CHD archives, each with
//! a README manifest holding its title, game ID, archive hash and per-track
//! MD5 list.
//!
//! ## Modules
//!
//! - `tracks`: Track enumeration from cue sheets and ISO images
//! - `hasher`: Streaming per-track MD5
//! - `converter`: `chdman createcd` with progress and cancellation
//! - `inspector`: `chdman info` parsing
//! - `manifest`: README generation and recovery
//! - `worklist`: Title discovery and the identifier-keyed worklist
//! - `postprocess`: Optional external post-processing step
//! - `batch`: Per-title stage sequencing across a worklist
//! - `error`: Error types and result aliases
//! - `config`: Runtime configuration
//! - `settings`: Persistent user settings from configuration file
//!
//! ## Example
//!
//! ```no_run
//! use discshelf_core::{Batch, CancelToken, Config, FilenameInspector, Worklist};
//! use std::path::Path;
//!
//! let config = Config::new().output_dir("/srv/archive");
//!
//! let mut worklist = Worklist::new();
//! worklist.scan_manifests(&config.output_dir);
//! let found = worklist.scan_images(Path::new("/roms"), &FilenameInspector::new(), &config);
//! for error in &found.errors {
//!     eprintln!("{}", error);
//! }
//!
//! let report = Batch::new(config).run(worklist.titles_mut(), &CancelToken::new())?;
//! println!("{} of {} titles processed", report.processed, report.total);
//! # Ok::<(), discshelf_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod cancel;
pub mod config;
pub mod converter;
pub mod error;
pub mod hasher;
pub mod inspector;
pub mod manifest;
pub mod postprocess;
pub mod settings;
pub mod title;
pub mod tool;
pub mod tracks;
pub mod worklist;

pub use batch::{Batch, BatchEvent, BatchReport, Stage, TitleError};
pub use cancel::CancelToken;
pub use config::{ArchivePolicy, Config, ARCHIVE_EXTENSION, MANIFEST_FILE_NAME};
pub use converter::{ConvertOutcome, Converter, SkipReason};
pub use error::{Error, Result};
pub use hasher::{HashOutcome, HashProgress, Hasher, HASH_BUFFER_SIZE};
pub use inspector::{ArchiveInfo, InfoParser, InspectOutcome, Inspector, PositionalInfoParser};
pub use manifest::{
    apply_manifest, load_manifest_file, parse_manifest, render_manifest, GenerateOutcome,
    ManifestFields, ManifestGenerator, ParseIssue, DEFAULT_TEMPLATE,
};
pub use postprocess::{resolve_post_processor, CommandPostProcessor, PostProcessor};
pub use settings::{
    ArchiveSettings, ManifestSettings, OutputSettings, Settings, SettingsError, ToolSettings,
};
pub use title::{ArchiveMetadata, Platform, Title, TrackHash, TrackHashes};
pub use tool::default_tool_path;
pub use tracks::enumerate_tracks;
pub use worklist::{
    refresh, DiscInfo, DiscInspector, DiscoveryReport, FilenameInspector, Worklist,
};
