//! Runtime configuration for batch processing

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::title::Title;

/// Name of the manifest written next to every archive
pub const MANIFEST_FILE_NAME: &str = "README.md";

/// Extension of the archive files produced by chdman
pub const ARCHIVE_EXTENSION: &str = "chd";

/// What to do about CHD archives during a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchivePolicy {
    /// Never run the converter
    Skip,
    /// Convert only titles whose archive does not exist yet
    #[default]
    GenerateMissing,
    /// Convert every title, replacing existing archives
    RegenerateAll,
}

impl fmt::Display for ArchivePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchivePolicy::Skip => write!(f, "skip"),
            ArchivePolicy::GenerateMissing => write!(f, "generate-missing"),
            ArchivePolicy::RegenerateAll => write!(f, "regenerate-all"),
        }
    }
}

impl std::str::FromStr for ArchivePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" | "skip-all" | "none" => Ok(ArchivePolicy::Skip),
            "missing" | "generate-missing" => Ok(ArchivePolicy::GenerateMissing),
            "all" | "regenerate-all" => Ok(ArchivePolicy::RegenerateAll),
            other => Err(Error::InvalidConfig(format!(
                "Unknown archive policy: {}",
                other
            ))),
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the output tree (`<root>/<platform>/<identifier>/`)
    pub output_dir: PathBuf,

    /// Archive regeneration policy
    pub archive_policy: ArchivePolicy,

    /// Whether existing manifests are rewritten (and tracks re-hashed)
    pub overwrite_manifests: bool,

    /// Only process titles flagged as modified
    pub only_modified: bool,

    /// Name archives `<IDENTIFIER>.chd` instead of after the source file
    pub id_as_archive_name: bool,

    /// Take the display title from the image file name during discovery
    pub title_from_filename: bool,

    /// chdman executable
    pub tool_path: PathBuf,

    /// Manifest template; the built-in template is used when unset
    pub template_path: Option<PathBuf>,

    /// Optional post-processor executable
    pub post_processor: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::new(),
            archive_policy: ArchivePolicy::default(),
            overwrite_manifests: false,
            only_modified: false,
            id_as_archive_name: false,
            title_from_filename: false,
            tool_path: crate::tool::default_tool_path(),
            template_path: None,
            post_processor: None,
        }
    }
}

impl Config {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output root
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the archive policy
    pub fn archive_policy(mut self, policy: ArchivePolicy) -> Self {
        self.archive_policy = policy;
        self
    }

    /// Set manifest overwrite mode
    pub fn overwrite_manifests(mut self, overwrite: bool) -> Self {
        self.overwrite_manifests = overwrite;
        self
    }

    /// Set only-modified mode
    pub fn only_modified(mut self, only: bool) -> Self {
        self.only_modified = only;
        self
    }

    /// Set identifier-based archive naming
    pub fn id_as_archive_name(mut self, enabled: bool) -> Self {
        self.id_as_archive_name = enabled;
        self
    }

    /// Set title-from-filename discovery
    pub fn title_from_filename(mut self, enabled: bool) -> Self {
        self.title_from_filename = enabled;
        self
    }

    /// Set the chdman executable
    pub fn tool_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tool_path = path.into();
        self
    }

    /// Set the manifest template
    pub fn template_path(mut self, path: Option<PathBuf>) -> Self {
        self.template_path = path;
        self
    }

    /// Set the post-processor executable
    pub fn post_processor(mut self, path: Option<PathBuf>) -> Self {
        self.post_processor = path;
        self
    }

    /// Check that the configuration can drive a batch
    pub fn validate(&self) -> crate::Result<()> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "Please provide a valid output directory".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory holding a title's archive and manifest
    pub fn title_dir(&self, title: &Title) -> PathBuf {
        self.output_dir
            .join(title.platform.name())
            .join(title.identifier())
    }

    /// Path of a title's manifest
    pub fn manifest_path(&self, title: &Title) -> PathBuf {
        self.title_dir(title).join(MANIFEST_FILE_NAME)
    }

    /// File name of a title's archive
    ///
    /// A title recovered from its manifest has no source image; its archive
    /// is then the single `.chd` file already in the title directory, or the
    /// identifier-based name when there is none.
    pub fn archive_name(&self, title: &Title) -> String {
        let by_identifier = || {
            format!(
                "{}.{}",
                title.identifier().to_uppercase(),
                ARCHIVE_EXTENSION
            )
        };
        if self.id_as_archive_name {
            return by_identifier();
        }
        if title.source_path.as_os_str().is_empty() {
            return existing_archive_name(&self.title_dir(title)).unwrap_or_else(by_identifier);
        }
        archive_name_for_source(&title.source_path)
    }

    /// Path of a title's archive
    pub fn archive_path(&self, title: &Title) -> PathBuf {
        self.title_dir(title).join(self.archive_name(title))
    }
}

fn existing_archive_name(dir: &Path) -> Option<String> {
    let mut archives = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|e| e.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
        });
    let first = archives.next()?;
    if archives.next().is_some() {
        tracing::warn!(
            "Several archives in {}, cannot tell which one belongs to the title",
            dir.display()
        );
        return None;
    }
    first.file_name().map(|n| n.to_string_lossy().into_owned())
}

fn archive_name_for_source(source: &Path) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}.{}", stem, ARCHIVE_EXTENSION)
}
