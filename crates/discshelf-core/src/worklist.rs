//! The worklist and how titles get into it
//!
//! Titles enter the worklist from three places: single images added by the
//! caller, directory scans for `.cue`/`.iso` images, and scans of an output
//! tree for manifests written by earlier runs. All of them go through
//! [`Worklist::upsert`], so an identifier appears at most once.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

use crate::config::{Config, MANIFEST_FILE_NAME};
use crate::error::{Error, Result};
use crate::inspector::Inspector;
use crate::manifest::{apply_manifest, load_manifest_file};
use crate::title::{Platform, Title};

/// Image extensions picked up by directory scans
pub const IMAGE_EXTENSIONS: &[&str] = &["cue", "iso"];

static SERIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([A-Z]{4})[-_ ]?(\d{3})\.?(\d{2})\b").expect("valid serial pattern")
});

// ============================================================================
// Disc identification
// ============================================================================

/// What identification found out about a source image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscInfo {
    /// Disc serial
    pub identifier: String,
    /// Title, empty when unknown
    pub title: String,
    /// Disc format
    pub platform: Platform,
}

/// Reads the identifier (and whatever else it can) out of a source image
#[cfg_attr(test, mockall::automock)]
pub trait DiscInspector: Send + Sync {
    /// Identify one image
    fn inspect_disc(&self, source: &Path) -> Result<DiscInfo>;
}

/// Identifies images by the serial embedded in their file name
///
/// Matches the usual `SLUS-00402`, `SLES_123.45` and `SCUS 94163` spellings
/// and normalises them to `AAAA-NNNNN`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilenameInspector {
    platform: Platform,
}

impl FilenameInspector {
    /// Create an inspector reporting [`Platform::UnknownFormat`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform assigned to every identified image
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }
}

/// Extract a normalised serial from free text
pub fn find_serial(text: &str) -> Option<String> {
    SERIAL_RE.captures(text).map(|caps| {
        format!("{}-{}{}", caps[1].to_uppercase(), &caps[2], &caps[3])
    })
}

impl DiscInspector for FilenameInspector {
    fn inspect_disc(&self, source: &Path) -> Result<DiscInfo> {
        let name = file_stem(source);
        let identifier = find_serial(&name).ok_or_else(|| Error::Discovery {
            path: source.to_path_buf(),
            reason: "no identifier found in file name".to_string(),
        })?;
        Ok(DiscInfo {
            identifier,
            title: String::new(),
            platform: self.platform,
        })
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

// ============================================================================
// Worklist
// ============================================================================

/// Result of a discovery pass
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Titles that were not in the worklist before
    pub added: usize,
    /// Existing titles updated in place
    pub updated: usize,
    /// Per-item failures; none of them stopped the scan
    pub errors: Vec<Error>,
}

impl DiscoveryReport {
    fn record(&mut self, inserted: bool) {
        if inserted {
            self.added += 1;
        } else {
            self.updated += 1;
        }
    }
}

/// Ordered collection of titles, unique by identifier
#[derive(Debug, Clone, Default)]
pub struct Worklist {
    titles: Vec<Title>,
}

impl Worklist {
    /// Create an empty worklist
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of titles
    pub fn len(&self) -> usize {
        self.titles.len()
    }

    /// Whether the worklist is empty
    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    /// Titles in order
    pub fn titles(&self) -> &[Title] {
        &self.titles
    }

    /// Titles in order, mutable
    pub fn titles_mut(&mut self) -> &mut [Title] {
        &mut self.titles
    }

    /// Look up a title by identifier
    pub fn get(&self, identifier: &str) -> Option<&Title> {
        self.titles.iter().find(|t| t.identifier() == identifier)
    }

    /// Look up a title by identifier, mutable
    pub fn get_mut(&mut self, identifier: &str) -> Option<&mut Title> {
        self.titles.iter_mut().find(|t| t.identifier() == identifier)
    }

    /// Insert a title, or update the existing one with the same identifier
    ///
    /// Returns `true` when the title was appended.
    pub fn upsert(&mut self, title: Title) -> bool {
        match self.get_mut(title.identifier()) {
            Some(existing) => {
                existing.update_from(&title);
                false
            }
            None => {
                self.titles.push(title);
                true
            }
        }
    }

    /// Identify one image and add it
    pub fn add_image(
        &mut self,
        source: &Path,
        inspector: &dyn DiscInspector,
        config: &Config,
    ) -> Result<bool> {
        if !source.is_file() {
            return Err(Error::Discovery {
                path: source.to_path_buf(),
                reason: "not a file".to_string(),
            });
        }
        let info = inspector.inspect_disc(source)?;
        if info.identifier.trim().is_empty() {
            return Err(Error::Discovery {
                path: source.to_path_buf(),
                reason: "no identifier found".to_string(),
            });
        }

        let display_title = if config.title_from_filename || info.title.is_empty() {
            file_stem(source)
        } else {
            info.title
        };
        tracing::debug!("Adding {} as {}", source.display(), info.identifier);
        Ok(self.upsert(Title::new(
            display_title,
            info.identifier.trim(),
            info.platform,
            source,
        )))
    }

    /// Add every image found below `root`, or `root` itself when it is a file
    pub fn scan_images(
        &mut self,
        root: &Path,
        inspector: &dyn DiscInspector,
        config: &Config,
    ) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        for path in find_files(root, &mut report, is_image_path) {
            match self.add_image(&path, inspector, config) {
                Ok(inserted) => report.record(inserted),
                Err(e) => {
                    tracing::warn!("{}", e);
                    report.errors.push(e);
                }
            }
        }
        report
    }

    /// Recover titles from the manifests found below `root`
    ///
    /// A manifest whose identifier is already in the worklist refreshes that
    /// title; any other manifest creates a title that is not flagged as
    /// modified.
    pub fn scan_manifests(&mut self, root: &Path) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        let is_manifest =
            |p: &Path| p.file_name().is_some_and(|n| n == MANIFEST_FILE_NAME);

        for path in find_files(root, &mut report, is_manifest) {
            let fields = load_manifest_file(&path);
            let identifier = fields
                .identifier
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string();
            if identifier.is_empty() {
                let e = Error::Discovery {
                    path: path.clone(),
                    reason: "manifest has no game ID".to_string(),
                };
                tracing::warn!("{}", e);
                report.errors.push(e);
                continue;
            }

            match self.get_mut(&identifier) {
                Some(existing) => {
                    apply_manifest(existing, fields, &path);
                    report.record(false);
                }
                None => {
                    let mut title = Title::from_manifest_placeholder();
                    apply_manifest(&mut title, fields, &path);
                    report.record(self.upsert(title));
                }
            }
        }
        report
    }

    /// Refresh every title from the output tree
    ///
    /// A title whose archive cannot be inspected is reported and left as it
    /// was read; the remaining titles are still refreshed.
    pub fn load_existing(&mut self, config: &Config, inspector: &Inspector) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        for title in &mut self.titles {
            match refresh(title, config, inspector) {
                Ok(()) => report.record(false),
                Err(e) => {
                    tracing::warn!("Failed to refresh {}: {}", title.identifier(), e);
                    report.errors.push(e);
                }
            }
        }
        report
    }

    /// Take the titles out of the worklist
    pub fn into_titles(self) -> Vec<Title> {
        self.titles
    }
}

impl From<Vec<Title>> for Worklist {
    fn from(titles: Vec<Title>) -> Self {
        let mut worklist = Worklist::new();
        for title in titles {
            worklist.upsert(title);
        }
        worklist
    }
}

/// Reload one title's state from its manifest and archive
///
/// Existence flags are recomputed, the manifest (if any) is applied with the
/// usual recovery rules, and the archive (if any) is inspected.
pub fn refresh(title: &mut Title, config: &Config, inspector: &Inspector) -> Result<()> {
    let manifest = config.manifest_path(title);
    title.manifest_exists = manifest.is_file();
    if title.manifest_exists {
        apply_manifest(title, load_manifest_file(&manifest), &manifest);
    }

    inspector.inspect(title, config)?;
    Ok(())
}

fn find_files(
    root: &Path,
    report: &mut DiscoveryReport,
    wanted: impl Fn(&Path) -> bool,
) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_file() && wanted(entry.path()) => {
                found.push(entry.into_path());
            }
            Ok(_) => {}
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                report.errors.push(Error::Discovery {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }
    found
}
