//! README manifest generation and recovery
//!
//! The manifest is the only durable record of a title's metadata, so it is
//! written from a template by plain token substitution and read back by
//! looking for the bold anchor lines the template always contains:
//!
//! ```text
//! **Game name:**
//! **Game ID:**
//! **Hash:**
//! **Description:**
//! ```
//!
//! Parsing never fails hard. A missing anchor or an unreadable track line is
//! recorded as a [`ParseIssue`] and only that field is left unrecovered.

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::title::{Platform, Title, TrackHashes};

/// Placeholder for the display title
pub const TOKEN_TITLE: &str = "#gameTitle#";
/// Placeholder for the identifier
pub const TOKEN_ID: &str = "#gameId#";
/// Placeholder for the archive's data SHA1
pub const TOKEN_ARCHIVE_HASH: &str = "#chdHash#";
/// Placeholder for the per-track MD5 block
pub const TOKEN_TRACK_HASHES: &str = "#binHashes#";
/// Placeholder for the description
pub const TOKEN_DESCRIPTION: &str = "#description#";

/// Anchor preceding the title
pub const ANCHOR_TITLE: &str = "**Game name:**";
/// Anchor preceding the identifier
pub const ANCHOR_ID: &str = "**Game ID:**";
/// Anchor preceding the hash section
pub const ANCHOR_HASH: &str = "**Hash:**";
/// Anchor preceding the description
pub const ANCHOR_DESCRIPTION: &str = "**Description:**";

/// Number of lines after the ID anchor that may hold the identifier
const ID_WINDOW: usize = 3;

/// Prefixes of lines that carry a track hash
const TRACK_LINE_PREFIXES: &[&str] = &["TRACK", "BIN (TRACK"];

static TRACK_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"TRACK (\d{2})\)? MD5: (\S+)").expect("valid track line pattern")
});

/// Template used when no template file is configured
pub const DEFAULT_TEMPLATE: &str = "# #gameTitle#

**Game name:**

#gameTitle#

**Game ID:**

#gameId#

**Hash:**

CHD SHA1: #chdHash#

#binHashes#

**Description:**

#description#
";

// ============================================================================
// Generation
// ============================================================================

/// Substitute every placeholder in `template` with the title's fields
pub fn render_manifest(template: &str, title: &Title) -> String {
    template
        .replace(TOKEN_TITLE, title.display_title())
        .replace(TOKEN_ID, title.identifier())
        .replace(TOKEN_ARCHIVE_HASH, &title.archive.content_hash)
        .replace(
            TOKEN_TRACK_HASHES,
            &title.archive.track_hashes.to_manifest_block(),
        )
        .replace(TOKEN_DESCRIPTION, title.description())
}

/// What the generation step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// Manifest written
    Written,
    /// Manifest exists and overwriting is disabled
    Skipped,
}

/// Writes manifests from the configured template
#[derive(Debug, Clone, Default)]
pub struct ManifestGenerator {
    template_path: Option<PathBuf>,
}

impl ManifestGenerator {
    /// Create a generator using the template configured in `config`
    pub fn new(config: &Config) -> Self {
        Self {
            template_path: config.template_path.clone(),
        }
    }

    /// Load the template text
    pub fn template(&self) -> Result<String> {
        match &self.template_path {
            Some(path) => fs::read_to_string(path).map_err(|source| Error::Template {
                path: path.clone(),
                source,
            }),
            None => Ok(DEFAULT_TEMPLATE.to_string()),
        }
    }

    /// Write the title's manifest unless one exists and may not be replaced
    pub fn generate(&self, title: &mut Title, config: &Config) -> Result<GenerateOutcome> {
        let path = config.manifest_path(title);
        tracing::debug!("Readme path: {}", path.display());
        if path.exists() && !config.overwrite_manifests {
            title.manifest_exists = true;
            return Ok(GenerateOutcome::Skipped);
        }

        let template = self.template()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, render_manifest(&template, title))?;
        title.manifest_exists = true;
        tracing::debug!("Readme generated for {}", title.identifier());
        Ok(GenerateOutcome::Written)
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// A field that could not be recovered from a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseIssue {
    /// An anchor line is missing
    MissingAnchor(&'static str),
    /// Both anchors exist but the first one comes after the second
    AnchorsOutOfOrder(&'static str, &'static str),
    /// A track line did not match the expected layout; the whole list was dropped
    BadTrackLine(String),
}

impl std::fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseIssue::MissingAnchor(anchor) => write!(f, "missing {} marker", anchor),
            ParseIssue::AnchorsOutOfOrder(first, second) => {
                write!(f, "{} marker should come before {}", first, second)
            }
            ParseIssue::BadTrackLine(line) => write!(f, "unreadable track line: {}", line),
        }
    }
}

/// Fields recovered from a manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestFields {
    /// Display title
    pub title: Option<String>,
    /// Identifier
    pub identifier: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Track hashes in listed order
    pub track_hashes: Option<TrackHashes>,
    /// Everything that could not be recovered
    pub issues: Vec<ParseIssue>,
}

fn find_anchor<S: AsRef<str>>(lines: &[S], anchor: &str) -> Option<usize> {
    lines.iter().position(|l| l.as_ref().contains(anchor))
}

/// Recover title, identifier, description and track hashes from manifest lines
pub fn parse_manifest<S: AsRef<str>>(lines: &[S]) -> ManifestFields {
    let mut fields = ManifestFields::default();
    let title_at = find_anchor(lines, ANCHOR_TITLE);
    let id_at = find_anchor(lines, ANCHOR_ID);
    let hash_at = find_anchor(lines, ANCHOR_HASH);
    let description_at = find_anchor(lines, ANCHOR_DESCRIPTION);

    match (title_at, id_at) {
        (Some(start), Some(end)) if start < end => {
            let title = concat(&lines[start + 1..end]);
            fields.title = Some(title);
        }
        (Some(_), Some(_)) => fields
            .issues
            .push(ParseIssue::AnchorsOutOfOrder(ANCHOR_TITLE, ANCHOR_ID)),
        (None, _) => fields.issues.push(ParseIssue::MissingAnchor(ANCHOR_TITLE)),
        (Some(_), None) => {}
    }

    match id_at {
        Some(at) => {
            let end = (at + 1 + ID_WINDOW).min(lines.len());
            fields.identifier = Some(concat(&lines[at + 1..end]));
        }
        None => fields.issues.push(ParseIssue::MissingAnchor(ANCHOR_ID)),
    }

    match description_at {
        Some(at) => {
            let description = lines[at + 1..]
                .iter()
                .map(|l| l.as_ref())
                .collect::<Vec<_>>()
                .join("\n");
            fields.description = Some(description.trim().to_string());
        }
        None => fields
            .issues
            .push(ParseIssue::MissingAnchor(ANCHOR_DESCRIPTION)),
    }

    match (hash_at, description_at) {
        (Some(hash), Some(description)) if hash > description => fields
            .issues
            .push(ParseIssue::AnchorsOutOfOrder(ANCHOR_HASH, ANCHOR_DESCRIPTION)),
        (Some(hash), Some(description)) => {
            let start = hash + 1;
            let end = description.saturating_sub(1).max(start);
            match parse_track_lines(&lines[start.min(end)..end]) {
                Ok(hashes) => fields.track_hashes = Some(hashes),
                Err(issue) => fields.issues.push(issue),
            }
        }
        (None, _) => fields.issues.push(ParseIssue::MissingAnchor(ANCHOR_HASH)),
        // Missing description anchor is already recorded
        (Some(_), None) => {}
    }

    fields
}

fn concat<S: AsRef<str>>(lines: &[S]) -> String {
    lines
        .iter()
        .map(|l| l.as_ref())
        .collect::<String>()
        .trim()
        .to_string()
}

fn parse_track_lines<S: AsRef<str>>(lines: &[S]) -> std::result::Result<TrackHashes, ParseIssue> {
    let mut hashes = TrackHashes::new();
    for line in lines.iter().map(|l| l.as_ref().trim()) {
        if !TRACK_LINE_PREFIXES.iter().any(|p| line.starts_with(p)) {
            continue;
        }
        let caps = TRACK_LINE_RE
            .captures(line)
            .ok_or_else(|| ParseIssue::BadTrackLine(line.to_string()))?;
        let number = caps[1]
            .parse::<u32>()
            .map_err(|_| ParseIssue::BadTrackLine(line.to_string()))?;
        hashes.insert(number, caps[2].trim().to_string());
    }
    Ok(hashes)
}

/// Infer the platform from a manifest at `<root>/<platform>/<identifier>/README.md`
pub fn platform_from_manifest_path(path: &Path) -> Option<Platform> {
    path.parent()?
        .parent()?
        .file_name()?
        .to_str()?
        .parse::<Platform>()
        .ok()
}

/// Read a manifest file and parse it
///
/// An unreadable file yields empty fields with an issue per anchor.
pub fn load_manifest_file(path: &Path) -> ManifestFields {
    match fs::read_to_string(path) {
        Ok(text) => {
            let lines: Vec<&str> = text.lines().collect();
            parse_manifest(&lines)
        }
        Err(e) => {
            tracing::error!("Failed to read manifest {}: {}", path.display(), e);
            parse_manifest::<&str>(&[])
        }
    }
}

/// Apply recovered fields to a title
///
/// Local edits win over the manifest, an identifier is only filled in when
/// missing, and a track list that is already loaded is never replaced.
pub fn apply_manifest(title: &mut Title, fields: ManifestFields, path: &Path) {
    for issue in &fields.issues {
        let e = Error::Parse(format!("{}: {}", path.display(), issue));
        tracing::error!("Failed to load manifest field: {}", e);
    }

    if let Some(recovered) = fields.title {
        if !title.modified {
            if !recovered.is_empty() {
                title.recover_display_title(recovered);
            }
            title.manifest_exists = true;
        }
    }

    if let Some(description) = fields.description {
        if !title.modified && title.description().is_empty() {
            title.recover_description(description);
        }
    }

    if let Some(hashes) = fields.track_hashes {
        if title.archive.track_hashes.is_empty() {
            title.archive.track_hashes = hashes;
        }
    }

    if title.identifier().is_empty() {
        if let Some(identifier) = fields.identifier.filter(|id| !id.is_empty()) {
            title.recover_identifier(identifier);
            title.manifest_exists = true;
        }
    }

    if title.platform.is_unknown() {
        if let Some(platform) = platform_from_manifest_path(path) {
            title.platform = platform;
        }
    }
}
