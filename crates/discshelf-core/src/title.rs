//! Title data model
//!
//! A [`Title`] is one disc image in the worklist together with the archive
//! metadata that ends up in its manifest.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Disc formats a title can belong to
///
/// The textual form is used as a directory name in the output tree, so it
/// must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Platform {
    /// Sony PlayStation
    SonyPSX,
    /// Sony PlayStation 2
    SonyPS2,
    /// Sony PlayStation Portable
    SonyPSP,
    /// Sega Saturn
    SegaSaturn,
    /// Sega CD / Mega CD
    SegaCD,
    /// Sega Dreamcast
    SegaDreamcast,
    /// NEC PC Engine CD / TurboGrafx-CD
    PCEngineCD,
    /// Philips CD-i
    PhilipsCDi,
    /// SNK Neo Geo CD
    NeoGeoCD,
    /// Panasonic 3DO
    Panasonic3DO,
    /// Plain audio CD
    AudioCD,
    /// Not detected
    #[default]
    UnknownFormat,
}

impl Platform {
    /// Get the stable name of the platform
    pub fn name(&self) -> &'static str {
        match self {
            Platform::SonyPSX => "SonyPSX",
            Platform::SonyPS2 => "SonyPS2",
            Platform::SonyPSP => "SonyPSP",
            Platform::SegaSaturn => "SegaSaturn",
            Platform::SegaCD => "SegaCD",
            Platform::SegaDreamcast => "SegaDreamcast",
            Platform::PCEngineCD => "PCEngineCD",
            Platform::PhilipsCDi => "PhilipsCDi",
            Platform::NeoGeoCD => "NeoGeoCD",
            Platform::Panasonic3DO => "Panasonic3DO",
            Platform::AudioCD => "AudioCD",
            Platform::UnknownFormat => "UnknownFormat",
        }
    }

    /// List all platforms, `UnknownFormat` last
    pub fn all() -> &'static [Platform] {
        &[
            Platform::SonyPSX,
            Platform::SonyPS2,
            Platform::SonyPSP,
            Platform::SegaSaturn,
            Platform::SegaCD,
            Platform::SegaDreamcast,
            Platform::PCEngineCD,
            Platform::PhilipsCDi,
            Platform::NeoGeoCD,
            Platform::Panasonic3DO,
            Platform::AudioCD,
            Platform::UnknownFormat,
        ]
    }

    /// Whether the platform is still undetected
    pub fn is_unknown(&self) -> bool {
        *self == Platform::UnknownFormat
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::all()
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| Error::InvalidConfig(format!("Unknown platform: {}", s)))
    }
}

/// Hash of a single track file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackHash {
    /// 1-based track number in listing order
    pub number: u32,
    /// Uppercase hex MD5
    pub hash: String,
}

/// Ordered per-track hash list, unique by track number
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackHashes(Vec<TrackHash>);

impl TrackHashes {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a track hash, replacing the hash of an already present track number
    pub fn insert(&mut self, number: u32, hash: impl Into<String>) {
        let hash = hash.into();
        match self.0.iter_mut().find(|t| t.number == number) {
            Some(existing) => existing.hash = hash,
            None => self.0.push(TrackHash { number, hash }),
        }
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Number of tracks
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in insertion (track) order
    pub fn iter(&self) -> std::slice::Iter<'_, TrackHash> {
        self.0.iter()
    }

    /// Look up the hash of a track
    pub fn get(&self, number: u32) -> Option<&str> {
        self.0
            .iter()
            .find(|t| t.number == number)
            .map(|t| t.hash.as_str())
    }

    /// Render the manifest block, one `TRACK NN MD5: <hash>` line per track
    pub fn to_manifest_block(&self) -> String {
        self.0
            .iter()
            .map(|t| format!("TRACK {:02} MD5: {}", t.number, t.hash))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<'a> IntoIterator for &'a TrackHashes {
    type Item = &'a TrackHash;
    type IntoIter = std::slice::Iter<'a, TrackHash>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<(u32, String)> for TrackHashes {
    fn from_iter<I: IntoIterator<Item = (u32, String)>>(iter: I) -> Self {
        let mut hashes = TrackHashes::new();
        for (number, hash) in iter {
            hashes.insert(number, hash);
        }
        hashes
    }
}

/// Metadata of the CHD archive and the source tracks it was built from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    /// chdman version that produced the info output
    pub tool_version: String,
    /// CHD file format version
    pub format_version: u32,
    /// SHA1 of the decompressed data (`Data SHA1`)
    pub content_hash: String,
    /// SHA1 of the whole archive including metadata (`SHA1`)
    pub full_file_hash: String,
    /// Per-track MD5 list
    pub track_hashes: TrackHashes,
}

/// A disc image in the worklist
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Title {
    display_title: String,
    identifier: String,
    /// Disc format, may be inferred later from the output tree
    pub platform: Platform,
    /// Cue sheet or ISO used as conversion input
    pub source_path: PathBuf,
    description: String,
    /// Whether the manifest file exists in the output tree
    pub manifest_exists: bool,
    /// Whether the archive file exists in the output tree
    pub archive_exists: bool,
    /// Edited or newly discovered since it was last processed
    pub modified: bool,
    /// Archive and track metadata
    pub archive: ArchiveMetadata,
}

impl Title {
    /// Create a title for a freshly discovered image
    pub fn new(
        display_title: impl Into<String>,
        identifier: impl Into<String>,
        platform: Platform,
        source_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            display_title: display_title.into(),
            identifier: identifier.into(),
            platform,
            source_path: source_path.into(),
            modified: true,
            ..Self::default()
        }
    }

    /// Create an empty title to be filled from an existing manifest
    pub fn from_manifest_placeholder() -> Self {
        Self::default()
    }

    /// Display title
    pub fn display_title(&self) -> &str {
        &self.display_title
    }

    /// Identifier (serial) of the disc
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Free-text description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Edit the display title
    pub fn set_display_title(&mut self, title: impl Into<String>) {
        self.display_title = title.into();
        self.modified = true;
    }

    /// Edit the description
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
        self.modified = true;
    }

    // Recovery from a manifest must not flag the title as edited.
    pub(crate) fn recover_display_title(&mut self, title: String) {
        self.display_title = title;
    }

    pub(crate) fn recover_description(&mut self, description: String) {
        self.description = description;
    }

    pub(crate) fn recover_identifier(&mut self, identifier: String) {
        if self.identifier.is_empty() {
            self.identifier = identifier;
        }
    }

    // Rediscovering an image with the same identifier refreshes these in place.
    pub(crate) fn update_from(&mut self, other: &Title) {
        self.display_title = other.display_title.clone();
        self.platform = other.platform;
        self.source_path = other.source_path.clone();
    }
}

/// Whether a path names a single-file ISO image
pub fn is_iso_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("iso"))
}
