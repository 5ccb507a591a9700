//! Persistent user settings for discshelf
//!
//! Settings are stored in a TOML configuration file at:
//! - Linux/macOS: `~/.config/discshelf/discshelf_config.toml`
//! - Windows: `%APPDATA%\discshelf\discshelf_config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! [output]
//! dir = "/srv/archive"
//!
//! [archive]
//! policy = "generate-missing"
//! id_as_name = false
//!
//! [manifest]
//! overwrite = false
//! only_modified = false
//! title_from_filename = false
//! template = ""
//!
//! [tools]
//! chdman = ""
//! post_processor = ""
//! ```
//!
//! Empty strings mean "not set": the built-in template, the default chdman
//! lookup, no post-processor.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::{ArchivePolicy, Config};

/// Configuration file name
const CONFIG_FILE_NAME: &str = "discshelf_config.toml";

/// Application name for config directory
const APP_NAME: &str = "discshelf";

/// User settings loaded from configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Output tree settings
    pub output: OutputSettings,

    /// Archive settings
    pub archive: ArchiveSettings,

    /// Manifest settings
    pub manifest: ManifestSettings,

    /// External tool settings
    pub tools: ToolSettings,
}

/// Where archives and manifests go
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputSettings {
    /// Output root
    pub dir: String,
}

/// Settings for CHD archives
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArchiveSettings {
    /// When to run chdman
    pub policy: ArchivePolicy,

    /// Name archives after the game ID
    pub id_as_name: bool,
}

/// Settings for README manifests
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ManifestSettings {
    /// Rewrite existing manifests
    pub overwrite: bool,

    /// Only process modified titles
    pub only_modified: bool,

    /// Use the image file name as the title
    pub title_from_filename: bool,

    /// Template file
    pub template: String,
}

/// Settings for external executables
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolSettings {
    /// chdman executable
    pub chdman: String,

    /// Post-processor executable
    pub post_processor: String,
}

fn non_empty(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    (!value.is_empty()).then(|| PathBuf::from(value))
}

impl Settings {
    /// Load settings from the configuration file
    ///
    /// Returns default settings if the file doesn't exist or can't be parsed
    pub fn load() -> Self {
        Self::load_from_path(Self::config_path())
    }

    /// Load settings from a specific path
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            tracing::debug!("No config path available, using defaults");
            return Self::default();
        };

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(settings) => {
                    tracing::debug!("Loaded settings from {:?}", path);
                    settings
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save settings to a specific path
    pub fn save_to_path(&self, path: Option<PathBuf>) -> Result<PathBuf, SettingsError> {
        let path = path.ok_or(SettingsError::NoConfigDir)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let contents = toml::to_string_pretty(self).map_err(SettingsError::Serialize)?;

        std::fs::write(&path, contents).map_err(|e| SettingsError::Io {
            path: path.clone(),
            source: e,
        })?;

        tracing::info!("Saved settings to {:?}", path);
        Ok(path)
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join(CONFIG_FILE_NAME))
    }

    /// Get the path to the configuration directory
    pub fn config_dir() -> Option<PathBuf> {
        dirs_next::config_dir().map(|p| p.join(APP_NAME))
    }

    /// Build the runtime configuration these settings describe
    pub fn to_config(&self) -> Config {
        let mut config = Config::new()
            .archive_policy(self.archive.policy)
            .id_as_archive_name(self.archive.id_as_name)
            .overwrite_manifests(self.manifest.overwrite)
            .only_modified(self.manifest.only_modified)
            .title_from_filename(self.manifest.title_from_filename)
            .template_path(non_empty(&self.manifest.template))
            .post_processor(non_empty(&self.tools.post_processor));
        if let Some(dir) = non_empty(&self.output.dir) {
            config = config.output_dir(dir);
        }
        if let Some(chdman) = non_empty(&self.tools.chdman) {
            config = config.tool_path(chdman);
        }
        config
    }
}

/// Errors that can occur when working with settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// No configuration directory available
    #[error("Could not determine configuration directory")]
    NoConfigDir,

    /// Failed to read or write config file
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path that caused the error
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// Failed to serialize settings
    #[error("Failed to serialize settings: {0}")]
    Serialize(toml::ser::Error),
}
