//! Track enumeration for cue sheets and single-file images

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::title::is_iso_path;

static BINARY_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*FILE "(.+)" BINARY"#).expect("valid FILE pattern"));

/// List the raw data files making up one disc image, in track order
///
/// An ISO yields itself. Anything else is read as a cue sheet and every
/// `FILE "<name>" BINARY` line contributes `<name>` resolved against the
/// sheet's directory.
pub fn enumerate_tracks(source: &Path) -> Result<Vec<PathBuf>> {
    if !source.is_file() {
        return Err(Error::SourceNotFound(source.display().to_string()));
    }

    if is_iso_path(source) {
        return Ok(vec![source.to_path_buf()]);
    }

    let sheet = fs::read_to_string(source)?;
    let base = source.parent().unwrap_or_else(|| Path::new("."));
    let tracks = parse_cue_files(&sheet)
        .into_iter()
        .map(|name| base.join(name))
        .collect::<Vec<_>>();

    if tracks.is_empty() {
        tracing::warn!("No BINARY files listed in {}", source.display());
    }
    tracing::debug!("Tracks from {}: {:?}", source.display(), tracks);
    Ok(tracks)
}

/// Extract the file names of `FILE "<name>" BINARY` lines in order
pub fn parse_cue_files(sheet: &str) -> Vec<String> {
    sheet
        .lines()
        .filter_map(|line| BINARY_FILE_RE.captures(line))
        .map(|caps| caps[1].to_string())
        .collect()
}
