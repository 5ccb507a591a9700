//! Archive metadata through `chdman info`
//!
//! The info output is parsed by position: chdman prints a fixed layout and
//! the fields needed for the manifest live on known lines. That parsing is
//! kept behind [`InfoParser`] so a different chdman layout only needs a new
//! parser.

use regex::Regex;
use serde::Serialize;
use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::LazyLock;
use std::thread;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::title::Title;
use crate::tool::spawn_tool;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"chdman - MAME Compressed Hunks of Data \(CHD\) manager (\d\.\d+) \(.+\)")
        .expect("valid version pattern")
});

/// Line holding the chdman banner with its version
pub const VERSION_LINE: usize = 0;
/// Line holding `File Version: <n>`
pub const FILE_VERSION_LINE: usize = 2;
/// Line holding `SHA1: <hex>`
pub const SHA1_LINE: usize = 11;
/// Line holding `Data SHA1: <hex>`
pub const DATA_SHA1_LINE: usize = 12;

/// Fields read from `chdman info`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveInfo {
    /// chdman version, e.g. `0.262`
    pub tool_version: String,
    /// CHD format version
    pub format_version: u32,
    /// Uppercase SHA1 of the whole archive
    pub full_file_hash: String,
    /// Uppercase SHA1 of the decompressed data
    pub content_hash: String,
}

/// Turns the stdout lines of `chdman info` into [`ArchiveInfo`]
pub trait InfoParser: Send {
    /// Parse the captured stdout lines
    fn parse(&self, lines: &[String]) -> Result<ArchiveInfo>;
}

/// Parser bound to the line layout of current chdman releases
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionalInfoParser;

impl InfoParser for PositionalInfoParser {
    fn parse(&self, lines: &[String]) -> Result<ArchiveInfo> {
        if lines.len() <= DATA_SHA1_LINE {
            return Err(Error::Inspection(format!(
                "expected at least {} lines of chdman info output, got {}",
                DATA_SHA1_LINE + 1,
                lines.len()
            )));
        }

        let tool_version = VERSION_RE
            .captures(&lines[VERSION_LINE])
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| {
                Error::Inspection(format!(
                    "unrecognised chdman banner: {}",
                    lines[VERSION_LINE]
                ))
            })?;

        let version_text = value_after_last_colon(&lines[FILE_VERSION_LINE]);
        let format_version = version_text.parse::<u32>().map_err(|_| {
            Error::Inspection(format!(
                "invalid file version: {}",
                lines[FILE_VERSION_LINE]
            ))
        })?;

        Ok(ArchiveInfo {
            tool_version,
            format_version,
            full_file_hash: value_after_last_colon(&lines[SHA1_LINE]).to_uppercase(),
            content_hash: value_after_last_colon(&lines[DATA_SHA1_LINE]).to_uppercase(),
        })
    }
}

fn value_after_last_colon(line: &str) -> &str {
    line.rsplit(':').next().unwrap_or(line).trim()
}

/// What the inspection step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectOutcome {
    /// Archive metadata loaded into the title
    Loaded,
    /// No archive on disk, nothing to inspect
    Missing,
}

/// Runs `chdman info` and applies the result to titles
pub struct Inspector {
    parser: Box<dyn InfoParser>,
}

impl Inspector {
    /// Create an inspector using [`PositionalInfoParser`]
    pub fn new() -> Self {
        Self::with_parser(PositionalInfoParser)
    }

    /// Create an inspector with a custom parser
    pub fn with_parser<P: InfoParser + 'static>(parser: P) -> Self {
        Self {
            parser: Box::new(parser),
        }
    }

    /// Load archive metadata for a title if its archive exists
    pub fn inspect(&self, title: &mut Title, config: &Config) -> Result<InspectOutcome> {
        let archive = config.archive_path(title);
        tracing::debug!("Loading chdman info from {}", archive.display());
        if !archive.is_file() {
            title.archive_exists = false;
            return Ok(InspectOutcome::Missing);
        }

        let info = self.inspect_path(&config.tool_path, &archive)?;
        title.archive.tool_version = info.tool_version;
        title.archive.format_version = info.format_version;
        title.archive.full_file_hash = info.full_file_hash;
        title.archive.content_hash = info.content_hash;
        title.archive_exists = true;
        tracing::debug!("Loaded chdman info from {}", archive.display());
        Ok(InspectOutcome::Loaded)
    }

    /// Run `chdman info -i <archive>` and parse its output
    pub fn inspect_path(&self, tool: &Path, archive: &Path) -> Result<ArchiveInfo> {
        let args: [&OsStr; 3] = [OsStr::new("info"), OsStr::new("-i"), archive.as_os_str()];
        let mut child = spawn_tool(tool, args)?;

        let stderr = child.stderr.take();
        let stderr_reader = thread::spawn(move || collect_lines(stderr));
        let stdout = collect_lines(child.stdout.take());
        let errors = stderr_reader.join().unwrap_or_default();
        child.wait()?;

        if !errors.is_empty() {
            tracing::error!(
                "Failed to load chdman info from {}: {}",
                archive.display(),
                errors.join("\n")
            );
            return Err(Error::Inspection(errors.join("\n")));
        }

        self.parser.parse(&stdout)
    }
}

impl Default for Inspector {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_lines<R: Read>(stream: Option<R>) -> Vec<String> {
    stream
        .map(|s| BufReader::new(s).lines().map_while(|l| l.ok()).collect())
        .unwrap_or_default()
}
