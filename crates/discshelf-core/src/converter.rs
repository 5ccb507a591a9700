//! CHD creation through `chdman createcd`
//!
//! chdman reports live progress on stderr. Each line is classified by
//! [`classify_progress_line`]; the completion marker ends reading, an
//! `Error` line fails the conversion before the exit status is even looked
//! at, and everything else that matches the progress pattern moves the
//! percentage forward.

use regex::Regex;
use std::ffi::OsStr;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::Child;
use std::sync::LazyLock;
use std::thread::{self, JoinHandle};

use crate::cancel::CancelToken;
use crate::config::{ArchivePolicy, Config};
use crate::error::{Error, Result};
use crate::title::Title;
use crate::tool::{spawn_tool, ToolLines};

/// Marker chdman prints once the archive is fully written
pub const COMPLETION_MARKER: &str = "Compression complete";

/// Substring that flags a chdman failure line
pub const ERROR_MARKER: &str = "Error";

/// Highest value a progress line may report; 100 comes from the completion marker
const MAX_LINE_PERCENT: f64 = 99.0;

static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Compressing, (.+)% complete\.\.\. \(ratio=.+\..+%\)").expect("valid progress pattern")
});

/// Progress callback type, receives percent complete (0.0 to 100.0)
pub type ProgressCallback = Box<dyn FnMut(f64) + Send>;

/// Meaning of a single stderr line from chdman
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressLine {
    /// Compression finished
    Complete,
    /// chdman reported an error; carries the raw line
    Error(String),
    /// Percent complete
    Progress(f64),
    /// Anything else
    Other,
}

/// Classify one stderr line of `chdman createcd`
pub fn classify_progress_line(line: &str) -> ProgressLine {
    if line.contains(COMPLETION_MARKER) {
        return ProgressLine::Complete;
    }
    if line.contains(ERROR_MARKER) {
        return ProgressLine::Error(line.to_string());
    }
    PROGRESS_RE
        .captures(line)
        .and_then(|caps| caps[1].trim().parse::<f64>().ok())
        .map_or(ProgressLine::Other, ProgressLine::Progress)
}

/// Why the converter did not run chdman
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Archive policy is `Skip`
    PolicyDisabled,
    /// Archive exists and the policy keeps existing archives
    ArchiveExists,
    /// Title has no source image to convert
    NoSource,
}

/// Result of a conversion step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertOutcome {
    /// chdman was not run
    Skipped(SkipReason),
    /// Archive written
    Converted,
    /// Cancelled; chdman was killed and the partial archive removed
    Cancelled,
}

/// Runs `chdman createcd` for one title at a time
pub struct Converter {
    progress_callback: Option<ProgressCallback>,
}

impl Converter {
    /// Create a converter without progress reporting
    pub fn new() -> Self {
        Self {
            progress_callback: None,
        }
    }

    /// Set progress callback
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(f64) + Send + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Convert a title's source image into its archive
    pub fn convert(
        &mut self,
        title: &mut Title,
        config: &Config,
        cancel: &CancelToken,
    ) -> Result<ConvertOutcome> {
        if cancel.is_cancelled() {
            return Ok(ConvertOutcome::Cancelled);
        }
        if config.archive_policy == ArchivePolicy::Skip {
            return Ok(ConvertOutcome::Skipped(SkipReason::PolicyDisabled));
        }

        let archive = config.archive_path(title);
        tracing::debug!("CHD path: {}", archive.display());
        if archive.exists() && config.archive_policy != ArchivePolicy::RegenerateAll {
            title.archive_exists = true;
            return Ok(ConvertOutcome::Skipped(SkipReason::ArchiveExists));
        }
        if title.source_path.as_os_str().is_empty() {
            return Ok(ConvertOutcome::Skipped(SkipReason::NoSource));
        }
        if let Some(parent) = archive.parent() {
            fs::create_dir_all(parent)?;
        }

        if cancel.is_cancelled() {
            return Ok(ConvertOutcome::Cancelled);
        }

        let outcome = self.run_chdman(&config.tool_path, &title.source_path, &archive, cancel)?;
        if outcome == ConvertOutcome::Converted {
            title.archive_exists = true;
            tracing::debug!("Finished conversion of {}", title.identifier());
        }
        Ok(outcome)
    }

    fn run_chdman(
        &mut self,
        tool: &Path,
        source: &Path,
        archive: &Path,
        cancel: &CancelToken,
    ) -> Result<ConvertOutcome> {
        let args: [&OsStr; 6] = [
            OsStr::new("createcd"),
            OsStr::new("-i"),
            source.as_os_str(),
            OsStr::new("-o"),
            archive.as_os_str(),
            OsStr::new("-f"),
        ];
        tracing::debug!(
            "Executing {} createcd -i {:?} -o {:?} -f",
            tool.display(),
            source,
            archive
        );
        let mut child = spawn_tool(tool, args)?;

        // Drain stdout on the side so chdman never stalls on a full pipe.
        let stdout = child.stdout.take();
        let stdout_reader = thread::spawn(move || -> Vec<String> {
            stdout
                .map(|out| BufReader::new(out).lines().map_while(|l| l.ok()).collect())
                .unwrap_or_default()
        });

        let mut last_reported = -1.0f64;
        if let Some(stderr) = child.stderr.take() {
            for line in ToolLines::new(BufReader::new(stderr)) {
                if cancel.is_cancelled() {
                    tracing::debug!("Process cancelled, killing chdman");
                    abort_conversion(&mut child, stdout_reader, archive);
                    return Ok(ConvertOutcome::Cancelled);
                }

                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::debug!("Failed to read chdman output: {}", e);
                        abort_conversion(&mut child, stdout_reader, archive);
                        return Err(e.into());
                    }
                };
                match classify_progress_line(&line) {
                    ProgressLine::Complete => {
                        self.report(&mut last_reported, 100.0);
                        break;
                    }
                    ProgressLine::Error(message) => {
                        tracing::debug!("chdman error: {}", message);
                        abort_conversion(&mut child, stdout_reader, archive);
                        return Err(Error::Conversion(message));
                    }
                    ProgressLine::Progress(percent) => {
                        // 100 belongs to the completion marker
                        let percent = percent.round().min(MAX_LINE_PERCENT);
                        self.report(&mut last_reported, percent);
                    }
                    ProgressLine::Other => {
                        tracing::trace!("chdman: {}", line);
                    }
                }
            }
        }

        let status = child.wait()?;
        let output = stdout_reader.join().unwrap_or_default();

        if cancel.is_cancelled() && !status.success() {
            remove_partial(archive);
            return Ok(ConvertOutcome::Cancelled);
        }

        if !status.success() {
            tracing::debug!("chdman conversion finished with error: {}", status);
            let message = if output.is_empty() {
                format!("chdman exited with {}", status)
            } else {
                output.join("\n")
            };
            return Err(Error::Conversion(message));
        }

        Ok(ConvertOutcome::Converted)
    }

    // Only strictly increasing values are forwarded, so 100 is reported once.
    fn report(&mut self, last: &mut f64, percent: f64) {
        let percent = percent.clamp(0.0, 100.0);
        if percent <= *last {
            return;
        }
        *last = percent;
        if let Some(ref mut callback) = self.progress_callback {
            callback(percent);
        }
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::new()
    }
}

// Stop chdman, wait for its stdout drain and drop whatever it wrote.
fn abort_conversion(
    child: &mut Child,
    stdout_reader: JoinHandle<Vec<String>>,
    archive: &Path,
) {
    kill_and_reap(child);
    let _ = stdout_reader.join();
    remove_partial(archive);
}

fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::debug!("Failed to kill chdman: {}", e);
    }
    if let Err(e) = child.wait() {
        tracing::debug!("Failed to wait for chdman: {}", e);
    }
}

fn remove_partial(archive: &Path) {
    match fs::remove_file(archive) {
        Ok(()) => tracing::debug!("Removed partial archive {}", archive.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            "Failed to remove partial archive {}: {}",
            archive.display(),
            e
        ),
    }
}
