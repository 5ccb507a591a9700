//! Optional post-processing step
//!
//! A post-processor runs after a title's manifest is written. It is a black
//! box: whether it is configured, missing, or failing, the batch behaves the
//! same.

use std::ffi::OsStr;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::tool::{spawn_tool, ToolLines};

/// Work done on a finished title
pub trait PostProcessor: Send {
    /// Process one title; `progress` receives percentages in `0..=100`
    fn process(
        &mut self,
        output_root: &Path,
        identifier: &str,
        title: &str,
        progress: &mut dyn FnMut(f64),
    );
}

/// Post-processor backed by an external executable
///
/// Invoked as `<exe> <output_root> <identifier> <title>`. Every stdout line
/// that parses as a number is reported as progress.
#[derive(Debug, Clone)]
pub struct CommandPostProcessor {
    executable: PathBuf,
}

impl CommandPostProcessor {
    /// Wrap an executable
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

impl PostProcessor for CommandPostProcessor {
    fn process(
        &mut self,
        output_root: &Path,
        identifier: &str,
        title: &str,
        progress: &mut dyn FnMut(f64),
    ) {
        let args: [&OsStr; 3] = [
            output_root.as_os_str(),
            OsStr::new(identifier),
            OsStr::new(title),
        ];
        let mut child = match spawn_tool(&self.executable, args) {
            Ok(child) => child,
            Err(e) => {
                tracing::debug!("Post-processor not started: {}", e);
                return;
            }
        };

        // stderr is not read, so close it rather than let the pipe fill
        drop(child.stderr.take());
        if let Some(stdout) = child.stdout.take() {
            for line in ToolLines::new(BufReader::new(stdout)).map_while(|l| l.ok()) {
                if let Ok(value) = line.trim().parse::<f64>() {
                    progress(value.clamp(0.0, 100.0));
                }
            }
        }

        match child.wait() {
            Ok(status) if !status.success() => {
                tracing::debug!("Post-processor exited with {}", status);
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("Post-processor wait failed: {}", e),
        }
    }
}

/// Resolve the configured post-processor, if it exists on disk
pub fn resolve_post_processor(path: Option<&Path>) -> Option<Box<dyn PostProcessor>> {
    let path = path?;
    if !path.is_file() {
        tracing::debug!("Post-processor {} not found, skipping", path.display());
        return None;
    }
    tracing::debug!("Using post-processor {}", path.display());
    Some(Box::new(CommandPostProcessor::new(path)))
}
