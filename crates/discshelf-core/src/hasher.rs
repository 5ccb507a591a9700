//! Streaming MD5 hashing of track files
//!
//! Every track is read through a fixed-size buffer so memory use does not
//! depend on the size of the image.
//!
//! ## Example
//!
//! ```no_run
//! use discshelf_core::hasher::Hasher;
//! use std::path::Path;
//!
//! let mut hasher = Hasher::new()
//!     .on_progress(|p| println!("track {}/{} {:.0}%", p.track, p.track_count, p.overall_fraction() * 100.0));
//! let md5 = hasher.hash_file(Path::new("Game (Track 1).bin"))?;
//! println!("{}", md5);
//! # Ok::<(), discshelf_core::Error>(())
//! ```

use md5::{Digest, Md5};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::title::Title;
use crate::tracks::enumerate_tracks;

/// Default read buffer (4 KB)
pub const HASH_BUFFER_SIZE: usize = 4 * 1024;

/// Progress callback type
pub type ProgressCallback = Box<dyn FnMut(&HashProgress) + Send>;

/// Hashing progress information
#[derive(Debug, Clone)]
pub struct HashProgress {
    /// 1-based track being hashed
    pub track: usize,
    /// Number of tracks in the title
    pub track_count: usize,
    /// Bytes of the current track processed so far
    pub bytes_processed: u64,
    /// Size of the current track
    pub track_bytes: u64,
}

impl HashProgress {
    /// Completion of the current track (0.0 to 1.0)
    pub fn track_fraction(&self) -> f64 {
        if self.track_bytes == 0 {
            1.0
        } else {
            self.bytes_processed as f64 / self.track_bytes as f64
        }
    }

    /// Completion across all tracks of the title (0.0 to 1.0)
    pub fn overall_fraction(&self) -> f64 {
        if self.track_count == 0 {
            return 1.0;
        }
        let done = self.track.saturating_sub(1) as f64 + self.track_fraction();
        done / self.track_count as f64
    }
}

/// What happened to a title's track hashes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashOutcome {
    /// All tracks were hashed
    Computed(usize),
    /// A manifest already exists and may not be overwritten
    Skipped,
    /// Cancelled part way; the list holds the tracks finished so far
    Cancelled,
}

/// Track hasher
pub struct Hasher {
    buffer_size: usize,
    progress_callback: Option<ProgressCallback>,
    // Set while hashing a title so single-file progress can be placed in context.
    position: (usize, usize),
}

impl Hasher {
    /// Create a hasher with the default buffer size
    pub fn new() -> Self {
        Self {
            buffer_size: HASH_BUFFER_SIZE,
            progress_callback: None,
            position: (1, 1),
        }
    }

    /// Set the read buffer size (minimum 1 byte)
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Set progress callback
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&HashProgress) + Send + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Hash one file, returning the uppercase hex MD5
    pub fn hash_file(&mut self, path: &Path) -> Result<String> {
        self.hash_file_cancellable(path, &CancelToken::new())
    }

    fn hash_file_cancellable(&mut self, path: &Path, cancel: &CancelToken) -> Result<String> {
        let mut file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::SourceNotFound(path.display().to_string()),
            _ => Error::Io(e),
        })?;
        let track_bytes = file.metadata()?.len();
        self.hash_reader(&mut file, track_bytes, cancel)
    }

    /// Hash everything readable from `reader`
    pub fn hash_reader<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
        track_bytes: u64,
        cancel: &CancelToken,
    ) -> Result<String> {
        let mut md5 = Md5::new();
        let mut buffer = vec![0u8; self.buffer_size];
        let mut bytes_processed = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            };

            md5.update(&buffer[..n]);
            bytes_processed += n as u64;

            if let Some(ref mut callback) = self.progress_callback {
                callback(&HashProgress {
                    track: self.position.0,
                    track_count: self.position.1,
                    bytes_processed,
                    track_bytes,
                });
            }
        }

        Ok(to_upper_hex(&md5.finalize()))
    }

    /// Replace a title's track hashes with freshly computed ones
    ///
    /// Skipped when the manifest exists and overwriting is disabled, in which
    /// case hashes loaded from that manifest are kept.
    pub fn compute_track_hashes(
        &mut self,
        title: &mut Title,
        config: &Config,
        cancel: &CancelToken,
    ) -> Result<HashOutcome> {
        if cancel.is_cancelled() {
            return Ok(HashOutcome::Cancelled);
        }

        let manifest = config.manifest_path(title);
        if manifest.exists() && !config.overwrite_manifests {
            tracing::debug!(
                "Manifest {} exists, keeping track hashes",
                manifest.display()
            );
            return Ok(HashOutcome::Skipped);
        }

        if title.source_path.as_os_str().is_empty() {
            tracing::debug!("No source image for {}, nothing to hash", title.identifier());
            return Ok(HashOutcome::Skipped);
        }

        let tracks = enumerate_tracks(&title.source_path)?;
        if cancel.is_cancelled() {
            return Ok(HashOutcome::Cancelled);
        }

        title.archive.track_hashes.clear();
        let count = tracks.len();
        for (i, track) in tracks.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(HashOutcome::Cancelled);
            }
            tracing::debug!("Calculating md5 for track {}: {}", i + 1, track.display());
            self.position = (i + 1, count);
            let hash = match self.hash_file_cancellable(track, cancel) {
                Ok(hash) => hash,
                Err(Error::Cancelled) => return Ok(HashOutcome::Cancelled),
                Err(e) => return Err(e),
            };
            title.archive.track_hashes.insert((i + 1) as u32, hash);
        }
        self.position = (1, 1);

        Ok(HashOutcome::Computed(count))
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

fn to_upper_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}
