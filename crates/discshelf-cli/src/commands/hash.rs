//! Hash command - per-track MD5 of a cue sheet or ISO

use anyhow::{Context, Result};
use console::style;
use discshelf_core::{enumerate_tracks, CancelToken, Error, Hasher, TrackHashes};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

/// Execute the hash command
pub fn execute(source: &Path, cancel: &CancelToken, silent: bool) -> Result<()> {
    println_if!(
        silent,
        "{} {}",
        style("Source:").bold(),
        style(source.display()).cyan()
    );

    let tracks = enumerate_tracks(source)
        .with_context(|| format!("Failed to read tracks of {}", source.display()))?;
    let total: u64 = tracks
        .iter()
        .filter_map(|t| t.metadata().ok())
        .map(|m| m.len())
        .sum();
    println_if!(
        silent,
        "  {} tracks, {}",
        tracks.len(),
        format_size(total, BINARY)
    );

    let pb = if silent {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                .unwrap()
                .progress_chars("█▓░"),
        );
        pb
    };

    let mut hashes = TrackHashes::new();
    let mut done = 0u64;
    for (i, track) in tracks.iter().enumerate() {
        let pb_clone = pb.clone();
        let offset = done;
        let mut hasher = Hasher::new().on_progress(move |p| {
            pb_clone.set_position(offset + p.bytes_processed);
        });

        let mut file = std::fs::File::open(track)
            .with_context(|| format!("Failed to open track {}", track.display()))?;
        let size = file.metadata()?.len();
        let hash = match hasher.hash_reader(&mut file, size, cancel) {
            Ok(hash) => hash,
            Err(Error::Cancelled) => {
                pb.finish_and_clear();
                println_if!(silent, "\n{}", style("Hashing cancelled by user.").yellow());
                return Ok(());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to hash {}", track.display()))
            }
        };
        hashes.insert((i + 1) as u32, hash);
        done += size;
    }
    pb.finish_and_clear();

    // The hash block is the useful output, so it is printed even when silent
    println_if!(silent);
    println!("{}", hashes.to_manifest_block());
    Ok(())
}
