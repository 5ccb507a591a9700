//! Integration tests for discshelf-core
//!
//! chdman is replaced by small shell scripts that speak its stderr progress
//! protocol and print a fixed `info` layout, so these tests are unix only.

#![cfg(unix)]

use discshelf_core::{
    ArchivePolicy, Batch, BatchEvent, CancelToken, Config, ConvertOutcome, Converter, Error,
    Hasher, Inspector, Platform, Stage, Title, Worklist,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ============================================================================
// Fixtures
// ============================================================================

const INFO_OUTPUT: &str = r#"chdman - MAME Compressed Hunks of Data (CHD) manager 0.262 (mame0262)
Input file:   game.chd
File Version: 5
Logical size: 555,098,112 bytes
Hunk Size:    19,584 bytes
Total Hunks:  28,345
Unit Size:    2,448 bytes
Total Units:  226,760
Compression:  cdlz (CD LZMA), cdzl (CD Deflate), cdfl (CD FLAC)
CHD size:     402,112,345 bytes
Ratio:        72.4%
SHA1:         0c3a1f5e7b2d4c6e8f0a1b2c3d4e5f6a7b8c9d0e
Data SHA1:    a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6e7f8a9b0
Metadata:     Tag='CHT2'  Index=0  Length=90 bytes"#;

const CREATECD_OK: &str = r#"printf 'Compressing, 25.0%% complete... (ratio=40.0%%)\r' >&2
  printf 'Compressing, 75.5%% complete... (ratio=45.0%%)\r' >&2
  printf 'CHDDATA' > "$5"
  printf 'Compression complete ... final ratio = 50.0%%\n' >&2"#;

const CREATECD_ERROR: &str = r#"printf 'Error: file not found\n' >&2
  exit 1"#;

const CREATECD_LATE_ERROR: &str = r#"printf 'partial' > "$5"
  printf 'Compressing, 99.7%% complete... (ratio=40.0%%)\r' >&2
  printf 'Error: disk full\n' >&2
  exit 1"#;

const CREATECD_EXIT: &str = r#"echo 'bad input'
  exit 2"#;

const CREATECD_SLOW: &str = r#"printf 'partial' > "$5"
  i=0
  while [ $i -lt 200 ]; do
    printf 'Compressing, %d.0%% complete... (ratio=40.0%%)\n' $i >&2
    i=$((i + 1))
    sleep 0.05
  done
  printf 'Compression complete ... final ratio = 50.0%%\n' >&2"#;

fn fake_chdman(dir: &Path, createcd: &str, info: &str) -> PathBuf {
    let path = dir.join("chdman");
    let script = format!(
        "#!/bin/sh\ncase \"$1\" in\ncreatecd)\n  {}\n  ;;\ninfo)\n  {}\n  ;;\nesac\n",
        createcd, info
    );
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn info_ok() -> String {
    format!("cat <<'EOF'\n{}\nEOF", INFO_OUTPUT)
}

fn write_image(dir: &Path, name: &str, tracks: &[&[u8]]) -> PathBuf {
    let mut sheet = String::new();
    for (i, data) in tracks.iter().enumerate() {
        let bin = format!("{} (Track {}).bin", name, i + 1);
        fs::write(dir.join(&bin), data).unwrap();
        sheet.push_str(&format!(
            "FILE \"{}\" BINARY\n  TRACK {:02} MODE2/2352\n    INDEX 01 00:00:00\n",
            bin,
            i + 1
        ));
    }
    let cue = dir.join(format!("{}.cue", name));
    fs::write(&cue, sheet).unwrap();
    cue
}

struct Fixture {
    _src: TempDir,
    out: TempDir,
    tools: TempDir,
    cue: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let src = TempDir::new().unwrap();
        let cue = write_image(src.path(), "Tekken 3", &[b"data track", b"audio track"]);
        Self {
            _src: src,
            out: TempDir::new().unwrap(),
            tools: TempDir::new().unwrap(),
            cue,
        }
    }

    fn config(&self, createcd: &str, info: &str) -> Config {
        Config::new()
            .output_dir(self.out.path())
            .archive_policy(ArchivePolicy::GenerateMissing)
            .tool_path(fake_chdman(self.tools.path(), createcd, info))
    }

    fn title(&self, identifier: &str) -> Title {
        Title::new("Tekken 3", identifier, Platform::SonyPSX, &self.cue)
    }
}

// ============================================================================
// Batch
// ============================================================================

#[test]
fn test_batch_end_to_end() {
    let fixture = Fixture::new();
    let config = fixture.config(CREATECD_OK, &info_ok());
    let mut titles = vec![fixture.title("SLUS-00402")];

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let report = Batch::new(config.clone())
        .on_progress(move |e| sink.lock().unwrap().push(e.clone()))
        .run(&mut titles, &CancelToken::new())
        .unwrap();

    assert_eq!(report.processed, 1);
    assert!(report.is_clean());

    let title = &titles[0];
    assert!(!title.modified);
    assert!(title.archive_exists);
    assert!(title.manifest_exists);
    assert_eq!(title.archive.tool_version, "0.262");
    assert_eq!(title.archive.format_version, 5);
    assert_eq!(
        title.archive.content_hash,
        "A1B2C3D4E5F6A7B8C9D0E1F2A3B4C5D6E7F8A9B0"
    );
    assert_eq!(
        fs::read_to_string(config.archive_path(title)).unwrap(),
        "CHDDATA"
    );
    assert!(config
        .archive_path(title)
        .ends_with("SonyPSX/SLUS-00402/Tekken 3.chd"));

    let mut hasher = Hasher::new();
    let track1 = hasher
        .hash_file(&fixture.cue.with_file_name("Tekken 3 (Track 1).bin"))
        .unwrap();
    let track2 = hasher
        .hash_file(&fixture.cue.with_file_name("Tekken 3 (Track 2).bin"))
        .unwrap();
    let manifest = fs::read_to_string(config.manifest_path(title)).unwrap();
    assert!(manifest.contains(&format!("TRACK 01 MD5: {}", track1)));
    assert!(manifest.contains(&format!("TRACK 02 MD5: {}", track2)));
    assert!(manifest.contains("CHD SHA1: A1B2C3D4E5F6A7B8C9D0E1F2A3B4C5D6E7F8A9B0"));

    let converted: Vec<f64> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            BatchEvent::StageProgress {
                stage: Stage::Convert,
                percent,
            } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(converted, vec![25.0, 76.0, 100.0]);
}

#[test]
fn test_id_as_archive_name() {
    let fixture = Fixture::new();
    let config = fixture
        .config(CREATECD_OK, &info_ok())
        .id_as_archive_name(true);
    let mut titles = vec![fixture.title("slus-00402")];

    Batch::new(config.clone())
        .run(&mut titles, &CancelToken::new())
        .unwrap();

    assert!(fixture
        .out
        .path()
        .join("SonyPSX/slus-00402/SLUS-00402.chd")
        .is_file());
}

#[test]
fn test_conversion_error_line_stops_batch() {
    let fixture = Fixture::new();
    let config = fixture.config(CREATECD_ERROR, &info_ok());
    let mut titles = vec![fixture.title("SLUS-00001"), fixture.title("SLUS-00002")];

    let result = Batch::new(config.clone()).run(&mut titles, &CancelToken::new());

    match result {
        Err(Error::Conversion(message)) => assert!(message.contains("file not found")),
        other => panic!("expected conversion error, got {:?}", other),
    }
    assert!(titles.iter().all(|t| t.modified));
    assert!(!config.manifest_path(&titles[0]).exists());
    assert!(!config.manifest_path(&titles[1]).exists());
}

#[test]
fn test_conversion_error_never_reports_completion() {
    let fixture = Fixture::new();
    let config = fixture.config(CREATECD_LATE_ERROR, &info_ok());
    let mut title = fixture.title("SLUS-00001");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut converter = Converter::new().on_progress(move |p| sink.lock().unwrap().push(p));

    let result = converter.convert(&mut title, &config, &CancelToken::new());
    match result {
        Err(Error::Conversion(message)) => assert!(message.contains("disk full")),
        other => panic!("expected conversion error, got {:?}", other),
    }
    assert_eq!(*seen.lock().unwrap(), vec![99.0]);
    assert!(!config.archive_path(&title).exists());
    assert!(!title.archive_exists);
}

#[test]
fn test_conversion_nonzero_exit_reports_stdout() {
    let fixture = Fixture::new();
    let config = fixture.config(CREATECD_EXIT, &info_ok());
    let mut title = fixture.title("SLUS-00001");

    let result = Converter::new().convert(&mut title, &config, &CancelToken::new());
    match result {
        Err(Error::Conversion(message)) => assert_eq!(message, "bad input"),
        other => panic!("expected conversion error, got {:?}", other),
    }
    assert!(!title.archive_exists);
}

#[test]
fn test_cancel_mid_conversion_removes_partial_archive() {
    let fixture = Fixture::new();
    let config = fixture.config(CREATECD_SLOW, &info_ok());
    let mut title = fixture.title("SLUS-00001");

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let mut converter = Converter::new().on_progress(move |percent| {
        if percent >= 2.0 {
            trigger.cancel();
        }
    });

    let outcome = converter.convert(&mut title, &config, &cancel).unwrap();
    assert_eq!(outcome, ConvertOutcome::Cancelled);
    assert!(!config.archive_path(&title).exists());
    assert!(!title.archive_exists);
}

#[test]
fn test_rerun_keeps_existing_archive_and_manifest() {
    let fixture = Fixture::new();
    let mut titles = vec![fixture.title("SLUS-00402")];
    Batch::new(fixture.config(CREATECD_OK, &info_ok()))
        .run(&mut titles, &CancelToken::new())
        .unwrap();
    let config = fixture.config(CREATECD_OK, &info_ok());
    let manifest = fs::read_to_string(config.manifest_path(&titles[0])).unwrap();

    // chdman would now fail, but the archive exists and is not regenerated
    let config = fixture.config(CREATECD_ERROR, &info_ok());
    titles[0].modified = true;
    let report = Batch::new(config.clone())
        .run(&mut titles, &CancelToken::new())
        .unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(
        fs::read_to_string(config.manifest_path(&titles[0])).unwrap(),
        manifest
    );

    // Nothing modified: the whole title is skipped
    let config = config.only_modified(true);
    let report = Batch::new(config)
        .run(&mut titles, &CancelToken::new())
        .unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.processed, 0);
}

// ============================================================================
// Inspector
// ============================================================================

#[test]
fn test_inspect_stderr_is_an_error() {
    let fixture = Fixture::new();
    let config = fixture.config(CREATECD_OK, "printf 'Error: not a CHD file\\n' >&2");
    let archive = fixture.out.path().join("game.chd");
    fs::write(&archive, b"junk").unwrap();

    let result = Inspector::new().inspect_path(&config.tool_path, &archive);
    match result {
        Err(Error::Inspection(message)) => assert!(message.contains("not a CHD file")),
        other => panic!("expected inspection error, got {:?}", other),
    }
}

#[test]
fn test_inspect_error_stops_batch() {
    let fixture = Fixture::new();
    let config = fixture.config(CREATECD_OK, "echo 'Error: corrupt' >&2");
    let mut titles = vec![fixture.title("SLUS-00001")];

    let result = Batch::new(config).run(&mut titles, &CancelToken::new());
    assert!(matches!(result, Err(Error::Inspection(_))));
    assert!(titles[0].modified);
}

// ============================================================================
// Worklist recovery from an output tree
// ============================================================================

#[test]
fn test_scan_and_refresh_after_batch() {
    let fixture = Fixture::new();
    // Recovered titles have no source image, so the archive is found by ID
    let config = fixture
        .config(CREATECD_OK, &info_ok())
        .id_as_archive_name(true);
    let mut first = fixture.title("SLUS-00402");
    first.set_description("Third entry in the series.");
    let mut titles = vec![first];
    Batch::new(config.clone())
        .run(&mut titles, &CancelToken::new())
        .unwrap();

    let mut worklist = Worklist::new();
    let report = worklist.scan_manifests(fixture.out.path());
    assert_eq!(report.added, 1);
    assert!(report.errors.is_empty());

    let report = worklist.load_existing(&config, &Inspector::new());
    assert_eq!(report.updated, 1);
    assert!(report.errors.is_empty());
    let recovered = worklist.get("SLUS-00402").unwrap();
    assert_eq!(recovered.display_title(), "Tekken 3");
    assert_eq!(recovered.description(), "Third entry in the series.");
    assert_eq!(recovered.platform, Platform::SonyPSX);
    assert_eq!(recovered.archive.track_hashes, titles[0].archive.track_hashes);
    assert_eq!(recovered.archive.tool_version, "0.262");
    assert!(recovered.manifest_exists);
    assert!(!recovered.modified);
}

#[test]
fn test_rewrite_of_recovered_manifest_keeps_archive_hash() {
    let fixture = Fixture::new();
    let config = fixture.config(CREATECD_OK, &info_ok());
    let mut titles = vec![fixture.title("SLUS-00402")];
    Batch::new(config.clone())
        .run(&mut titles, &CancelToken::new())
        .unwrap();

    let mut worklist = Worklist::new();
    worklist.scan_manifests(fixture.out.path());
    let mut recovered = worklist.into_titles();
    assert!(recovered[0].source_path.as_os_str().is_empty());
    recovered[0].modified = true;

    let config = config.overwrite_manifests(true);
    let report = Batch::new(config.clone())
        .run(&mut recovered, &CancelToken::new())
        .unwrap();
    assert!(report.is_clean());

    let title = &recovered[0];
    assert!(title.archive_exists);
    assert!(config.archive_path(title).ends_with("Tekken 3.chd"));
    let manifest = fs::read_to_string(config.manifest_path(title)).unwrap();
    assert!(manifest.contains("CHD SHA1: A1B2C3D4E5F6A7B8C9D0E1F2A3B4C5D6E7F8A9B0"));
    assert!(manifest.contains("TRACK 02 MD5:"));
}
