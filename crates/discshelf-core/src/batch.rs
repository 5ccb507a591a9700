//! Batch orchestration
//!
//! A batch walks the worklist in order and runs every title through the same
//! fixed sequence of stages:
//!
//! 1. Convert the source image to CHD
//! 2. Hash the source tracks
//! 3. Read the archive's metadata
//! 4. Write the manifest
//! 5. Hand the title to the post-processor, if one is configured
//!
//! Conversion and inspection failures stop the whole batch. Anything else
//! that goes wrong with one title is recorded in the [`BatchReport`] and the
//! batch moves on to the next title.
//!
//! ## Example
//!
//! ```no_run
//! use discshelf_core::{Batch, BatchEvent, CancelToken, Config, Platform, Title};
//!
//! let config = Config::new().output_dir("/archive");
//! let mut titles = vec![Title::new("Tekken 3", "SLUS-00402", Platform::SonyPSX, "/roms/tekken3.cue")];
//!
//! let mut batch = Batch::new(config).on_progress(|event| {
//!     if let BatchEvent::StageStarted(stage) = event {
//!         println!("{}", stage);
//!     }
//! });
//! let report = batch.run(&mut titles, &CancelToken::new())?;
//! println!("{} processed", report.processed);
//! # Ok::<(), discshelf_core::Error>(())
//! ```

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::converter::{ConvertOutcome, Converter};
use crate::error::{Error, Result};
use crate::hasher::{HashOutcome, Hasher};
use crate::inspector::Inspector;
use crate::manifest::ManifestGenerator;
use crate::postprocess::{resolve_post_processor, PostProcessor};
use crate::title::Title;

/// One step of a title's processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// `chdman createcd`
    Convert,
    /// Per-track MD5
    HashTracks,
    /// `chdman info`
    Inspect,
    /// README manifest
    GenerateManifest,
    /// Optional post-processor
    PostProcess,
}

impl Stage {
    /// Name shown to the user
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Convert => "Conversion to CHD",
            Stage::HashTracks => "Calculating tracks MD5",
            Stage::Inspect => "Getting CHD info",
            Stage::GenerateManifest => "Generating README",
            Stage::PostProcess => "Post-processing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Progress notification from a running batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// A title is about to be processed
    TitleStarted {
        /// Position in the worklist
        index: usize,
        /// Number of titles in the worklist
        count: usize,
        /// Display title
        title: String,
    },
    /// A stage of the current title started
    StageStarted(Stage),
    /// Progress within the current stage
    StageProgress {
        /// Stage reporting progress
        stage: Stage,
        /// Percentage in `0..=100`
        percent: f64,
    },
    /// A title was left out because it is not modified
    TitleSkipped {
        /// Position in the worklist
        index: usize,
    },
    /// A title went through every stage, or failed and was left behind
    TitleFinished {
        /// Position in the worklist
        index: usize,
    },
    /// The batch is over
    Finished,
}

/// Event callback type
pub type EventCallback = Box<dyn FnMut(&BatchEvent) + Send>;

/// A title that failed without stopping the batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleError {
    /// Identifier of the failed title
    pub identifier: String,
    /// Stage that failed
    pub stage: Stage,
    /// Error text
    pub message: String,
}

impl fmt::Display for TitleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.identifier, self.stage, self.message)
    }
}

/// Summary of a batch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Titles in the worklist
    pub total: usize,
    /// Titles that went through every stage
    pub processed: usize,
    /// Titles left out by the only-modified rule
    pub skipped: usize,
    /// Titles that failed
    pub errors: Vec<TitleError>,
    /// Whether the batch stopped because it was cancelled
    pub cancelled: bool,
}

impl BatchReport {
    /// Whether every title was processed or deliberately skipped
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }
}

// Shared between the batch and the stage callbacks it installs.
#[derive(Clone, Default)]
struct EventSink(Option<Arc<Mutex<EventCallback>>>);

impl EventSink {
    fn emit(&self, event: BatchEvent) {
        if let Some(callback) = &self.0 {
            if let Ok(mut callback) = callback.lock() {
                callback(&event);
            }
        }
    }
}

enum TitleOutcome {
    Completed,
    Cancelled,
}

/// Sequential batch processor
pub struct Batch {
    config: Config,
    post_processor: Option<Box<dyn PostProcessor>>,
    log_dispatch: Option<tracing::Dispatch>,
    events: EventSink,
}

impl Batch {
    /// Create a batch; the post-processor is resolved from `config`
    pub fn new(config: Config) -> Self {
        let post_processor = resolve_post_processor(config.post_processor.as_deref());
        Self {
            config,
            post_processor,
            log_dispatch: None,
            events: EventSink::default(),
        }
    }

    /// Replace the post-processor
    pub fn with_post_processor(mut self, post_processor: Box<dyn PostProcessor>) -> Self {
        self.post_processor = Some(post_processor);
        self
    }

    /// Route the batch's log output to `dispatch` while it runs
    pub fn with_log_dispatch(mut self, dispatch: tracing::Dispatch) -> Self {
        self.log_dispatch = Some(dispatch);
        self
    }

    /// Set progress callback
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&BatchEvent) + Send + 'static,
    {
        let callback: EventCallback = Box::new(callback);
        self.events = EventSink(Some(Arc::new(Mutex::new(callback))));
        self
    }

    /// Process every title in order
    ///
    /// Returns `Err` only for failures that stop the batch. Titles finished
    /// before that point keep their changes.
    pub fn run(&mut self, titles: &mut [Title], cancel: &CancelToken) -> Result<BatchReport> {
        match self.log_dispatch.clone() {
            Some(dispatch) => {
                tracing::dispatcher::with_default(&dispatch, || self.run_titles(titles, cancel))
            }
            None => self.run_titles(titles, cancel),
        }
    }

    fn run_titles(&mut self, titles: &mut [Title], cancel: &CancelToken) -> Result<BatchReport> {
        self.config.validate()?;

        let count = titles.len();
        let mut report = BatchReport {
            total: count,
            ..BatchReport::default()
        };
        let mut stages = StageRunners::new(&self.config, &self.events);
        tracing::info!("Processing {} titles", count);

        for (index, title) in titles.iter_mut().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            if self.config.only_modified && !title.modified {
                tracing::debug!("Skipping unmodified {}", title.identifier());
                report.skipped += 1;
                self.events.emit(BatchEvent::TitleSkipped { index });
                continue;
            }

            self.events.emit(BatchEvent::TitleStarted {
                index,
                count,
                title: title.display_title().to_string(),
            });
            let span = tracing::info_span!("title", id = %title.identifier());
            let _enter = span.enter();

            match self.process_title(&mut stages, title, cancel) {
                Ok(TitleOutcome::Completed) => {
                    report.processed += 1;
                    self.events.emit(BatchEvent::TitleFinished { index });
                }
                Ok(TitleOutcome::Cancelled) | Err((_, Error::Cancelled)) => {
                    report.cancelled = true;
                    break;
                }
                Err((stage, e)) if e.is_batch_fatal() => {
                    tracing::error!("{} failed for {}: {}", stage, title.identifier(), e);
                    return Err(e);
                }
                Err((stage, e)) => {
                    tracing::error!("{} failed for {}: {}", stage, title.identifier(), e);
                    report.errors.push(TitleError {
                        identifier: title.identifier().to_string(),
                        stage,
                        message: e.to_string(),
                    });
                    self.events.emit(BatchEvent::TitleFinished { index });
                }
            }
        }

        if report.cancelled {
            tracing::info!("Batch cancelled");
        }
        self.events.emit(BatchEvent::Finished);
        Ok(report)
    }

    fn process_title(
        &mut self,
        stages: &mut StageRunners,
        title: &mut Title,
        cancel: &CancelToken,
    ) -> std::result::Result<TitleOutcome, (Stage, Error)> {
        let config = &self.config;
        let events = &self.events;
        let at = |stage: Stage| move |e: Error| (stage, e);

        events.emit(BatchEvent::StageStarted(Stage::Convert));
        let converted = stages
            .converter
            .convert(title, config, cancel)
            .map_err(at(Stage::Convert))?;
        match converted {
            ConvertOutcome::Cancelled => return Ok(TitleOutcome::Cancelled),
            ConvertOutcome::Skipped(reason) => {
                tracing::debug!("Conversion skipped: {:?}", reason);
            }
            ConvertOutcome::Converted => {}
        }

        if cancel.is_cancelled() {
            return Ok(TitleOutcome::Cancelled);
        }
        events.emit(BatchEvent::StageStarted(Stage::HashTracks));
        let hashed = stages
            .hasher
            .compute_track_hashes(title, config, cancel)
            .map_err(at(Stage::HashTracks))?;
        if hashed == HashOutcome::Cancelled {
            return Ok(TitleOutcome::Cancelled);
        }

        if cancel.is_cancelled() {
            return Ok(TitleOutcome::Cancelled);
        }
        events.emit(BatchEvent::StageStarted(Stage::Inspect));
        stages
            .inspector
            .inspect(title, config)
            .map_err(at(Stage::Inspect))?;

        if cancel.is_cancelled() {
            return Ok(TitleOutcome::Cancelled);
        }
        events.emit(BatchEvent::StageStarted(Stage::GenerateManifest));
        stages
            .generator
            .generate(title, config)
            .map_err(at(Stage::GenerateManifest))?;

        if let Some(post) = self.post_processor.as_mut() {
            if cancel.is_cancelled() {
                return Ok(TitleOutcome::Cancelled);
            }
            events.emit(BatchEvent::StageStarted(Stage::PostProcess));
            post.process(
                &config.output_dir,
                title.identifier(),
                title.display_title(),
                &mut |percent| {
                    events.emit(BatchEvent::StageProgress {
                        stage: Stage::PostProcess,
                        percent,
                    })
                },
            );
        }

        title.modified = false;
        Ok(TitleOutcome::Completed)
    }
}

// The stage workers of one run, wired to the batch's event sink.
struct StageRunners {
    converter: Converter,
    hasher: Hasher,
    inspector: Inspector,
    generator: ManifestGenerator,
}

impl StageRunners {
    fn new(config: &Config, events: &EventSink) -> Self {
        let convert_events = events.clone();
        let converter = Converter::new().on_progress(move |percent| {
            convert_events.emit(BatchEvent::StageProgress {
                stage: Stage::Convert,
                percent,
            });
        });

        // Hash progress arrives per buffer; forward whole-percent changes only
        let hash_events = events.clone();
        let mut last_percent = -1.0f64;
        let hasher = Hasher::new().on_progress(move |progress| {
            let percent = (progress.overall_fraction() * 100.0).floor();
            if percent != last_percent {
                last_percent = percent;
                hash_events.emit(BatchEvent::StageProgress {
                    stage: Stage::HashTracks,
                    percent,
                });
            }
        });

        Self {
            converter,
            hasher,
            inspector: Inspector::new(),
            generator: ManifestGenerator::new(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArchivePolicy;
    use crate::title::Platform;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

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

    fn no_chdman(output: &Path) -> Config {
        Config::new()
            .output_dir(output)
            .archive_policy(ArchivePolicy::Skip)
            .tool_path("/nonexistent/chdman")
    }

    fn recorder() -> (Arc<Mutex<Vec<BatchEvent>>>, impl FnMut(&BatchEvent) + Send + 'static) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        (events, move |e: &BatchEvent| sink.lock().unwrap().push(e.clone()))
    }

    #[derive(Clone, Default)]
    struct RecordingPostProcessor {
        calls: Arc<Mutex<Vec<(PathBuf, String, String)>>>,
    }

    impl PostProcessor for RecordingPostProcessor {
        fn process(
            &mut self,
            output_root: &Path,
            identifier: &str,
            title: &str,
            progress: &mut dyn FnMut(f64),
        ) {
            self.calls.lock().unwrap().push((
                output_root.to_path_buf(),
                identifier.to_string(),
                title.to_string(),
            ));
            progress(50.0);
        }
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::Convert.to_string(), "Conversion to CHD");
        assert_eq!(Stage::HashTracks.to_string(), "Calculating tracks MD5");
        assert_eq!(Stage::Inspect.to_string(), "Getting CHD info");
        assert_eq!(Stage::GenerateManifest.to_string(), "Generating README");
        assert_eq!(Stage::PostProcess.to_string(), "Post-processing");
    }

    #[test]
    fn test_run_writes_manifests_and_clears_modified() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let cue = write_image(src.path(), "Game", &[b"one", b"two"]);
        let config = no_chdman(out.path());
        let mut titles = vec![Title::new("Game", "SLUS-00001", Platform::SonyPSX, &cue)];

        let (events, callback) = recorder();
        let report = Batch::new(config.clone())
            .on_progress(callback)
            .run(&mut titles, &CancelToken::new())
            .unwrap();

        assert_eq!(report.processed, 1);
        assert!(report.is_clean());
        assert!(!titles[0].modified);
        assert!(titles[0].manifest_exists);
        assert_eq!(titles[0].archive.track_hashes.len(), 2);

        let manifest = fs::read_to_string(config.manifest_path(&titles[0])).unwrap();
        assert!(manifest.contains("TRACK 01 MD5: "));
        assert!(manifest.contains("TRACK 02 MD5: "));

        let events = events.lock().unwrap();
        let started: Vec<Stage> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::StageStarted(stage) => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(
            started,
            vec![
                Stage::Convert,
                Stage::HashTracks,
                Stage::Inspect,
                Stage::GenerateManifest
            ]
        );
        assert!(matches!(events.first(), Some(BatchEvent::TitleStarted { index: 0, count: 1, .. })));
        assert_eq!(events.last(), Some(&BatchEvent::Finished));
        assert!(events.contains(&BatchEvent::StageProgress {
            stage: Stage::HashTracks,
            percent: 100.0
        }));
    }

    #[test]
    fn test_only_modified_skips_clean_titles() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let cue = write_image(src.path(), "Game", &[b"data"]);
        let mut clean = Title::new("Clean", "ID-CLEAN", Platform::SonyPSX, &cue);
        clean.modified = false;
        let dirty = Title::new("Dirty", "ID-DIRTY", Platform::SonyPSX, &cue);
        let mut titles = vec![clean, dirty];

        let config = no_chdman(out.path()).only_modified(true);
        let report = Batch::new(config.clone())
            .run(&mut titles, &CancelToken::new())
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.processed, 1);
        assert!(!config.manifest_path(&titles[0]).exists());
        assert!(config.manifest_path(&titles[1]).exists());
    }

    #[test]
    fn test_title_error_does_not_stop_batch() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let cue = write_image(src.path(), "Good", &[b"data"]);
        let mut titles = vec![
            Title::new("Broken", "ID-BROKEN", Platform::SonyPSX, src.path().join("missing.cue")),
            Title::new("Good", "ID-GOOD", Platform::SonyPSX, &cue),
        ];

        let report = Batch::new(no_chdman(out.path()))
            .run(&mut titles, &CancelToken::new())
            .unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].identifier, "ID-BROKEN");
        assert_eq!(report.errors[0].stage, Stage::HashTracks);
        assert!(titles[0].modified);
        assert!(!titles[1].modified);
    }

    #[test]
    fn test_missing_tool_stops_batch() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let cue = write_image(src.path(), "Game", &[b"data"]);
        let mut titles = vec![
            Title::new("A", "ID-A", Platform::SonyPSX, &cue),
            Title::new("B", "ID-B", Platform::SonyPSX, &cue),
        ];
        let config = no_chdman(out.path()).archive_policy(ArchivePolicy::GenerateMissing);

        let result = Batch::new(config).run(&mut titles, &CancelToken::new());
        assert!(matches!(result, Err(Error::ToolNotFound(_))));
        assert!(titles.iter().all(|t| t.modified));
    }

    #[test]
    fn test_invalid_config() {
        let mut titles = Vec::new();
        let result = Batch::new(Config::new()).run(&mut titles, &CancelToken::new());
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_cancel_between_titles() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let cue = write_image(src.path(), "Game", &[b"data"]);
        let mut titles = vec![
            Title::new("A", "ID-A", Platform::SonyPSX, &cue),
            Title::new("B", "ID-B", Platform::SonyPSX, &cue),
        ];

        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let report = Batch::new(no_chdman(out.path()))
            .on_progress(move |event| {
                if let BatchEvent::TitleFinished { .. } = event {
                    trigger.cancel();
                }
            })
            .run(&mut titles, &cancel)
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.processed, 1);
        assert!(!titles[0].modified);
        assert!(titles[1].modified);
    }

    #[test]
    fn test_post_processor_receives_title() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let cue = write_image(src.path(), "Game", &[b"data"]);
        let mut titles = vec![Title::new("Tekken 3", "SLUS-00402", Platform::SonyPSX, &cue)];

        let post = RecordingPostProcessor::default();
        let calls = Arc::clone(&post.calls);
        let (events, callback) = recorder();
        Batch::new(no_chdman(out.path()))
            .with_post_processor(Box::new(post))
            .on_progress(callback)
            .run(&mut titles, &CancelToken::new())
            .unwrap();

        assert_eq!(
            calls.lock().unwrap().as_slice(),
            &[(
                out.path().to_path_buf(),
                "SLUS-00402".to_string(),
                "Tekken 3".to_string()
            )]
        );
        let events = events.lock().unwrap();
        assert!(events.contains(&BatchEvent::StageStarted(Stage::PostProcess)));
        assert!(events.contains(&BatchEvent::StageProgress {
            stage: Stage::PostProcess,
            percent: 50.0
        }));
    }

    #[test]
    fn test_log_dispatch_receives_batch_logs() {
        #[derive(Clone, Default)]
        struct SharedBuf(Arc<Mutex<Vec<u8>>>);

        impl std::io::Write for SharedBuf {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let cue = write_image(src.path(), "Game", &[b"data"]);
        let mut titles = vec![Title::new("Game", "SLUS-00009", Platform::SonyPSX, &cue)];

        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        Batch::new(no_chdman(out.path()))
            .with_log_dispatch(tracing::Dispatch::new(subscriber))
            .run(&mut titles, &CancelToken::new())
            .unwrap();

        let logged = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("Processing 1 titles"));
        assert!(logged.contains("SLUS-00009"));
    }
}
