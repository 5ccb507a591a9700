//! Progress display for batch runs
//!
//! The batch runs on a worker thread and sends its events here; this side
//! owns the bars, so the worker never waits on the terminal.

use console::style;
use discshelf_core::{BatchEvent, Stage};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Two-line view: titles done overall, and the current title's stage
pub struct BatchView {
    _multi: Option<MultiProgress>,
    overall: ProgressBar,
    stage: ProgressBar,
    current_stage: Option<Stage>,
}

impl BatchView {
    /// Create the view for `count` titles
    pub fn new(count: usize, silent: bool) -> Self {
        if silent {
            return Self {
                _multi: None,
                overall: ProgressBar::hidden(),
                stage: ProgressBar::hidden(),
                current_stage: None,
            };
        }

        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(count as u64));
        overall.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("█▓░"),
        );

        let stage = multi.add(ProgressBar::new(100));
        stage.set_style(
            ProgressStyle::default_bar()
                .template("    {prefix:.bold} [{bar:30.green/white}] {pos:>3}%")
                .unwrap()
                .progress_chars("█▓░"),
        );

        Self {
            _multi: Some(multi),
            overall,
            stage,
            current_stage: None,
        }
    }

    /// Apply one event from the batch
    pub fn apply(&mut self, event: &BatchEvent) {
        match event {
            BatchEvent::TitleStarted { index, count, title } => {
                self.overall.set_message(title_label(*index, *count, title));
            }
            BatchEvent::StageStarted(stage) => {
                self.current_stage = Some(*stage);
                self.stage.set_prefix(stage.name());
                self.stage.set_position(0);
            }
            BatchEvent::StageProgress { stage, percent } => {
                if self.current_stage == Some(*stage) {
                    self.stage.set_position(percent_position(*percent));
                }
            }
            BatchEvent::TitleSkipped { .. } | BatchEvent::TitleFinished { .. } => {
                self.overall.inc(1);
            }
            BatchEvent::Finished => self.finish(),
        }
    }

    /// Remove the bars from the terminal
    pub fn finish(&self) {
        self.stage.finish_and_clear();
        self.overall.finish_and_clear();
    }
}

/// Message shown next to the overall bar
pub fn title_label(index: usize, count: usize, title: &str) -> String {
    format!(
        "{} {}",
        style(format!("({}/{})", index + 1, count)).dim(),
        title
    )
}

/// Clamp a percentage onto the 0..=100 stage bar
pub fn percent_position(percent: f64) -> u64 {
    if percent.is_nan() {
        return 0;
    }
    percent.clamp(0.0, 100.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_position() {
        assert_eq!(percent_position(0.0), 0);
        assert_eq!(percent_position(42.4), 42);
        assert_eq!(percent_position(99.6), 100);
        assert_eq!(percent_position(150.0), 100);
        assert_eq!(percent_position(-3.0), 0);
        assert_eq!(percent_position(f64::NAN), 0);
    }

    #[test]
    fn test_title_label() {
        console::set_colors_enabled(false);
        assert_eq!(title_label(0, 3, "Tekken 3"), "(1/3) Tekken 3");
    }

    #[test]
    fn test_hidden_view_accepts_events() {
        let mut view = BatchView::new(2, true);
        view.apply(&BatchEvent::TitleStarted {
            index: 0,
            count: 2,
            title: "Tekken 3".to_string(),
        });
        view.apply(&BatchEvent::StageStarted(Stage::HashTracks));
        view.apply(&BatchEvent::StageProgress {
            stage: Stage::HashTracks,
            percent: 50.0,
        });
        assert_eq!(view.current_stage, Some(Stage::HashTracks));
        view.apply(&BatchEvent::TitleFinished { index: 0 });
        view.apply(&BatchEvent::TitleSkipped { index: 1 });
        assert_eq!(view.overall.position(), 2);
        view.apply(&BatchEvent::Finished);
    }
}
