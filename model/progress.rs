use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fmt;
use std::io::IsTerminal;

/// Stages reported while fitting the training artifacts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FitProgressStage {
    GradientBoosting,
    LogisticRegression,
}

impl FitProgressStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::GradientBoosting => "gradient boosting rounds",
            Self::LogisticRegression => "logistic regression iterations",
        }
    }
}

impl fmt::Display for FitProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Observer for reporting incremental progress while fitting a model.
pub trait FitProgressObserver {
    fn on_stage_start(&mut self, stage: FitProgressStage, total_steps: usize) {
        let _ = (stage, total_steps);
    }
    fn on_stage_advance(&mut self, stage: FitProgressStage, completed_steps: usize) {
        let _ = (stage, completed_steps);
    }
    fn on_stage_finish(&mut self, stage: FitProgressStage) {
        let _ = stage;
    }
}

#[derive(Default)]
pub struct NoopFitProgress;

impl FitProgressObserver for NoopFitProgress {}

/// Draws a progress bar on stderr when it is a terminal; silent otherwise.
#[derive(Default)]
pub struct ConsoleFitProgress {
    bar: Option<ProgressBar>,
}

impl ConsoleFitProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FitProgressObserver for ConsoleFitProgress {
    fn on_stage_start(&mut self, stage: FitProgressStage, total_steps: usize) {
        let draw_target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(20)
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(Some(total_steps as u64), draw_target);
        if let Ok(style) = ProgressStyle::with_template(
            "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
        }
        bar.set_message(stage.describe());
        self.bar = Some(bar);
    }

    fn on_stage_advance(&mut self, _stage: FitProgressStage, completed_steps: usize) {
        if let Some(bar) = &self.bar {
            bar.set_position(completed_steps as u64);
        }
    }

    fn on_stage_finish(&mut self, stage: FitProgressStage) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        log::info!("Finished {stage}");
    }
}
