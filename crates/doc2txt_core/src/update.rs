use std::time::Duration;

use crate::{ConversionOutcome, ProgressLine, ProgressStatus, TaskCompletion, TaskResult};

/// Aggregate counters for one run.
///
/// `warned` counts converted files that carried at least one warning, so it
/// overlaps `converted`. `crashed` is a subset of `errored`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunStatistics {
    pub converted: usize,
    pub converted_bytes: u64,
    pub text_bytes: u64,
    pub copied: usize,
    pub copied_bytes: u64,
    pub skipped: usize,
    pub warned: usize,
    pub warnings: usize,
    pub errored: usize,
    pub crashed: usize,
    pub timed_out: usize,
    pub duration: Option<Duration>,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks accounted for so far.
    pub fn total(&self) -> usize {
        self.converted + self.copied + self.skipped + self.errored + self.timed_out
    }

    pub fn finalize(&mut self, duration: Duration) {
        if self.duration.is_none() {
            self.duration = Some(duration);
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.duration.is_some()
    }
}

/// Pure update function: folds one finished task into the statistics and
/// returns the progress line describing it.
pub fn update(
    mut stats: RunStatistics,
    completion: &TaskCompletion,
) -> (RunStatistics, ProgressLine) {
    let path = completion.relative_path.clone();
    let line = match &completion.result {
        TaskResult::Completed(report) => match &report.outcome {
            ConversionOutcome::Converted {
                source_bytes,
                text_bytes,
            } => {
                stats.converted += 1;
                stats.converted_bytes += source_bytes;
                stats.text_bytes += text_bytes;
                if report.warnings.is_empty() {
                    ProgressLine::new(ProgressStatus::Converted, path, None)
                } else {
                    stats.warned += 1;
                    stats.warnings += report.warnings.len();
                    let detail = format!("{} warning(s), see log", report.warnings.len());
                    ProgressLine::new(ProgressStatus::Warned, path, Some(detail))
                }
            }
            ConversionOutcome::Copied { bytes } => {
                stats.copied += 1;
                stats.copied_bytes += bytes;
                ProgressLine::new(ProgressStatus::Copied, path, None)
            }
            ConversionOutcome::Skipped { reason } => {
                stats.skipped += 1;
                ProgressLine::new(ProgressStatus::Skipped, path, Some(reason.clone()))
            }
            ConversionOutcome::Failed { error } => {
                stats.errored += 1;
                let first_line = error.message.lines().next().unwrap_or_default();
                ProgressLine::new(
                    ProgressStatus::Failed,
                    path,
                    Some(format!("{}: {first_line}", error.kind)),
                )
            }
        },
        TaskResult::TimedOut { after } => {
            stats.timed_out += 1;
            ProgressLine::new(
                ProgressStatus::TimedOut,
                path,
                Some(format!("no result after {} s, abandoned", after.as_secs())),
            )
        }
        TaskResult::CrashedWorker { detail } => {
            stats.errored += 1;
            stats.crashed += 1;
            ProgressLine::new(ProgressStatus::Crashed, path, Some(detail.clone()))
        }
    };
    (stats, line)
}
