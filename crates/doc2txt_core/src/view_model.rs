use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::RunStatistics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Converted,
    Warned,
    Copied,
    Skipped,
    Failed,
    TimedOut,
    Crashed,
}

impl ProgressStatus {
    fn label(self) -> &'static str {
        match self {
            ProgressStatus::Converted => "converted",
            ProgressStatus::Warned => "warning",
            ProgressStatus::Copied => "copied",
            ProgressStatus::Skipped => "skipped",
            ProgressStatus::Failed => "error",
            ProgressStatus::TimedOut => "timeout",
            ProgressStatus::Crashed => "crashed",
        }
    }
}

/// One human-readable line per finished task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressLine {
    pub status: ProgressStatus,
    pub relative_path: PathBuf,
    pub detail: Option<String>,
}

impl ProgressLine {
    pub fn new(status: ProgressStatus, relative_path: PathBuf, detail: Option<String>) -> Self {
        Self {
            status,
            relative_path,
            detail,
        }
    }
}

impl fmt::Display for ProgressLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:<9}] {}",
            self.status.label(),
            self.relative_path.display()
        )?;
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

/// Human readable byte size: `512.0 B`, `1.5 KB`, `3.2 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} PB")
}

/// Final run summary, rendered once statistics are finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryView {
    pub lines: Vec<String>,
}

impl SummaryView {
    pub fn from_stats(stats: &RunStatistics) -> Self {
        let duration = stats.duration.unwrap_or(Duration::ZERO);
        let mut lines = vec![
            format!("Finished in {:.2} s", duration.as_secs_f64()),
            format!(
                "Converted: {:>5} files ({} in, {} text)",
                stats.converted,
                format_size(stats.converted_bytes),
                format_size(stats.text_bytes)
            ),
            format!(
                "Copied:    {:>5} files ({})",
                stats.copied,
                format_size(stats.copied_bytes)
            ),
            format!("Skipped:   {:>5} files", stats.skipped),
        ];
        if stats.warned > 0 {
            lines.push(format!(
                "Warnings:  {:>5} files (see log for details)",
                stats.warned
            ));
        }
        if stats.errored > 0 {
            lines.push(format!(
                "Errors:    {:>5} files (see log for details)",
                stats.errored
            ));
        }
        if stats.crashed > 0 {
            lines.push(format!("  of which {} worker crash(es)", stats.crashed));
        }
        if stats.timed_out > 0 {
            lines.push(format!("Timed out: {:>5} files", stats.timed_out));
        }
        Self { lines }
    }
}

#[cfg(test)]
mod tests {
    use super::format_size;

    #[test]
    fn sizes_pick_the_largest_fitting_unit() {
        assert_eq!(format_size(0), "0.0 B");
        assert_eq!(format_size(512), "512.0 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }
}
