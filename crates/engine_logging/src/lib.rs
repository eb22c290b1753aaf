#![deny(missing_docs)]
//! Shared logging utilities for the doc2txt workspace.
//!
//! This crate provides the `engine_*` logging macros used across the codebase,
//! the per-run [`LogSession`] handle and a minimal test initializer for the
//! global logger.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, TermLogger, TerminalMode, WriteLogger,
};

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! engine_trace {
    ($($arg:tt)*) => {{
        log::trace!($($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! engine_info {
    ($($arg:tt)*) => {{
        log::info!($($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! engine_debug {
    ($($arg:tt)*) => {{
        log::debug!($($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! engine_warn {
    ($($arg:tt)*) => {{
        log::warn!($($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! engine_error {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
    }};
}

/// Handle to the log file of one conversion run.
///
/// The main process opens the session once per run; every worker process
/// attaches to the same file in append mode. The handle is explicit so that
/// the file path and level can be handed to workers at startup.
#[derive(Debug, Clone)]
pub struct LogSession {
    path: PathBuf,
    level: LevelFilter,
}

impl LogSession {
    /// Creates `conversion_<YYYYmmdd_HHMMSS>.log` inside `dir` and routes the
    /// global logger into it.
    pub fn open(dir: &Path, level: LevelFilter) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("conversion_{stamp}.log"));
        let file = File::create(&path)?;
        install_file_logger(level, file);
        Ok(Self { path, level })
    }

    /// Appends to an existing session file. Used by worker processes.
    pub fn attach(path: &Path, level: LevelFilter) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        install_file_logger(level, file);
        Ok(Self {
            path: path.to_path_buf(),
            level,
        })
    }

    /// Path of the session's log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Level filter the session was opened with.
    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Flushes buffered records. The file itself is released at process exit.
    pub fn close(self) {
        log::logger().flush();
    }
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build()
}

fn install_file_logger(level: LevelFilter, file: File) {
    // A second session in the same process keeps the first logger.
    let _ = CombinedLogger::init(vec![WriteLogger::new(level, build_config(), file)]);
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
