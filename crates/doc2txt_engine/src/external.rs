//! Conversion through an external command-line e-book converter.
//!
//! The tool is invoked as `<program> <source> <workdir>/<stem>.txt` inside a
//! scoped temporary directory. Its stdout and stderr go to files in the same
//! directory so a chatty tool can never block on a full pipe. The directory
//! is removed on every exit path when the [`tempfile::TempDir`] guard drops.
//! Work directories live below the harness's run scratch directory when one
//! is given, so a worker killed mid-conversion leaves nothing behind.

use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use engine_logging::{engine_debug, engine_warn};

use crate::dispatch::{Extraction, FormatHandler};
use crate::ConvertError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct ExternalToolHandler {
    program: PathBuf,
    timeout: Duration,
    scratch_dir: Option<PathBuf>,
}

impl ExternalToolHandler {
    pub fn new(program: PathBuf, timeout: Duration) -> Self {
        Self {
            program,
            timeout,
            scratch_dir: None,
        }
    }

    pub fn with_scratch_dir(mut self, scratch_dir: Option<PathBuf>) -> Self {
        self.scratch_dir = scratch_dir;
        self
    }
}

impl FormatHandler for ExternalToolHandler {
    fn name(&self) -> &'static str {
        "external-tool"
    }

    fn extract(&self, path: &Path) -> Result<Extraction, ConvertError> {
        let text = run_converter(
            &self.program,
            path,
            self.timeout,
            self.scratch_dir.as_deref(),
        )?;
        Ok(Extraction {
            text,
            warnings: Vec::new(),
        })
    }
}

/// Runs the converter synchronously, killing it once `timeout` elapses. The
/// work directory is created below `scratch_dir`, or the system temp
/// directory.
pub fn run_converter(
    program: &Path,
    source: &Path,
    timeout: Duration,
    scratch_dir: Option<&Path>,
) -> Result<String, ConvertError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("doc2txt-");
    let workdir = match scratch_dir {
        Some(dir) => builder.tempdir_in(dir)?,
        None => builder.tempdir()?,
    };
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let output = workdir.path().join(format!("{stem}.txt"));
    let stdout_path = workdir.path().join("tool.stdout");
    let stderr_path = workdir.path().join("tool.stderr");

    let mut command = Command::new(program);
    command
        .arg(source)
        .arg(&output)
        .stdin(Stdio::null())
        .stdout(File::create(&stdout_path)?)
        .stderr(File::create(&stderr_path)?);
    hide_console_window(&mut command);

    let spawned = command.spawn();
    // Release the parent's handles on the capture files before the work
    // directory can be removed.
    drop(command);
    let mut child = spawned.map_err(|err| match err.kind() {
        ErrorKind::NotFound => ConvertError::MissingExternalTool(program.display().to_string()),
        _ => ConvertError::Io(err),
    })?;
    engine_debug!("started {} for {}", program.display(), source.display());

    let Some(status) = wait_with_timeout(&mut child, timeout)? else {
        engine_warn!(
            "{} did not finish within {} s, killing it",
            program.display(),
            timeout.as_secs()
        );
        let _ = child.kill();
        let _ = child.wait();
        return Err(ConvertError::ExternalToolFailure(format!(
            "conversion did not finish within {} s",
            timeout.as_secs()
        )));
    };

    if !status.success() {
        let detail = tool_output(&stderr_path, &stdout_path);
        if detail.contains("DRM") {
            return Err(ConvertError::DrmProtected);
        }
        return Err(ConvertError::ExternalToolFailure(format!("{status}: {detail}")));
    }

    if !output.exists() {
        return Err(ConvertError::ExternalToolFailure(
            "tool finished but produced no output file".into(),
        ));
    }
    let text = String::from_utf8_lossy(&fs::read(&output)?).into_owned();
    if text.trim().is_empty() {
        return Err(ConvertError::ExternalToolFailure(
            "tool finished but the output file is empty".into(),
        ));
    }
    Ok(text)
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

fn tool_output(stderr_path: &Path, stdout_path: &Path) -> String {
    [stderr_path, stdout_path]
        .iter()
        .filter_map(|path| fs::read(path).ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
        .find(|text| !text.is_empty())
        .unwrap_or_else(|| "no output from tool".to_string())
}

#[cfg(windows)]
fn hide_console_window(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    command.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console_window(_command: &mut Command) {}
