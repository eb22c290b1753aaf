use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    EncryptedSource,
    MalformedArchive,
    MissingReference,
    EmptyExtraction,
    MissingExternalTool,
    ExternalToolFailure,
    /// The external tool refused the file because of DRM.
    DrmProtected,
    Timeout,
    Unclassified,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::EncryptedSource => write!(f, "encrypted source"),
            ErrorKind::MalformedArchive => write!(f, "malformed archive"),
            ErrorKind::MissingReference => write!(f, "missing reference"),
            ErrorKind::EmptyExtraction => write!(f, "empty extraction"),
            ErrorKind::MissingExternalTool => write!(f, "missing external tool"),
            ErrorKind::ExternalToolFailure => write!(f, "external tool failure"),
            ErrorKind::DrmProtected => write!(f, "drm protected"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Unclassified => write!(f, "unclassified failure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ConversionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// A manifest path that does not exist inside the container.
    MissingReference,
    /// A reading-order identifier that the manifest does not declare.
    UnknownIdentifier,
    /// Strict parsing failed and the lenient HTML parser was used.
    LenientFallback,
}

/// Non-fatal diagnostic attached to a converted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionWarning {
    pub kind: WarningKind,
    pub part: String,
    pub message: String,
}

impl ExtractionWarning {
    pub fn new(kind: WarningKind, part: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            part: part.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.part)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionOutcome {
    Converted { source_bytes: u64, text_bytes: u64 },
    Copied { bytes: u64 },
    Skipped { reason: String },
    Failed { error: ConversionError },
}

/// Everything a worker reports back for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub relative_path: PathBuf,
    pub outcome: ConversionOutcome,
    pub warnings: Vec<ExtractionWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    Completed(TaskReport),
    TimedOut { after: Duration },
    CrashedWorker { detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCompletion {
    pub task_id: TaskId,
    pub relative_path: PathBuf,
    pub result: TaskResult,
}
