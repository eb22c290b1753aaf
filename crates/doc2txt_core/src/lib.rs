//! doc2txt core: pure data model, task state machine and run statistics.
mod outcome;
mod source;
mod state;
mod update;
mod view_model;

pub use outcome::{
    ConversionError, ConversionOutcome, ErrorKind, ExtractionWarning, TaskCompletion, TaskReport,
    TaskResult, WarningKind,
};
pub use source::{normalize_extension, SourceFile};
pub use state::{TaskId, TaskState};
pub use update::{update, RunStatistics};
pub use view_model::{format_size, ProgressLine, ProgressStatus, SummaryView};
