//! Newline-delimited JSON spoken between the harness and its workers.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use doc2txt_core::{SourceFile, TaskId, TaskReport};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dispatch::HandlerSettings;

/// Flag that switches the executable into worker mode.
pub const WORKER_FLAG: &str = "--worker";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSettings {
    pub output_root: PathBuf,
    /// Run log to append to; `None` leaves the worker without a log.
    pub log_file: Option<PathBuf>,
    pub log_level: String,
    pub handlers: HandlerSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    Init(WorkerSettings),
    Convert { task_id: TaskId, source: SourceFile },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerReply {
    Ready { pid: u32 },
    Done { task_id: TaskId, report: TaskReport },
    /// The worker cannot continue, e.g. its registry could not be built.
    Fatal { message: String },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn write_message<W: Write, T: Serialize>(
    writer: &mut W,
    message: &T,
) -> Result<(), ProtocolError> {
    serde_json::to_writer(&mut *writer, message)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Next message, or `None` once the stream is closed.
pub fn read_message<R: BufRead, T: DeserializeOwned>(
    reader: &mut R,
) -> Result<Option<T>, ProtocolError> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if !line.trim().is_empty() {
            return Ok(Some(serde_json::from_str(line.trim())?));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn messages_are_one_json_object_per_line() {
        let mut wire = Vec::new();
        write_message(&mut wire, &WorkerReply::Ready { pid: 7 }).unwrap();
        write_message(
            &mut wire,
            &WorkerReply::Fatal {
                message: "no markup".into(),
            },
        )
        .unwrap();
        let text = String::from_utf8(wire.clone()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.starts_with(r#"{"type":"ready","pid":7}"#));

        let mut reader = Cursor::new(wire);
        let first: Option<WorkerReply> = read_message(&mut reader).unwrap();
        assert_eq!(first, Some(WorkerReply::Ready { pid: 7 }));
        let _: Option<WorkerReply> = read_message(&mut reader).unwrap();
        let end: Option<WorkerReply> = read_message(&mut reader).unwrap();
        assert_eq!(end, None);
    }

    #[test]
    fn garbage_line_is_an_error() {
        let mut reader = Cursor::new(b"Traceback (most recent call last)\n".to_vec());
        let result: Result<Option<WorkerReply>, _> = read_message(&mut reader);
        assert!(matches!(result, Err(ProtocolError::Json(_))));
    }
}
