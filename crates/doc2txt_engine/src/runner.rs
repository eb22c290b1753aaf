use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use doc2txt_core::{ConversionError, ConversionOutcome, ErrorKind, SourceFile, TaskReport};
use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};

use crate::dispatch::Registry;
use crate::persist::AtomicFileWriter;
use crate::ConvertError;

/// Runs one source file through the registry and never lets a failure or a
/// panic escape: every outcome ends up in the returned [`TaskReport`].
#[derive(Debug, Clone)]
pub struct TaskRunner {
    registry: Registry,
    writer: AtomicFileWriter,
}

impl TaskRunner {
    pub fn new(registry: Registry, output_root: PathBuf) -> Self {
        Self {
            registry,
            writer: AtomicFileWriter::new(output_root),
        }
    }

    pub fn run(&self, source: &SourceFile) -> TaskReport {
        let relative = source.relative_path.clone();
        match panic::catch_unwind(AssertUnwindSafe(|| self.convert(source))) {
            Ok(report) => report,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                engine_error!("[{}] panicked: {message}", relative.display());
                TaskReport {
                    relative_path: relative,
                    outcome: ConversionOutcome::Failed {
                        error: ConversionError::new(
                            ErrorKind::Unclassified,
                            format!("conversion panicked: {message}"),
                        ),
                    },
                    warnings: Vec::new(),
                }
            }
        }
    }

    fn convert(&self, source: &SourceFile) -> TaskReport {
        let mut report = TaskReport {
            relative_path: source.relative_path.clone(),
            outcome: ConversionOutcome::Skipped {
                reason: String::new(),
            },
            warnings: Vec::new(),
        };

        if source.size == 0 {
            engine_info!("[{}] skipped: empty file", source.relative_path.display());
            report.outcome = ConversionOutcome::Skipped {
                reason: "empty file (0 bytes)".into(),
            };
            return report;
        }

        let result = match self.registry.lookup(&source.extension) {
            Some((tag, handler)) => {
                engine_debug!(
                    "[{}] {tag} via {} handler",
                    source.relative_path.display(),
                    handler.name()
                );
                handler.extract(&source.path).and_then(|extraction| {
                    report.warnings = extraction.warnings;
                    if extraction.text.trim().is_empty() {
                        return Err(ConvertError::EmptyExtraction);
                    }
                    self.writer
                        .write_text(&source.relative_path, &extraction.text)?;
                    Ok(ConversionOutcome::Converted {
                        source_bytes: source.size,
                        text_bytes: extraction.text.len() as u64,
                    })
                })
            }
            None => self
                .writer
                .copy_verbatim(&source.path, &source.relative_path)
                .map(|(_, bytes)| ConversionOutcome::Copied { bytes })
                .map_err(ConvertError::from),
        };

        for warning in &report.warnings {
            engine_warn!("[{}] {warning}", source.relative_path.display());
        }
        report.outcome = match result {
            Ok(outcome) => {
                engine_info!("[{}] {outcome:?}", source.relative_path.display());
                outcome
            }
            Err(err) => {
                engine_error!("[{}] {err}", source.relative_path.display());
                ConversionOutcome::Failed {
                    error: err.to_conversion_error(),
                }
            }
        };
        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
