//! Worker side of the harness protocol: one conversion at a time, read from
//! the input stream and answered on the output stream.

use std::io::{BufRead, Write};
use std::panic;
use std::str::FromStr;

use engine_logging::{engine_debug, engine_error, engine_info, engine_warn, LogSession};
use log::LevelFilter;

use crate::dispatch::{EnvironmentProbe, Registry};
use crate::protocol::{read_message, write_message, ProtocolError, WorkerReply, WorkerRequest};
use crate::runner::TaskRunner;

/// Routes panic messages into the run log instead of the worker's stderr.
pub fn install_panic_hook() {
    panic::set_hook(Box::new(|info| {
        engine_error!("worker panic: {info}");
    }));
}

/// Serves requests until the input stream closes.
pub fn serve<R: BufRead, W: Write>(mut input: R, mut output: W) -> Result<(), ProtocolError> {
    let settings = match read_message::<_, WorkerRequest>(&mut input)? {
        None => return Ok(()),
        Some(WorkerRequest::Init(settings)) => settings,
        Some(WorkerRequest::Convert { task_id, .. }) => {
            let message = format!("task {task_id} sent before init");
            write_message(&mut output, &WorkerReply::Fatal { message })?;
            return Ok(());
        }
    };

    let session = match &settings.log_file {
        Some(path) => {
            let level = LevelFilter::from_str(&settings.log_level).unwrap_or(LevelFilter::Info);
            LogSession::attach(path, level).ok()
        }
        None => None,
    };

    let probe = EnvironmentProbe::new(&settings.handlers);
    let registry = match Registry::build(&probe, &settings.handlers) {
        Ok(registry) => registry,
        Err(err) => {
            write_message(
                &mut output,
                &WorkerReply::Fatal {
                    message: err.to_string(),
                },
            )?;
            return Ok(());
        }
    };
    let runner = TaskRunner::new(registry, settings.output_root.clone());
    let pid = std::process::id();
    engine_info!("worker {pid} ready");
    write_message(&mut output, &WorkerReply::Ready { pid })?;

    while let Some(request) = read_message::<_, WorkerRequest>(&mut input)? {
        match request {
            WorkerRequest::Convert { task_id, source } => {
                engine_debug!("worker {pid} task {task_id}: {}", source.relative_path.display());
                let report = runner.run(&source);
                write_message(&mut output, &WorkerReply::Done { task_id, report })?;
            }
            WorkerRequest::Init(_) => engine_warn!("worker {pid} ignoring repeated init"),
        }
    }

    engine_debug!("worker {pid} input closed, exiting");
    if let Some(session) = session {
        session.close();
    }
    Ok(())
}
