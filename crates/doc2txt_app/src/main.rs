mod app;
mod cli;
mod console;
mod scan;

use std::io;
use std::process::ExitCode;

use clap::Parser;
use doc2txt_engine::WORKER_FLAG;

fn main() -> ExitCode {
    // Worker mode is checked before clap so the protocol channel never sees
    // usage text.
    if std::env::args_os().nth(1).is_some_and(|arg| arg == WORKER_FLAG) {
        return run_worker();
    }

    let cli = cli::Cli::parse();
    match app::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_worker() -> ExitCode {
    doc2txt_engine::install_panic_hook();
    match doc2txt_engine::serve(io::stdin().lock(), io::stdout().lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            engine_logging::engine_error!("worker stopped: {err}");
            ExitCode::FAILURE
        }
    }
}
