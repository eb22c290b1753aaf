use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use doc2txt_core::SummaryView;
use doc2txt_engine::{
    prepare_output_root, Capability, EnvironmentProbe, Harness, Registry, WorkerCommand,
    WorkerSettings,
};
use engine_logging::{engine_info, engine_warn, LogSession};

use crate::cli::Cli;
use crate::{console, scan};

pub fn run(cli: Cli) -> Result<()> {
    println!(
        "doc2txt {} - {}",
        env!("CARGO_PKG_VERSION"),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    let session = LogSession::open(&cli.log_dir, cli.log_level)
        .with_context(|| format!("cannot create log file in {}", cli.log_dir.display()))?;
    engine_info!("doc2txt {} starting", env!("CARGO_PKG_VERSION"));

    let handlers = cli.handler_settings();
    let registry = Registry::build(&EnvironmentProbe::new(&handlers), &handlers)
        .context("cannot convert anything in this build")?;
    for (tag, capability) in registry.unavailable() {
        println!("note: {tag} files will be copied unchanged ({capability} unavailable)");
        if *capability == Capability::ExternalTool {
            println!(
                "      install calibre or pass --ebook-convert with the path to its ebook-convert"
            );
        }
    }

    if !cli.input.exists() {
        fs::create_dir_all(&cli.input)
            .with_context(|| format!("cannot create input directory {}", cli.input.display()))?;
        println!(
            "Created input directory {}. Put your documents there and run again.",
            cli.input.display()
        );
        engine_info!("created missing input directory {}", cli.input.display());
        session.close();
        return Ok(());
    }
    if !cli.input.is_dir() {
        bail!("input {} is not a directory", cli.input.display());
    }

    prepare_output_root(&cli.output, cli.clean_output)?;
    let output_root = std::path::absolute(&cli.output)
        .with_context(|| format!("cannot resolve {}", cli.output.display()))?;
    engine_info!(
        "input={} output={} threads={:?} timeout={}s tool={} tool_timeout={}s",
        cli.input.display(),
        output_root.display(),
        cli.threads,
        cli.timeout,
        cli.ebook_convert.display(),
        cli.tool_timeout
    );
    engine_info!("handled extensions: {}", registry.extensions().collect::<Vec<_>>().join(", "));

    let skip: [&Path; 2] = [&cli.output, &cli.log_dir];
    let sources = scan::scan(&cli.input, &cli.scan_filter(), &skip)?;
    println!("Found {} file(s) in {}", sources.len(), cli.input.display());
    engine_info!("found {} file(s)", sources.len());

    let settings = WorkerSettings {
        output_root,
        log_file: Some(session.path().to_path_buf()),
        log_level: session.level().to_string(),
        handlers,
    };
    let command = WorkerCommand::current_exe().context("cannot locate the doc2txt executable")?;
    let harness = Harness::new(command, settings, cli.harness_config());

    let (sink, printer) = console::start(sources.len());
    let stats = harness.run(sources, &sink);
    drop(sink);
    if printer.join().is_err() {
        engine_warn!("console printer stopped early");
    }

    println!();
    for line in SummaryView::from_stats(&stats).lines {
        println!("{line}");
        engine_info!("{line}");
    }
    println!("Log: {}", session.path().display());
    session.close();
    Ok(())
}
