use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use doc2txt_engine::{HandlerSettings, HarnessConfig};
use log::LevelFilter;

use crate::scan::ScanFilter;

/// Convert a tree of e-books and documents into plain text.
#[derive(Parser, Debug, Clone)]
#[command(name = "doc2txt", version)]
pub struct Cli {
    /// Directory scanned recursively for source files
    #[arg(value_name = "INPUT", default_value = "input")]
    pub input: PathBuf,

    /// Directory receiving the mirrored text tree
    #[arg(value_name = "OUTPUT", default_value = "output")]
    pub output: PathBuf,

    /// Number of worker processes (defaults to the number of CPUs)
    #[arg(short, long, value_name = "N")]
    pub threads: Option<usize>,

    /// Seconds a single file may take before it is abandoned
    #[arg(long, value_name = "SECS", default_value_t = 120)]
    pub timeout: u64,

    /// Remove an existing output directory instead of refusing to run
    #[arg(long)]
    pub clean_output: bool,

    /// Only process these extensions (comma separated, e.g. .epub,.pdf)
    #[arg(long, value_delimiter = ',', value_name = "EXTS")]
    pub include: Vec<String>,

    /// Never process these extensions (comma separated, e.g. .jpg,.png)
    #[arg(long, value_delimiter = ',', value_name = "EXTS")]
    pub exclude: Vec<String>,

    /// Log file verbosity: off, error, warn, info, debug, trace
    #[arg(long, value_name = "LEVEL", default_value = "info", value_parser = parse_level)]
    pub log_level: LevelFilter,

    /// Directory for the per-run log file
    #[arg(long, value_name = "DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// External converter used for MOBI/AZW3
    #[arg(long, value_name = "PROGRAM", default_value = "ebook-convert")]
    pub ebook_convert: PathBuf,

    /// Seconds the external converter may run per file
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    pub tool_timeout: u64,

    /// Kill a timed-out worker immediately instead of at the end of the run
    #[arg(long)]
    pub kill_on_timeout: bool,
}

fn parse_level(raw: &str) -> Result<LevelFilter, String> {
    LevelFilter::from_str(raw).map_err(|_| format!("unknown log level '{raw}'"))
}

impl Cli {
    pub fn handler_settings(&self) -> HandlerSettings {
        HandlerSettings {
            external_tool: self.ebook_convert.clone(),
            tool_timeout: Duration::from_secs(self.tool_timeout),
            scratch_dir: None,
        }
    }

    pub fn harness_config(&self) -> HarnessConfig {
        let defaults = HarnessConfig::default();
        HarnessConfig {
            concurrency: self.threads.unwrap_or(defaults.concurrency).max(1),
            task_timeout: Duration::from_secs(self.timeout.max(1)),
            kill_on_timeout: self.kill_on_timeout,
        }
    }

    pub fn scan_filter(&self) -> ScanFilter {
        ScanFilter::new(&self.include, &self.exclude)
    }
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::Parser;
    use log::LevelFilter;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn defaults_match_documented_values() {
        let cli = Cli::try_parse_from(["doc2txt"]).unwrap();
        assert_eq!(cli.input, PathBuf::from("input"));
        assert_eq!(cli.output, PathBuf::from("output"));
        assert_eq!(cli.timeout, 120);
        assert_eq!(cli.log_level, LevelFilter::Info);
        assert_eq!(cli.handler_settings().tool_timeout, Duration::from_secs(300));
        assert!(!cli.clean_output);
    }

    #[test]
    fn lists_are_comma_separated() {
        let cli = Cli::try_parse_from([
            "doc2txt",
            "books",
            "texts",
            "--include",
            ".epub,PDF",
            "--exclude=.jpg",
            "-t",
            "3",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.include, vec![".epub", "PDF"]);
        assert_eq!(cli.exclude, vec![".jpg"]);
        assert_eq!(cli.harness_config().concurrency, 3);
        assert_eq!(cli.log_level, LevelFilter::Debug);
        assert!(cli.scan_filter().allows("pdf"));
    }

    #[test]
    fn bad_level_is_rejected() {
        assert!(Cli::try_parse_from(["doc2txt", "--log-level", "loud"]).is_err());
    }
}
