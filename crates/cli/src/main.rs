// distmerge CLI - fill distribution import templates from source exports

mod exit_codes;
mod job;
mod merge;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use distmerge_recon::ReconError;
use log::{LevelFilter, Metadata, Record};

use exit_codes::{recon_exit_code, EXIT_RUNTIME, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "distmerge")]
#[command(about = "Merge distribution exports into investor import templates")]
#[command(version)]
struct Cli {
    /// Log level: error, warn, info, debug, trace or off
    #[arg(long, global = true, env = "DISTMERGE_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the entity rows and date columns found in a target template
    #[command(after_help = "\
Examples:
  distmerge scan import.xlsx
  distmerge scan import.xlsx --job job.toml --json")]
    Scan {
        /// Target template (xlsx, xls, ods or csv)
        target: PathBuf,

        /// Take the template layout from this job file
        #[arg(long)]
        job: Option<PathBuf>,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,
    },

    /// Show suggested source -> template name mapping
    #[command(after_help = "\
Examples:
  distmerge suggest job.toml
  distmerge suggest job.toml --write
  distmerge suggest job.toml --json")]
    Suggest {
        /// Path to the job .toml file
        job: PathBuf,

        /// Store the effective mapping as [mapping] overrides in the job file
        #[arg(long)]
        write: bool,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,
    },

    /// List (entity, date) pairs with several source amounts
    #[command(after_help = "\
Examples:
  distmerge duplicates job.toml
  distmerge duplicates job.toml --json")]
    Duplicates {
        /// Path to the job .toml file
        job: PathBuf,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,
    },

    /// Write source amounts into the template's existing date columns
    #[command(after_help = "\
Examples:
  distmerge complete job.toml
  distmerge complete job.toml -o filled.xlsx
  distmerge complete job.toml --strict --json")]
    Complete {
        /// Path to the job .toml file
        job: PathBuf,

        /// Output workbook (default: updated_target.xlsx next to the job file)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Exit 63 when some template cells received no amount
        #[arg(long)]
        strict: bool,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,
    },

    /// Append one distribution block per new source date
    #[command(after_help = "\
Examples:
  distmerge extend job.toml
  distmerge extend job.toml -o populated.xlsx --year 2024")]
    Extend {
        /// Path to the job .toml file
        job: PathBuf,

        /// Output workbook (default: populated_incomplete_filtered.xlsx next to the job file)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Year written into the new blocks' label row
        #[arg(long)]
        year: Option<i32>,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,
    },

    /// Parse and validate a job file without running it
    #[command(after_help = "\
Examples:
  distmerge validate job.toml")]
    Validate {
        /// Path to the job .toml file
        job: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(&cli.log) {
        eprintln!("error: {}", err.message);
        return ExitCode::from(err.code);
    }

    let result = match cli.command {
        None => {
            // No subcommand = show help
            eprintln!("Usage: distmerge <command> [options]");
            eprintln!("       distmerge --help for more information");
            Ok(())
        }
        Some(Commands::Scan { target, job, json }) => merge::cmd_scan(target, job, json),
        Some(Commands::Suggest { job, write, json }) => merge::cmd_suggest(job, write, json),
        Some(Commands::Duplicates { job, json }) => merge::cmd_duplicates(job, json),
        Some(Commands::Complete { job, output, strict, json }) => merge::cmd_complete(job, output, strict, json),
        Some(Commands::Extend { job, output, year, json }) => merge::cmd_extend(job, output, year, json),
        Some(Commands::Validate { job }) => merge::cmd_validate(job),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self { code: EXIT_RUNTIME, message: msg.into(), hint: None }
    }

    /// Engine error with its registry exit code.
    pub fn recon(err: ReconError) -> Self {
        let hint = match &err {
            ReconError::Layout(_) => Some("check the [layout] section against the template".to_string()),
            ReconError::InvalidChoice { .. } => {
                Some("run `distmerge duplicates` to see each group's amounts".to_string())
            }
            _ => None,
        };
        Self { code: recon_exit_code(&err), message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// logging
// ============================================================================

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.trim().to_ascii_lowercase().as_str() {
        "error" => Some(LevelFilter::Error),
        "warn" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        "off" => Some(LevelFilter::Off),
        _ => None,
    }
}

fn init_logging(level: &str) -> Result<(), CliError> {
    static LOGGER: StderrLogger = StderrLogger;
    let filter = parse_level(level).ok_or_else(|| {
        CliError::usage(format!("unknown log level '{level}'"))
            .with_hint("use one of: error, warn, info, debug, trace, off")
    })?;
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(filter);
    Ok(())
}
