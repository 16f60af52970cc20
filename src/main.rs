//! Binary entry point for tractor-purge.
//!
//! Exit codes: 0 success, 1 configuration or fatal error, 2 the run
//! finished but a section aborted or failed, 130 cancelled during the
//! countdown.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, warn};
use tractor_purge::config::PurgeConfig;
use tractor_purge::engine::{CancelToken, PurgeRun};
use tractor_purge::lock::RunLock;
use tractor_purge::observability::{self, ConsoleTarget, LoggingConfig, metrics};
use tractor_purge::retention::RetentionPolicy;
use tractor_purge::scheduler::TqClient;
use tractor_purge::Error;

/// Tractor Purge - avoid running out of disk space.
///
/// Deletes Tractor cmd-logs and/or job records older than the retention
/// window.
#[derive(Parser)]
#[command(name = "tractor-purge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Absolute path to tq.
    #[arg(short = 't', long, env = "TRACTOR_PURGE_TQ")]
    tq: Option<PathBuf>,

    /// Absolute path to the cmd-logs dir.
    #[arg(short = 'c', long = "cmd-logs-dir", env = "TRACTOR_PURGE_CMD_LOGS_DIR")]
    cmd_logs_dir: Option<PathBuf>,

    /// Absolute path to the tractor-purge log file.
    #[arg(short = 'l', long = "log", env = "TRACTOR_PURGE_LOG")]
    log: Option<PathBuf>,

    /// Number of days worth of jobs/logs to keep.
    #[arg(short = 'd', long, env = "TRACTOR_PURGE_DAYS")]
    days: Option<u32>,

    /// Delete cmd logs.
    #[arg(long)]
    delete_cmd_logs: bool,

    /// Delete jobs from the Tractor database (archived instead if
    /// DBArchiving is enabled in the Tractor config).
    #[arg(long)]
    delete_jobs: bool,

    /// Do not delete anything; preview deletions instead.
    #[arg(long)]
    dry_run: bool,

    /// Path to a TOML configuration file.
    #[arg(long, env = "TRACTOR_PURGE_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds to wait before acting, giving the operator a chance to abort.
    #[arg(long, env = "TRACTOR_PURGE_COUNTDOWN_SECS")]
    countdown_secs: Option<u64>,

    /// Upper bound in seconds on each tq invocation.
    #[arg(long, env = "TRACTOR_PURGE_QUERY_TIMEOUT_SECS")]
    query_timeout_secs: Option<u64>,

    /// Lock file preventing concurrent runs.
    #[arg(long, env = "TRACTOR_PURGE_LOCK_FILE")]
    lock_file: Option<PathBuf>,

    /// Prometheus textfile to write run counters to.
    #[arg(long, env = "TRACTOR_PURGE_METRICS_FILE")]
    metrics_file: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Print the final report as JSON on stdout.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("tractor-purge: {e}");
            return ExitCode::from(1);
        },
    };

    let logging =
        LoggingConfig::from_settings(&config.logging, cli.verbose, Some(config.log_file.clone()))
            .with_console(console_target(&cli));
    if let Err(e) = observability::init(&logging) {
        eprintln!("tractor-purge: {e}");
        return ExitCode::from(1);
    }

    if let Err(e) = config.validate() {
        error!("{e}");
        return ExitCode::from(1);
    }

    let _lock = match RunLock::acquire(&config.lock_file) {
        Ok(lock) => lock,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(1);
        },
    };

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!(error = %e, "Cannot install Ctrl+C handler; the countdown cannot be aborted");
    }

    let textfile = config
        .metrics_file
        .as_ref()
        .and_then(|path| match metrics::install_recorder() {
            Ok(handle) => Some((handle, path)),
            Err(e) => {
                warn!(error = %e, "Cannot install metrics recorder; no metrics will be written");
                None
            },
        });

    let client = TqClient::new(&config.tq, config.query_timeout);
    let result = PurgeRun::new(&config, &client).run(&cancel);

    if let Some((handle, path)) = &textfile
        && let Err(e) = metrics::write_textfile(handle, path)
    {
        warn!(error = %e, "Cannot write metrics textfile");
    }

    match result {
        Ok(report) => {
            if cli.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{json}"),
                    Err(e) => error!(error = %e, "Cannot serialize report"),
                }
            }
            if report.has_failures() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            }
        },
        Err(Error::Cancelled) => ExitCode::from(130),
        Err(e) => {
            error!("{e}");
            ExitCode::from(1)
        },
    }
}

/// Resolves configuration: defaults, then config file, then env and flags.
fn load_config(cli: &Cli) -> Result<PurgeConfig, Error> {
    let mut config = match &cli.config {
        Some(path) => PurgeConfig::load_from_file(path)?,
        None => PurgeConfig::load_default()?,
    };

    if let Some(tq) = &cli.tq {
        config.tq.clone_from(tq);
    }
    if let Some(dir) = &cli.cmd_logs_dir {
        config.cmd_logs_dir.clone_from(dir);
    }
    if let Some(log) = &cli.log {
        config.log_file.clone_from(log);
    }
    if let Some(lock) = &cli.lock_file {
        config.lock_file.clone_from(lock);
    }
    if let Some(days) = cli.days {
        config.retention = RetentionPolicy::new(days);
    }
    if let Some(secs) = cli.countdown_secs {
        config.countdown = Duration::from_secs(secs);
    }
    if let Some(secs) = cli.query_timeout_secs {
        config.query_timeout = Duration::from_secs(secs);
    }
    if let Some(path) = &cli.metrics_file {
        config.metrics_file = Some(path.clone());
    }
    config.delete_cmd_logs |= cli.delete_cmd_logs;
    config.delete_jobs |= cli.delete_jobs;
    config.dry_run |= cli.dry_run;

    Ok(config)
}

/// Keeps stdout clean for the JSON report when `--json` is given.
const fn console_target(cli: &Cli) -> ConsoleTarget {
    if cli.json {
        ConsoleTarget::Stderr
    } else {
        ConsoleTarget::Stdout
    }
}
