//! Observability: the run log.
//!
//! Every component logs through `tracing`. This module turns a
//! [`LoggingConfig`] into a [`Dispatch`]: an append-only, timestamped file
//! log mirrored to the console (stdout, or stderr when stdout carries
//! the JSON report). The binary installs the dispatch globally;
//! tests scope one with [`tracing::dispatcher::with_default`] around the
//! code under test and read back what it logged.

mod logging;
pub mod metrics;

pub use logging::{BufferWriter, ConsoleTarget, LogFormat, LoggingConfig};

use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Builds the run log dispatcher: file (if configured) plus the console
/// mirror.
///
/// # Errors
///
/// Returns an error if the filter directive is invalid or the log file
/// cannot be opened for appending.
pub fn build_dispatch(config: &LoggingConfig) -> Result<Dispatch> {
    let console = match config.console {
        ConsoleTarget::Off => None,
        ConsoleTarget::Stdout => Some(fmt_layer(config.format, io::stdout, true)),
        ConsoleTarget::Stderr => Some(fmt_layer(config.format, io::stderr, true)),
    };
    build(config, console)
}

/// Builds a dispatcher that writes to `writer` instead of stdout.
///
/// The configured log file, if any, is still written.
///
/// # Errors
///
/// Returns an error if the filter directive is invalid or the log file
/// cannot be opened for appending.
pub fn build_dispatch_with_writer<W>(config: &LoggingConfig, writer: W) -> Result<Dispatch>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    build(config, Some(fmt_layer(config.format, writer, false)))
}

/// Installs the run log as the process-wide default.
///
/// # Errors
///
/// Returns an error if the dispatcher cannot be built or a global default is
/// already set.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let dispatch = build_dispatch(config)?;
    tracing::dispatcher::set_global_default(dispatch).map_err(|e| Error::OperationFailed {
        operation: "observability_init".to_string(),
        cause: e.to_string(),
    })
}

fn build(config: &LoggingConfig, console: Option<BoxedLayer>) -> Result<Dispatch> {
    let filter = EnvFilter::try_new(&config.filter).map_err(|e| Error::OperationFailed {
        operation: "parse_log_filter".to_string(),
        cause: format!("{}: {e}", config.filter),
    })?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if let Some(path) = &config.file {
        layers.push(fmt_layer(config.format, open_log_file(path)?, false));
    }
    layers.extend(console);

    let subscriber = tracing_subscriber::registry().with(layers).with(filter);
    Ok(Dispatch::new(subscriber))
}

fn fmt_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(false)
            .boxed(),
    }
}

/// Thread-safe file writer for logging.
#[derive(Clone)]
struct LogFileWriter {
    file: Arc<Mutex<File>>,
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        guard.flush()
    }
}

impl<'a> MakeWriter<'a> for LogFileWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Opens a log file for appending.
fn open_log_file(path: &Path) -> Result<LogFileWriter> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
            operation: "create_log_dir".to_string(),
            cause: e.to_string(),
        })?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::OperationFailed {
            operation: "open_log_file".to_string(),
            cause: format!("{}: {}", path.display(), e),
        })?;

    Ok(LogFileWriter {
        file: Arc::new(Mutex::new(file)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dispatch_writes_file_and_mirror() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("logs/purge.log");
        let config = LoggingConfig {
            file: Some(log_path.clone()),
            ..LoggingConfig::default()
        };
        let mirror = BufferWriter::new();

        let dispatch = build_dispatch_with_writer(&config, mirror.clone()).unwrap();
        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!("Tractor purge initiated.");
            tracing::debug!("filtered out");
        });

        let file = std::fs::read_to_string(&log_path).unwrap();
        assert!(file.contains("INFO"));
        assert!(file.contains("Tractor purge initiated."));
        assert!(!file.contains("filtered out"));
        assert!(mirror.contents().contains("Tractor purge initiated."));
    }

    #[test]
    fn test_file_is_appended() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("purge.log");
        std::fs::write(&log_path, "previous run\n").unwrap();
        let config = LoggingConfig {
            file: Some(log_path.clone()),
            console: ConsoleTarget::Off,
            ..LoggingConfig::default()
        };

        let dispatch = build_dispatch(&config).unwrap();
        tracing::dispatcher::with_default(&dispatch, || tracing::warn!("second run"));

        let file = std::fs::read_to_string(&log_path).unwrap();
        assert!(file.starts_with("previous run\n"));
        assert!(file.contains("WARN"));
    }

    #[test]
    fn test_json_format() {
        let config = LoggingConfig {
            format: LogFormat::Json,
            ..LoggingConfig::default()
        };
        let mirror = BufferWriter::new();

        let dispatch = build_dispatch_with_writer(&config, mirror.clone()).unwrap();
        tracing::dispatcher::with_default(&dispatch, || tracing::info!(count = 4, "found"));

        let line = mirror.contents();
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["fields"]["count"], 4);
    }

    #[test]
    fn test_invalid_filter() {
        let config = LoggingConfig {
            filter: "tractor_purge=notalevel".to_string(),
            ..LoggingConfig::default()
        };
        assert!(build_dispatch(&config).is_err());
    }
}
