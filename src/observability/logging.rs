//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, one line per event.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name. Unknown names fall back to `Pretty`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }

    /// Returns the format name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

/// Where the console mirror of the run log goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleTarget {
    /// No console mirror.
    Off,
    /// Mirror to stdout.
    #[default]
    Stdout,
    /// Mirror to stderr, leaving stdout for machine-readable output.
    Stderr,
}

/// Where and how the run log is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive.
    pub filter: String,
    /// Line format.
    pub format: LogFormat,
    /// Append-only log file, if any.
    pub file: Option<PathBuf>,
    /// Console mirror.
    pub console: ConsoleTarget,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
            console: ConsoleTarget::Stdout,
        }
    }
}

impl LoggingConfig {
    /// Builds a logging config from settings. `verbose` raises the level to
    /// `debug`.
    #[must_use]
    pub fn from_settings(settings: &LoggingSettings, verbose: bool, file: Option<PathBuf>) -> Self {
        let filter = if verbose {
            "debug".to_string()
        } else {
            settings.level.clone()
        };

        Self {
            filter,
            format: settings.format,
            file,
            console: ConsoleTarget::Stdout,
        }
    }

    /// Sets the console mirror target.
    #[must_use]
    pub const fn with_console(mut self, console: ConsoleTarget) -> Self {
        self.console = console;
        self
    }
}

/// In-memory log sink.
///
/// Clones share one buffer, so a test can hand a clone to the subscriber
/// and read what was logged afterwards.
#[derive(Debug, Clone, Default)]
pub struct BufferWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl BufferWriter {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything written so far.
    #[must_use]
    pub fn contents(&self) -> String {
        self.buf
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default()
    }
}

impl Write for BufferWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .buf
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        guard.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for BufferWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("fancy"), LogFormat::Pretty);
    }

    #[test]
    fn test_from_settings_verbose() {
        let settings = LoggingSettings::default();
        let config = LoggingConfig::from_settings(&settings, true, None);
        assert_eq!(config.filter, "debug");

        let config = LoggingConfig::from_settings(&settings, false, Some("/tmp/x.log".into()));
        assert_eq!(config.filter, "info");
        assert_eq!(config.file, Some(PathBuf::from("/tmp/x.log")));
        assert_eq!(config.console, ConsoleTarget::Stdout);

        let config = config.with_console(ConsoleTarget::Stderr);
        assert_eq!(config.console, ConsoleTarget::Stderr);
    }

    #[test]
    fn test_buffer_writer_shares_buffer() {
        let writer = BufferWriter::new();
        let mut clone = writer.clone();
        clone.write_all(b"purge done").unwrap();
        assert_eq!(writer.contents(), "purge done");
    }
}
