//! Configuration management.
//!
//! Values come from, in increasing precedence: built-in defaults, a TOML
//! config file, `TRACTOR_PURGE_*` environment variables and command-line
//! flags. The last two are resolved by the binary; this module owns the
//! defaults, the file format and validation.
//!
//! ```toml
//! tq = "/opt/pixar/Tractor-2.2/bin/tq"
//! cmd_logs_dir = "/var/spool/tractor/cmd-logs"
//! days = 30
//! delete_cmd_logs = true
//! delete_jobs = false
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

use crate::observability::LogFormat;
use crate::retention::{DEFAULT_RETENTION_DAYS, RetentionPolicy};
use crate::scheduler::DEFAULT_QUERY_TIMEOUT;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default path of the `tq` binary.
pub const DEFAULT_TQ: &str = "/opt/pixar/Tractor-2.2/bin/tq";

/// Default cmd-logs root.
pub const DEFAULT_CMD_LOGS_DIR: &str = "/var/spool/tractor/cmd-logs";

/// Default run log.
pub const DEFAULT_LOG_FILE: &str = "/var/tmp/tractor-purge.log";

/// Default lock file.
pub const DEFAULT_LOCK_FILE: &str = "/var/tmp/tractor-purge.lock";

/// Default operator abort window.
pub const DEFAULT_COUNTDOWN: Duration = Duration::from_secs(10);

/// Main configuration for a purge run.
#[derive(Debug, Clone)]
pub struct PurgeConfig {
    /// Path to the `tq` binary.
    pub tq: PathBuf,
    /// Root of the cmd-logs tree.
    pub cmd_logs_dir: PathBuf,
    /// Append-only run log.
    pub log_file: PathBuf,
    /// Lock file guarding against concurrent runs.
    pub lock_file: PathBuf,
    /// Retention window.
    pub retention: RetentionPolicy,
    /// Purge cmd-log folders.
    pub delete_cmd_logs: bool,
    /// Purge job records.
    pub delete_jobs: bool,
    /// Preview only.
    pub dry_run: bool,
    /// Abort window before any query or deletion.
    pub countdown: Duration,
    /// Upper bound on each `tq` invocation.
    pub query_timeout: Duration,
    /// Prometheus textfile written after the run, if any.
    pub metrics_file: Option<PathBuf>,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `info` or `tractor_purge=debug`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Path to `tq`.
    pub tq: Option<String>,
    /// Cmd-logs root.
    pub cmd_logs_dir: Option<String>,
    /// Run log path.
    pub log_file: Option<String>,
    /// Lock file path.
    pub lock_file: Option<String>,
    /// Retention window in days.
    pub days: Option<u32>,
    /// Purge cmd-log folders.
    pub delete_cmd_logs: Option<bool>,
    /// Purge job records.
    pub delete_jobs: Option<bool>,
    /// Preview only.
    pub dry_run: Option<bool>,
    /// Countdown in seconds.
    pub countdown_secs: Option<u64>,
    /// `tq` timeout in seconds.
    pub query_timeout_secs: Option<u64>,
    /// Prometheus textfile path.
    pub metrics_file: Option<String>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Filter directive.
    pub level: Option<String>,
    /// `pretty` or `json`.
    pub format: Option<String>,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            tq: PathBuf::from(DEFAULT_TQ),
            cmd_logs_dir: PathBuf::from(DEFAULT_CMD_LOGS_DIR),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            lock_file: PathBuf::from(DEFAULT_LOCK_FILE),
            retention: RetentionPolicy::new(DEFAULT_RETENTION_DAYS),
            delete_cmd_logs: false,
            delete_jobs: false,
            dry_run: false,
            countdown: DEFAULT_COUNTDOWN,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            metrics_file: None,
            logging: LoggingSettings::default(),
        }
    }
}

impl PurgeConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform config dir (`~/.config/tractor-purge/config.toml`
    /// on Linux) and returns defaults if there is no file there.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_default() -> Result<Self> {
        match Self::default_config_path() {
            Some(path) => Self::load_if_present(&path),
            None => Ok(Self::default()),
        }
    }

    /// Loads `path` if it exists, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_if_present(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Returns the platform-specific default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|dirs| {
            dirs.config_dir()
                .join("tractor-purge")
                .join("config.toml")
        })
    }

    /// Converts a `ConfigFile` to `PurgeConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(tq) = file.tq {
            config.tq = PathBuf::from(tq);
        }
        if let Some(dir) = file.cmd_logs_dir {
            config.cmd_logs_dir = PathBuf::from(dir);
        }
        if let Some(log_file) = file.log_file {
            config.log_file = PathBuf::from(log_file);
        }
        if let Some(lock_file) = file.lock_file {
            config.lock_file = PathBuf::from(lock_file);
        }
        if let Some(days) = file.days {
            config.retention = RetentionPolicy::new(days);
        }
        config.delete_cmd_logs = file.delete_cmd_logs.unwrap_or(config.delete_cmd_logs);
        config.delete_jobs = file.delete_jobs.unwrap_or(config.delete_jobs);
        config.dry_run = file.dry_run.unwrap_or(config.dry_run);
        if let Some(secs) = file.countdown_secs {
            config.countdown = Duration::from_secs(secs);
        }
        if let Some(secs) = file.query_timeout_secs {
            config.query_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = file.metrics_file {
            config.metrics_file = Some(PathBuf::from(path));
        }
        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                config.logging.level = level;
            }
            if let Some(format) = logging.format {
                config.logging.format = LogFormat::parse(&format);
            }
        }

        config
    }

    /// Sets the retention window.
    #[must_use]
    pub const fn with_days(mut self, days: u32) -> Self {
        self.retention = RetentionPolicy::new(days);
        self
    }

    /// Sets the `tq` binary path.
    #[must_use]
    pub fn with_tq(mut self, tq: impl Into<PathBuf>) -> Self {
        self.tq = tq.into();
        self
    }

    /// Sets the cmd-logs root.
    #[must_use]
    pub fn with_cmd_logs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cmd_logs_dir = dir.into();
        self
    }

    /// Enables or disables log folder purge.
    #[must_use]
    pub const fn with_delete_cmd_logs(mut self, enabled: bool) -> Self {
        self.delete_cmd_logs = enabled;
        self
    }

    /// Enables or disables job record purge.
    #[must_use]
    pub const fn with_delete_jobs(mut self, enabled: bool) -> Self {
        self.delete_jobs = enabled;
        self
    }

    /// Enables or disables dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sets the countdown duration.
    #[must_use]
    pub const fn with_countdown(mut self, countdown: Duration) -> Self {
        self.countdown = countdown;
        self
    }

    /// Checks that the run can start.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `tq` is missing, the cmd-logs
    /// root is missing while log purge is enabled, or no purge mode is
    /// selected.
    pub fn validate(&self) -> Result<()> {
        if !self.tq.exists() {
            return Err(Error::Configuration(format!(
                "tq not found on path {}",
                self.tq.display()
            )));
        }
        if self.delete_cmd_logs && !self.cmd_logs_dir.is_dir() {
            return Err(Error::Configuration(format!(
                "cmd-logs dir not found on path {}",
                self.cmd_logs_dir.display()
            )));
        }
        if !self.delete_cmd_logs && !self.delete_jobs {
            return Err(Error::Configuration(
                "neither --delete-cmd-logs nor --delete-jobs was specified".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PurgeConfig::default();
        assert_eq!(config.tq, PathBuf::from(DEFAULT_TQ));
        assert_eq!(config.retention.age_threshold_days, 30);
        assert_eq!(config.countdown, Duration::from_secs(10));
        assert!(!config.dry_run);
        assert!(!config.delete_cmd_logs && !config.delete_jobs);
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
tq = "/usr/local/bin/tq"
days = 14
delete_jobs = true
countdown_secs = 3
metrics_file = "/var/lib/node_exporter/tractor_purge.prom"

[logging]
level = "debug"
format = "json"
"#,
        )
        .unwrap();

        let config = PurgeConfig::load_from_file(&path).unwrap();

        assert_eq!(config.tq, PathBuf::from("/usr/local/bin/tq"));
        assert_eq!(config.retention.age_threshold_days, 14);
        assert!(config.delete_jobs);
        assert!(!config.delete_cmd_logs);
        assert_eq!(config.countdown, Duration::from_secs(3));
        assert_eq!(
            config.metrics_file,
            Some(PathBuf::from("/var/lib/node_exporter/tractor_purge.prom"))
        );
        assert_eq!(config.cmd_logs_dir, PathBuf::from(DEFAULT_CMD_LOGS_DIR));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_load_from_file_rejects_bad_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "days = \"thirty\"").unwrap();

        let err = PurgeConfig::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("parse_config_file"));
    }

    #[test]
    fn test_load_if_present_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = PurgeConfig::load_if_present(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.retention.age_threshold_days, DEFAULT_RETENTION_DAYS);
    }

    #[test]
    fn test_load_if_present_rejects_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "days = 90\ndelete_cmd_logs = yes\n").unwrap();

        let err = PurgeConfig::load_if_present(&path).unwrap_err();
        assert!(matches!(
            err,
            Error::OperationFailed { ref operation, .. } if operation == "parse_config_file"
        ));
    }

    #[test]
    fn test_validate_missing_tq() {
        let config = PurgeConfig::new()
            .with_tq("/nonexistent/tq")
            .with_delete_jobs(true);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(ref m) if m.contains("tq not found")));
    }

    #[test]
    fn test_validate_missing_cmd_logs_dir() {
        let dir = TempDir::new().unwrap();
        let tq = dir.path().join("tq");
        std::fs::write(&tq, b"").unwrap();

        let config = PurgeConfig::new()
            .with_tq(&tq)
            .with_cmd_logs_dir(dir.path().join("missing"))
            .with_delete_cmd_logs(true);
        assert!(config.validate().is_err());

        // Not needed when only jobs are purged.
        let config = config.with_delete_cmd_logs(false).with_delete_jobs(true);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_a_mode() {
        let dir = TempDir::new().unwrap();
        let tq = dir.path().join("tq");
        std::fs::write(&tq, b"").unwrap();

        let err = PurgeConfig::new().with_tq(&tq).validate().unwrap_err();
        assert!(err.to_string().contains("--delete-cmd-logs"));
    }
}
