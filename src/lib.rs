//! # Tractor Purge
//!
//! Retention enforcement for a Tractor render farm.
//!
//! Jobs and their cmd-log folders pile up on shared storage. This crate
//! works out which of them have aged past the retention window and removes
//! them:
//!
//! - [`retention`] asks the scheduler which jobs are retained or aged
//! - [`inventory`] enumerates `<root>/<bucket>/J<digits>` log folders
//! - [`reconcile`] derives the deletion plan
//! - [`purge`] applies it, or previews it in dry-run mode
//! - [`engine`] drives a single run from countdown to report
//!
//! The scheduler itself sits behind the [`SchedulerClient`] trait. The
//! binary talks to `tq`; tests use [`scheduler::InMemoryScheduler`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use tractor_purge::config::PurgeConfig;
//! use tractor_purge::engine::{CancelToken, PurgeRun};
//! use tractor_purge::scheduler::TqClient;
//!
//! let config = PurgeConfig::default().with_dry_run(true).with_delete_cmd_logs(true);
//! config.validate()?;
//! let client = TqClient::new(&config.tq, config.query_timeout);
//! let report = PurgeRun::new(&config, &client).run(&CancelToken::new())?;
//! println!("{}", report.summary());
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;
use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod engine;
pub mod inventory;
pub mod lock;
pub mod observability;
pub mod purge;
pub mod reconcile;
pub mod retention;
pub mod scheduler;

// Re-exports for convenience
pub use config::PurgeConfig;
pub use engine::{CancelToken, PurgeReport, PurgeRun, SectionStatus};
pub use inventory::{FolderInventory, FolderName, JobFolder, parse_job_folder};
pub use reconcile::{DeletionPlan, JobPlan, reconcile};
pub use retention::{JobSet, QueryMode, QueryOutcome, RetentionPolicy, RetentionQuery};
pub use scheduler::{JobId, JobPredicate, SchedulerClient};

/// Error type for purge operations.
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Configuration` | Missing tq binary, missing cmd-logs dir, no purge mode |
/// | `SchedulerQuery` | `tq` could not be run, timed out, or printed an unparsable line |
/// | `SchedulerCommand` | The `tq` delete/preview invocation failed |
/// | `Inventory` | The cmd-logs root could not be read |
/// | `PlanRefused` | A deletion plan was requested from a failed query |
/// | `AlreadyRunning` | Another run holds the lock file |
/// | `Cancelled` | The operator aborted during the countdown |
/// | `OperationFailed` | Any other I/O failure (log file, lock file, config file) |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Configuration is invalid. Always raised before any destructive step.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The scheduler query channel could not be read.
    #[error("scheduler query failed: {0}")]
    SchedulerQuery(String),

    /// The scheduler delete/preview command failed.
    #[error("scheduler command failed: {0}")]
    SchedulerCommand(String),

    /// The log folder inventory could not be taken.
    #[error("cannot read log root {path}: {cause}")]
    Inventory {
        /// The directory that could not be read.
        path: PathBuf,
        /// The underlying cause.
        cause: String,
    },

    /// Reconciliation was asked to plan from an untrustworthy query result.
    #[error("refusing to build deletion plan: {0}")]
    PlanRefused(String),

    /// Another purge run holds the lock.
    #[error("another purge run holds the lock at {}", .0.display())]
    AlreadyRunning(PathBuf),

    /// The operator aborted the run during the countdown.
    #[error("run cancelled by operator")]
    Cancelled,

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for purge operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Configuration("tq not found on path /opt/tq".to_string());
        assert_eq!(
            err.to_string(),
            "configuration error: tq not found on path /opt/tq"
        );

        let err = Error::OperationFailed {
            operation: "open_log_file".to_string(),
            cause: "denied".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'open_log_file' failed: denied");

        let err = Error::AlreadyRunning(PathBuf::from("/var/tmp/tractor-purge.lock"));
        assert_eq!(
            err.to_string(),
            "another purge run holds the lock at /var/tmp/tractor-purge.lock"
        );
    }
}
