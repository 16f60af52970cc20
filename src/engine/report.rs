//! Run report.

use crate::config::PurgeConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// Outcome of one purge section (log folders or job records).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionStatus {
    /// Not enabled for this run.
    Skipped,
    /// Enabled and not yet executed.
    Pending,
    /// The plan was empty.
    NothingToDo,
    /// Every planned deletion was carried out (or previewed).
    Completed,
    /// Refused to act because the plan could not be trusted.
    Aborted {
        /// Why the section was aborted.
        reason: String,
    },
    /// Acted, but something failed.
    Failed {
        /// What failed.
        reason: String,
    },
}

impl SectionStatus {
    const fn initial(enabled: bool) -> Self {
        if enabled { Self::Pending } else { Self::Skipped }
    }

    /// Returns `true` for `Aborted` and `Failed`.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Aborted { .. } | Self::Failed { .. })
    }
}

/// Counts and outcomes of a purge run.
///
/// `folders_removed` and `jobs_deleted` count what the plan removes, so a
/// dry run and a live run over the same scheduler answers report the same
/// numbers. Folders that could not be removed are counted separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Retention window in days.
    pub retention_days: u32,
    /// Job log folders found on disk.
    pub folders_found: usize,
    /// Job log folders (to be) removed.
    pub folders_removed: usize,
    /// Jobs (to be) deleted or archived.
    pub jobs_deleted: usize,
    /// Planned folders that could not be removed.
    pub folder_failures: usize,
    /// Log folder section outcome.
    pub log_purge: SectionStatus,
    /// Job record section outcome.
    pub job_purge: SectionStatus,
}

impl PurgeReport {
    /// Creates a report for a run with `config`.
    #[must_use]
    pub fn new(config: &PurgeConfig) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            dry_run: config.dry_run,
            retention_days: config.retention.age_threshold_days,
            folders_found: 0,
            folders_removed: 0,
            jobs_deleted: 0,
            folder_failures: 0,
            log_purge: SectionStatus::initial(config.delete_cmd_logs),
            job_purge: SectionStatus::initial(config.delete_jobs),
        }
    }

    /// Returns `true` if either section aborted or failed.
    #[must_use]
    pub const fn has_failures(&self) -> bool {
        self.log_purge.is_failure() || self.job_purge.is_failure()
    }

    /// Returns the (to be) removed/deleted counts as
    /// `(folders_found, folders_removed, jobs_deleted)`.
    #[must_use]
    pub const fn counts(&self) -> (usize, usize, usize) {
        (self.folders_found, self.folders_removed, self.jobs_deleted)
    }

    /// Logs the planned counts for each enabled section.
    pub fn log_counts(&self) {
        if self.log_purge != SectionStatus::Skipped {
            info!("Job log folders found: {}", self.folders_found);
            info!("Job log folders to be emptied: {}", self.folders_removed);
        }
        if self.job_purge != SectionStatus::Skipped {
            info!("Jobs to be deleted: {}", self.jobs_deleted);
        }
    }

    /// Marks the run finished.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Returns a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mode = if self.dry_run { "dry run" } else { "live" };
        let mut lines = vec![format!(
            "Tractor purge ({mode}, {} day retention)",
            self.retention_days
        )];

        match &self.log_purge {
            SectionStatus::Skipped => {},
            status => {
                lines.push(format!(
                    "  cmd-logs: {} found, {} to be emptied, {} failed [{}]",
                    self.folders_found,
                    self.folders_removed,
                    self.folder_failures,
                    describe(status)
                ));
            },
        }
        match &self.job_purge {
            SectionStatus::Skipped => {},
            status => {
                lines.push(format!(
                    "  jobs: {} to be deleted [{}]",
                    self.jobs_deleted,
                    describe(status)
                ));
            },
        }

        lines.join("\n")
    }
}

fn describe(status: &SectionStatus) -> String {
    match status {
        SectionStatus::Skipped => "skipped".to_string(),
        SectionStatus::Pending => "pending".to_string(),
        SectionStatus::NothingToDo => "nothing to do".to_string(),
        SectionStatus::Completed => "completed".to_string(),
        SectionStatus::Aborted { reason } => format!("aborted: {reason}"),
        SectionStatus::Failed { reason } => format!("failed: {reason}"),
    }
}
