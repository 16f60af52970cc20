//! Purge execution.
//!
//! Applies a deletion plan. Folder deletions are independent of each other:
//! one failure is logged and the rest proceed. Job records are deleted with
//! a single scheduler command over the aged predicate. In dry-run mode no
//! folder is touched and the scheduler only receives a read-only preview.

use crate::inventory::JobFolder;
use crate::reconcile::JobPlan;
use crate::scheduler::{ExecuteMode, SchedulerClient};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, instrument};

/// A folder that could not be removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderFailure {
    /// Folder path.
    pub path: PathBuf,
    /// Error message.
    pub error: String,
}

/// Result of removing the planned log folders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FolderPurgeOutcome {
    /// Folders in the plan.
    pub planned: usize,
    /// Folders actually removed. Always zero in dry-run mode.
    pub removed: usize,
    /// Folders that could not be removed.
    pub failures: Vec<FolderFailure>,
}

/// Result of the job record purge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobPurgeOutcome {
    /// Jobs in the plan.
    pub planned: usize,
    /// Command that was issued.
    pub mode: ExecuteMode,
    /// Whether the scheduler reported success.
    pub succeeded: bool,
    /// Failure description, if any.
    pub error: Option<String>,
}

/// Applies deletion plans.
pub struct PurgeExecutor<'a, C: SchedulerClient + ?Sized> {
    client: &'a C,
    dry_run: bool,
}

impl<'a, C: SchedulerClient + ?Sized> PurgeExecutor<'a, C> {
    /// Creates an executor.
    #[must_use]
    pub const fn new(client: &'a C, dry_run: bool) -> Self {
        Self { client, dry_run }
    }

    /// Returns `true` if this executor only previews.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Removes each planned folder and its contents.
    #[instrument(
        name = "tractor_purge.purge.folders",
        skip(self, folders),
        fields(planned = folders.len(), dry_run = self.dry_run)
    )]
    pub fn remove_folders(&self, folders: &[JobFolder]) -> FolderPurgeOutcome {
        let mut outcome = FolderPurgeOutcome {
            planned: folders.len(),
            ..FolderPurgeOutcome::default()
        };

        for folder in folders {
            if self.dry_run {
                info!(path = %folder.path.display(), job_id = %folder.job_id, "Dry run: (not) deleting");
                continue;
            }

            info!(path = %folder.path.display(), job_id = %folder.job_id, "Deleting");
            match fs::remove_dir_all(&folder.path) {
                Ok(()) => {
                    outcome.removed += 1;
                    metrics::counter!("purge_folders_removed_total").increment(1);
                },
                Err(e) => {
                    metrics::counter!("purge_folder_failures_total").increment(1);
                    error!(
                        path = %folder.path.display(),
                        error = %e,
                        "Failed to delete log folder, continuing"
                    );
                    outcome.failures.push(FolderFailure {
                        path: folder.path.clone(),
                        error: e.to_string(),
                    });
                },
            }
        }

        outcome
    }

    /// Deletes (or previews) the planned job records with one scheduler
    /// command.
    #[instrument(
        name = "tractor_purge.purge.jobs",
        skip(self, plan),
        fields(planned = plan.len(), dry_run = self.dry_run)
    )]
    pub fn purge_jobs(&self, plan: &JobPlan) -> JobPurgeOutcome {
        let mode = if self.dry_run {
            info!(predicate = %plan.predicate, "Executing tq command to (not) delete jobs");
            ExecuteMode::Preview
        } else {
            info!(predicate = %plan.predicate, "Executing tq command to delete jobs");
            ExecuteMode::Delete
        };
        metrics::counter!("purge_job_commands_total", "mode" => mode.as_str()).increment(1);

        let mut outcome = JobPurgeOutcome {
            planned: plan.len(),
            mode,
            succeeded: false,
            error: None,
        };

        match self.client.execute(mode, &plan.predicate) {
            Ok(result) => {
                for line in &result.lines {
                    info!("{line}");
                }
                if result.success {
                    outcome.succeeded = true;
                } else {
                    let message = result.exit_code.map_or_else(
                        || "tq was terminated by a signal".to_string(),
                        |code| format!("tq exited with status {code}"),
                    );
                    error!(mode = mode.as_str(), "{message}; investigate and re-run");
                    outcome.error = Some(message);
                }
            },
            Err(e) => {
                error!(mode = mode.as_str(), error = %e, "Job purge command failed; investigate and re-run");
                outcome.error = Some(e.to_string());
            },
        }

        outcome
    }
}
