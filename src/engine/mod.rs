//! Purge run orchestration.
//!
//! A run is a single pass:
//!
//! ```text
//! Init -> Warn/Countdown -> Query -> (LogPurge | JobPurge | Both) -> Report -> Done
//! ```
//!
//! Only the countdown can be cancelled. Once it has elapsed, deletions run
//! to the end; there is no retry and no resumable state.
//!
//! The log purge is guarded: if the retained-jobs query failed, or came back
//! empty, no folder is deleted. An empty retained set would otherwise mark
//! every folder on disk for deletion.

mod countdown;
mod report;

pub use countdown::{CancelToken, banner};
pub use report::{PurgeReport, SectionStatus};

use crate::config::PurgeConfig;
use crate::inventory::{FolderInventory, JobFolder};
use crate::purge::PurgeExecutor;
use crate::reconcile::{DeletionPlan, JobPlan, overlap, plan_job_purge, plan_log_purge};
use crate::retention::{QueryMode, QueryOutcome, RetentionQuery};
use crate::scheduler::SchedulerClient;
use crate::Result;
use tracing::{error, info, instrument, warn};

/// One purge run over a scheduler and a cmd-logs tree.
pub struct PurgeRun<'a, C: SchedulerClient + ?Sized> {
    config: &'a PurgeConfig,
    client: &'a C,
}

impl<'a, C: SchedulerClient + ?Sized> PurgeRun<'a, C> {
    /// Creates a run. `config` must already be validated.
    #[must_use]
    pub const fn new(config: &'a PurgeConfig, client: &'a C) -> Self {
        Self { config, client }
    }

    /// Runs the full pass: countdown, queries, deletions, report.
    ///
    /// Query and deletion failures are recorded in the report rather than
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Cancelled`] if `cancel` fires during the
    /// countdown. Nothing has been queried or deleted at that point.
    #[instrument(
        name = "tractor_purge.run",
        skip_all,
        fields(
            dry_run = self.config.dry_run,
            days = self.config.retention.age_threshold_days,
            delete_cmd_logs = self.config.delete_cmd_logs,
            delete_jobs = self.config.delete_jobs
        )
    )]
    pub fn run(&self, cancel: &CancelToken) -> Result<PurgeReport> {
        let mut report = PurgeReport::new(self.config);

        warn!("{}", banner(self.config));
        if let Err(e) = countdown::wait(self.config.countdown, cancel) {
            warn!("Aborted by operator before any action was taken");
            return Err(e);
        }

        info!("Tractor purge initiated.");
        let plan = self.prepare(&mut report);
        report.log_counts();

        if cancel.is_cancelled() {
            warn!("Interrupt received after the countdown; deletions cannot be cancelled");
        }
        self.execute(&plan, &mut report);

        report.finish();
        info!("{}", report.summary());
        info!("Tractor purge done.");
        Ok(report)
    }

    /// Queries the scheduler, scans the cmd-logs tree and builds the plan.
    ///
    /// Read-only. Sections that cannot be planned are marked aborted or
    /// failed in `report` and contribute nothing to the plan.
    pub fn prepare(&self, report: &mut PurgeReport) -> DeletionPlan {
        let query = RetentionQuery::new(self.client, self.config.retention);
        let retained = self
            .config
            .delete_cmd_logs
            .then(|| query.run(QueryMode::RetainedJobs));
        let aged = self
            .config
            .delete_jobs
            .then(|| query.run(QueryMode::AgedJobs));

        if let (Some(retained), Some(aged)) = (
            retained.as_ref().and_then(QueryOutcome::job_set),
            aged.as_ref().and_then(QueryOutcome::job_set),
        ) {
            overlap(retained, aged);
        }

        let folders = retained
            .as_ref()
            .map(|retained| self.prepare_log_purge(retained, report))
            .unwrap_or_default();
        let jobs = aged
            .as_ref()
            .and_then(|aged| self.prepare_job_purge(aged, report));

        DeletionPlan { folders, jobs }
    }

    fn prepare_log_purge(&self, retained: &QueryOutcome, report: &mut PurgeReport) -> Vec<JobFolder> {
        let scan = match FolderInventory::new(&self.config.cmd_logs_dir).scan() {
            Ok(scan) => scan,
            Err(e) => {
                error!(error = %e, "Cannot take log folder inventory; no log folders will be deleted");
                report.log_purge = SectionStatus::Failed {
                    reason: e.to_string(),
                };
                return Vec::new();
            },
        };
        report.folders_found = scan.folders.len();

        match retained {
            QueryOutcome::Failed { reason } => {
                error!(
                    reason = %reason,
                    "Could not determine which jobs to retain; refusing to delete any log folders"
                );
                report.log_purge = SectionStatus::Aborted {
                    reason: format!("retained job query failed: {reason}"),
                };
                return Vec::new();
            },
            QueryOutcome::Complete(set) if set.is_empty() => {
                error!(
                    folders = scan.folders.len(),
                    "Scheduler reported no retained jobs; refusing to delete every log folder"
                );
                report.log_purge = SectionStatus::Aborted {
                    reason: "scheduler reported no retained jobs".to_string(),
                };
                return Vec::new();
            },
            QueryOutcome::Complete(_) => {},
        }

        match plan_log_purge(retained, &scan.folders) {
            Ok(plan) => {
                report.folders_removed = plan.len();
                plan
            },
            Err(e) => {
                error!(error = %e, "Refusing to delete log folders");
                report.log_purge = SectionStatus::Aborted {
                    reason: e.to_string(),
                };
                Vec::new()
            },
        }
    }

    fn prepare_job_purge(&self, aged: &QueryOutcome, report: &mut PurgeReport) -> Option<JobPlan> {
        match plan_job_purge(aged, self.config.retention) {
            Ok(plan) => {
                report.jobs_deleted = plan.len();
                Some(plan)
            },
            Err(e) => {
                error!(error = %e, "Could not determine which jobs are aged; no jobs will be deleted");
                report.job_purge = SectionStatus::Aborted {
                    reason: e.to_string(),
                };
                None
            },
        }
    }

    /// Applies the plan to every section still pending.
    fn execute(&self, plan: &DeletionPlan, report: &mut PurgeReport) {
        let executor = PurgeExecutor::new(self.client, self.config.dry_run);

        if report.log_purge == SectionStatus::Pending {
            report.log_purge = if plan.folders.is_empty() {
                info!("No logs to delete.");
                SectionStatus::NothingToDo
            } else {
                let outcome = executor.remove_folders(&plan.folders);
                report.folder_failures = outcome.failures.len();
                if outcome.failures.is_empty() {
                    SectionStatus::Completed
                } else {
                    SectionStatus::Failed {
                        reason: format!(
                            "{} of {} log folders could not be deleted",
                            outcome.failures.len(),
                            outcome.planned
                        ),
                    }
                }
            };
        }

        if report.job_purge == SectionStatus::Pending {
            report.job_purge = match &plan.jobs {
                Some(jobs) if !jobs.is_empty() => {
                    let outcome = executor.purge_jobs(jobs);
                    match outcome.error {
                        None => SectionStatus::Completed,
                        Some(reason) => SectionStatus::Failed { reason },
                    }
                },
                _ => {
                    info!("No jobs to delete.");
                    SectionStatus::NothingToDo
                },
            };
        }
    }
}
