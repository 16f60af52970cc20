//! Deletion planning.
//!
//! A plan is a pure function of the scheduler's answers and the on-disk
//! inventory. A log folder is planned for deletion if and only if its job
//! id is absent from the retained set; the job plan is the aged set itself.

use crate::inventory::JobFolder;
use crate::retention::{JobSet, QueryOutcome, RetentionPolicy};
use crate::scheduler::{JobId, JobPredicate};
use crate::{Error, Result};
use serde::Serialize;
use tracing::{debug, warn};

/// Job records to delete, with the predicate that selects them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobPlan {
    /// Aged job ids, ascending.
    pub job_ids: Vec<JobId>,
    /// Predicate handed to the scheduler. The executor deletes by
    /// predicate, not by id list.
    pub predicate: JobPredicate,
}

impl JobPlan {
    /// Number of jobs covered.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.job_ids.len()
    }

    /// Returns `true` if no jobs are covered.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.job_ids.is_empty()
    }
}

/// Everything a run intends to delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionPlan {
    /// Log folders to remove, in inventory order.
    pub folders: Vec<JobFolder>,
    /// Job records to delete, if job purge is enabled.
    pub jobs: Option<JobPlan>,
}

/// Returns the folders whose job is not retained, in input order.
pub fn reconcile(folders: &[JobFolder], retained: &JobSet) -> Vec<JobFolder> {
    folders
        .iter()
        .filter(|folder| !retained.contains(folder.job_id))
        .cloned()
        .collect()
}

/// Plans the log folder purge.
///
/// An empty but complete retained set is planned like any other; guarding
/// against it is the caller's job.
///
/// # Errors
///
/// Returns [`Error::PlanRefused`] if the retained query failed.
pub fn plan_log_purge(retained: &QueryOutcome, folders: &[JobFolder]) -> Result<Vec<JobFolder>> {
    let set = match retained {
        QueryOutcome::Complete(set) => set,
        QueryOutcome::Failed { reason } => {
            return Err(Error::PlanRefused(format!(
                "retained job query failed: {reason}"
            )));
        },
    };

    let plan = reconcile(folders, set);
    for folder in &plan {
        debug!(path = %folder.path.display(), job_id = %folder.job_id, "Added log folder for deletion");
    }
    Ok(plan)
}

/// Plans the job record purge.
///
/// # Errors
///
/// Returns [`Error::PlanRefused`] if the aged query failed.
pub fn plan_job_purge(aged: &QueryOutcome, policy: RetentionPolicy) -> Result<JobPlan> {
    match aged {
        QueryOutcome::Complete(set) => Ok(JobPlan {
            job_ids: set.as_slice().to_vec(),
            predicate: JobPredicate::Aged {
                days: policy.age_threshold_days,
            },
        }),
        QueryOutcome::Failed { reason } => Err(Error::PlanRefused(format!(
            "aged job query failed: {reason}"
        ))),
    }
}

/// Counts jobs reported as both retained and aged.
///
/// The two predicates are maintained separately; blocked jobs past the
/// window match both. A non-zero overlap is logged so operators can see
/// which jobs keep their logs but lose their records.
pub fn overlap(retained: &JobSet, aged: &JobSet) -> Vec<JobId> {
    let both: Vec<JobId> = aged.iter().filter(|id| retained.contains(*id)).collect();
    if !both.is_empty() {
        warn!(
            count = both.len(),
            jobs = ?both,
            "Jobs reported as both retained and aged; their logs are kept"
        );
    }
    both
}
