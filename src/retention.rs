//! Retention queries.
//!
//! Asks the scheduler which jobs fall inside or outside the retention
//! window. The result is tagged: a query that could not be read is
//! [`QueryOutcome::Failed`], never an empty set, so callers cannot confuse
//! "nothing retained" with "could not tell what is retained".
//!
//! # Example
//!
//! ```rust,ignore
//! use tractor_purge::retention::{QueryMode, RetentionPolicy, RetentionQuery};
//!
//! let query = RetentionQuery::new(&client, RetentionPolicy::new(30));
//! match query.run(QueryMode::RetainedJobs) {
//!     QueryOutcome::Complete(jobs) => println!("{} jobs retained", jobs.len()),
//!     QueryOutcome::Failed { reason } => eprintln!("query failed: {reason}"),
//! }
//! ```

use crate::scheduler::{JobId, JobPredicate, SchedulerClient};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// Default retention window in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Retention policy for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetentionPolicy {
    /// Jobs spooled more than this many days ago are eligible for purge.
    pub age_threshold_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_DAYS)
    }
}

impl RetentionPolicy {
    /// Creates a policy with the given threshold.
    #[must_use]
    pub const fn new(age_threshold_days: u32) -> Self {
        Self { age_threshold_days }
    }

    /// Returns the scheduler predicate for a query mode.
    #[must_use]
    pub const fn predicate(&self, mode: QueryMode) -> JobPredicate {
        let days = self.age_threshold_days;
        match mode {
            QueryMode::RetainedJobs => JobPredicate::Retained { days },
            QueryMode::AgedJobs => JobPredicate::Aged { days },
        }
    }
}

/// Which side of the retention window to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Jobs that must survive the run.
    RetainedJobs,
    /// Jobs eligible for purge.
    AgedJobs,
}

impl QueryMode {
    /// Returns the mode as a lowercase string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RetainedJobs => "retained",
            Self::AgedJobs => "aged",
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ascending, de-duplicated set of job ids with constant-time lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSet {
    ids: Vec<JobId>,
    index: HashSet<JobId>,
}

impl JobSet {
    /// Builds a set from any id sequence.
    pub fn new(ids: impl IntoIterator<Item = JobId>) -> Self {
        let mut ids: Vec<JobId> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        let index = ids.iter().copied().collect();
        Self { ids, index }
    }

    /// Returns `true` if `id` is in the set.
    #[must_use]
    pub fn contains(&self, id: JobId) -> bool {
        self.index.contains(&id)
    }

    /// Number of ids.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if the set is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in ascending order.
    #[must_use]
    pub fn as_slice(&self) -> &[JobId] {
        &self.ids
    }

    /// Iterates ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = JobId> + '_ {
        self.ids.iter().copied()
    }
}

impl FromIterator<JobId> for JobSet {
    fn from_iter<T: IntoIterator<Item = JobId>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// Tagged result of a retention query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// The scheduler answered; the set is authoritative.
    Complete(JobSet),
    /// The answer could not be read. Nothing may be inferred from it.
    Failed {
        /// Why the query failed.
        reason: String,
    },
}

impl QueryOutcome {
    /// Returns the job set if the query completed.
    #[must_use]
    pub const fn job_set(&self) -> Option<&JobSet> {
        match self {
            Self::Complete(set) => Some(set),
            Self::Failed { .. } => None,
        }
    }

    /// Returns `true` if the query failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Runs retention queries against a scheduler.
pub struct RetentionQuery<'a, C: SchedulerClient + ?Sized> {
    client: &'a C,
    policy: RetentionPolicy,
}

impl<'a, C: SchedulerClient + ?Sized> RetentionQuery<'a, C> {
    /// Creates a query runner.
    #[must_use]
    pub const fn new(client: &'a C, policy: RetentionPolicy) -> Self {
        Self { client, policy }
    }

    /// Returns the policy in use.
    #[must_use]
    pub const fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Queries one side of the retention window.
    ///
    /// Failures are downgraded to [`QueryOutcome::Failed`] with a warning;
    /// the caller decides whether the run can continue.
    #[instrument(
        name = "tractor_purge.retention.query",
        skip(self),
        fields(mode = mode.as_str(), days = self.policy.age_threshold_days)
    )]
    pub fn run(&self, mode: QueryMode) -> QueryOutcome {
        let predicate = self.policy.predicate(mode);
        debug!(predicate = %predicate, "Querying scheduler");

        match self.client.query(&predicate) {
            Ok(ids) => {
                let set = JobSet::new(ids);
                for id in set.iter() {
                    debug!(job_id = %id, mode = mode.as_str(), "Found job");
                }
                info!(count = set.len(), mode = mode.as_str(), "Scheduler query complete");
                QueryOutcome::Complete(set)
            },
            Err(e) => {
                metrics::counter!("purge_query_failures_total", "mode" => mode.as_str())
                    .increment(1);
                warn!(
                    mode = mode.as_str(),
                    error = %e,
                    "Failed to read scheduler query output"
                );
                QueryOutcome::Failed {
                    reason: e.to_string(),
                }
            },
        }
    }
}
