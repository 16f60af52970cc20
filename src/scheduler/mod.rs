//! Scheduler client seam.
//!
//! Everything the purge engine needs from Tractor goes through
//! [`SchedulerClient`]: a read-only job id query and a single
//! delete/preview command, both driven by a [`JobPredicate`].
//!
//! | Implementation | Use |
//! |----------------|-----|
//! | [`TqClient`] | Shells out to the `tq` command-line client |
//! | [`InMemoryScheduler`] | In-process job table for tests and rehearsals |

mod memory;
mod tq;

pub use memory::{InMemoryScheduler, SchedulerCall};
pub use tq::{DEFAULT_QUERY_TIMEOUT, TqClient, parse_job_ids};

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique job identifier assigned by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    /// Creates a job id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

/// Scheduler-side state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// At least one command is running.
    Active,
    /// Queued and ready to dispatch.
    Ready,
    /// Waiting on dependencies.
    Blocked,
    /// Finished successfully.
    Done,
    /// Finished with errors.
    Error,
}

/// A job as the in-memory scheduler sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    /// Job id.
    pub id: JobId,
    /// Current state.
    pub state: JobState,
    /// Whole days elapsed since the job was spooled.
    pub spool_age_days: u32,
}

impl JobRecord {
    /// Creates a job record.
    #[must_use]
    pub const fn new(id: u64, state: JobState, spool_age_days: u32) -> Self {
        Self {
            id: JobId(id),
            state,
            spool_age_days,
        }
    }
}

/// Job selection predicate in the scheduler's query language.
///
/// The two shapes are maintained independently and are not assumed to be
/// complements: a blocked job older than the threshold matches both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPredicate {
    /// Jobs that must survive: active, ready, blocked, or spooled within
    /// the window.
    Retained {
        /// Retention window in days.
        days: u32,
    },
    /// Jobs eligible for purge: not active, not ready, spooled before the
    /// window.
    Aged {
        /// Retention window in days.
        days: u32,
    },
}

impl JobPredicate {
    /// Renders the predicate as a `tq` search expression.
    #[must_use]
    pub fn expression(&self) -> String {
        match self {
            Self::Retained { days } => {
                format!("active or ready or blocked or spooltime > -{days}d")
            },
            Self::Aged { days } => {
                format!("not active and not ready and spooltime < -{days}d")
            },
        }
    }

    /// Evaluates the predicate against a job record.
    ///
    /// `spooltime > -Nd` holds for jobs younger than N days and
    /// `spooltime < -Nd` for jobs older; a job exactly N days old matches
    /// neither age comparison.
    #[must_use]
    pub fn matches(&self, job: &JobRecord) -> bool {
        match *self {
            Self::Retained { days } => {
                matches!(
                    job.state,
                    JobState::Active | JobState::Ready | JobState::Blocked
                ) || job.spool_age_days < days
            },
            Self::Aged { days } => {
                !matches!(job.state, JobState::Active | JobState::Ready)
                    && job.spool_age_days > days
            },
        }
    }
}

impl fmt::Display for JobPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression())
    }
}

/// How [`SchedulerClient::execute`] treats the matched jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteMode {
    /// Delete the jobs (or archive them when the scheduler has DB archiving
    /// enabled).
    Delete,
    /// List the jobs without changing scheduler state.
    Preview,
}

impl ExecuteMode {
    /// Returns the mode as a lowercase string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Preview => "preview",
        }
    }
}

/// Result of a delete/preview invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutcome {
    /// Whether the command reported success.
    pub success: bool,
    /// Exit code, when the process exited normally.
    pub exit_code: Option<i32>,
    /// Output lines, verbatim.
    pub lines: Vec<String>,
}

/// Narrow interface to the job scheduler.
pub trait SchedulerClient {
    /// Returns the ids of every job matching `predicate`, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SchedulerQuery`] if the query channel cannot
    /// be read or produces an unparsable line.
    fn query(&self, predicate: &JobPredicate) -> Result<Vec<JobId>>;

    /// Runs one delete or preview command covering `predicate`.
    ///
    /// A command that ran but reported failure returns `Ok` with
    /// `success == false` so its output still reaches the run log.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SchedulerCommand`] if the command could not be
    /// run at all.
    fn execute(&self, mode: ExecuteMode, predicate: &JobPredicate) -> Result<CommandOutcome>;
}

impl<T: SchedulerClient + ?Sized> SchedulerClient for &T {
    fn query(&self, predicate: &JobPredicate) -> Result<Vec<JobId>> {
        (**self).query(predicate)
    }

    fn execute(&self, mode: ExecuteMode, predicate: &JobPredicate) -> Result<CommandOutcome> {
        (**self).execute(mode, predicate)
    }
}
