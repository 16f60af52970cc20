//! In-memory scheduler for testing.
//!
//! Holds a job table, evaluates [`JobPredicate`]s against it the way the
//! engine would, and records every call so tests can assert on how often
//! the scheduler was asked to mutate state.

use super::{CommandOutcome, ExecuteMode, JobId, JobPredicate, JobRecord, SchedulerClient};
use crate::{Error, Result};
use std::sync::RwLock;

/// A call received by [`InMemoryScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCall {
    /// A [`SchedulerClient::query`] call.
    Query(JobPredicate),
    /// A [`SchedulerClient::execute`] call.
    Execute(ExecuteMode, JobPredicate),
}

/// In-memory scheduler backed by a job table.
///
/// Uses `RwLock` so it can be shared by reference while still recording
/// calls. Deleted jobs are removed from the table.
#[derive(Debug, Default)]
pub struct InMemoryScheduler {
    jobs: RwLock<Vec<JobRecord>>,
    calls: RwLock<Vec<SchedulerCall>>,
    fail_queries: Vec<JobPredicate>,
    fail_execute: bool,
}

impl InMemoryScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scheduler holding `jobs`.
    #[must_use]
    pub fn with_jobs(jobs: impl IntoIterator<Item = JobRecord>) -> Self {
        Self {
            jobs: RwLock::new(jobs.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Makes queries for `predicate` fail as if `tq` printed garbage.
    #[must_use]
    pub fn failing_query(mut self, predicate: JobPredicate) -> Self {
        self.fail_queries.push(predicate);
        self
    }

    /// Makes every execute call report a failed command.
    #[must_use]
    pub const fn failing_execute(mut self) -> Self {
        self.fail_execute = true;
        self
    }

    /// Returns the ids currently in the job table, ascending.
    #[must_use]
    pub fn job_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .jobs
            .read()
            .map(|jobs| jobs.iter().map(|job| job.id).collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Returns every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<SchedulerCall> {
        self.calls.read().map(|c| c.clone()).unwrap_or_default()
    }

    /// Returns how many execute calls used `mode`.
    #[must_use]
    pub fn execute_count(&self, mode: ExecuteMode) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, SchedulerCall::Execute(m, _) if *m == mode))
            .count()
    }

    fn record(&self, call: SchedulerCall) {
        if let Ok(mut calls) = self.calls.write() {
            calls.push(call);
        }
    }

    fn matching(&self, predicate: &JobPredicate) -> Result<Vec<JobId>> {
        let jobs = self.jobs.read().map_err(|e| Error::OperationFailed {
            operation: "read_job_table".to_string(),
            cause: e.to_string(),
        })?;
        let mut ids: Vec<JobId> = jobs
            .iter()
            .filter(|job| predicate.matches(job))
            .map(|job| job.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

impl SchedulerClient for InMemoryScheduler {
    fn query(&self, predicate: &JobPredicate) -> Result<Vec<JobId>> {
        self.record(SchedulerCall::Query(*predicate));

        if self.fail_queries.contains(predicate) {
            return Err(Error::SchedulerQuery(
                "unparsable line 1: \"tq: engine unreachable\"".to_string(),
            ));
        }

        self.matching(predicate)
    }

    fn execute(&self, mode: ExecuteMode, predicate: &JobPredicate) -> Result<CommandOutcome> {
        self.record(SchedulerCall::Execute(mode, *predicate));

        if self.fail_execute {
            return Ok(CommandOutcome {
                success: false,
                exit_code: Some(1),
                lines: vec!["tq: permission denied".to_string()],
            });
        }

        let matched = self.matching(predicate)?;
        let lines = matched
            .iter()
            .map(|id| match mode {
                ExecuteMode::Delete => format!("deleted job {id}"),
                ExecuteMode::Preview => format!("job {id}"),
            })
            .collect();

        if mode == ExecuteMode::Delete {
            let mut jobs = self.jobs.write().map_err(|e| Error::OperationFailed {
                operation: "write_job_table".to_string(),
                cause: e.to_string(),
            })?;
            jobs.retain(|job| !predicate.matches(job));
        }

        Ok(CommandOutcome {
            success: true,
            exit_code: Some(0),
            lines,
        })
    }
}
