//! `tq` command-line client.
//!
//! Queries and deletions are one-shot child processes. Output is drained on
//! reader threads while the parent polls for exit against a deadline, so a
//! hung engine connection cannot stall the run forever. The same deadline
//! bounds collecting the output.

use super::{CommandOutcome, ExecuteMode, JobId, JobPredicate, SchedulerClient};
use crate::{Error, Result};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Default upper bound on a single `tq` invocation.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(300);

/// Interval between exit polls.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Scheduler client backed by the `tq` binary.
#[derive(Debug, Clone)]
pub struct TqClient {
    binary: PathBuf,
    timeout: Duration,
}

/// Captured output of a finished `tq` process.
struct ProcessOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl TqClient {
    /// Creates a client for the `tq` binary at `binary`.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Returns the path of the `tq` binary.
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Arguments for an id-only job listing.
    fn query_args(predicate: &JobPredicate) -> Vec<String> {
        vec![
            "jobs".to_string(),
            predicate.expression(),
            "--noheader".to_string(),
            "--archives".to_string(),
            "--cols".to_string(),
            "jid".to_string(),
            "--sortby".to_string(),
            "jid".to_string(),
            "--limit".to_string(),
            "0".to_string(),
        ]
    }

    /// Arguments for a delete or its read-only preview.
    fn execute_args(mode: ExecuteMode, predicate: &JobPredicate) -> Vec<String> {
        let mut args: Vec<String> = match mode {
            ExecuteMode::Delete => vec!["--force", "--yes", "delete"],
            ExecuteMode::Preview => vec!["jobs", "--archives"],
        }
        .into_iter()
        .map(str::to_string)
        .collect();
        args.push(predicate.expression());
        args.push("--limit".to_string());
        args.push("0".to_string());
        args
    }

    /// Runs `tq` with `args`, bounded by the configured timeout.
    fn run(&self, args: &[String]) -> std::result::Result<ProcessOutput, String> {
        debug!(binary = %self.binary.display(), ?args, "Running tq");

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("cannot start {}: {e}", self.binary.display()))?;

        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {},
                Err(e) => {
                    let _ = child.kill();
                    return Err(format!("cannot wait for tq: {e}"));
                },
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                warn!(timeout = ?self.timeout, "tq timed out and was killed");
                return Err(format!("tq did not finish within {:?}", self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        };

        // A background process started by tq can inherit the pipes and keep
        // them open after tq itself exits. Readers still blocked at the
        // deadline are abandoned.
        let readers_done = || {
            stdout.as_ref().is_none_or(JoinHandle::is_finished)
                && stderr.as_ref().is_none_or(JoinHandle::is_finished)
        };
        while !readers_done() {
            if Instant::now() >= deadline {
                warn!(timeout = ?self.timeout, "tq exited but its output is still held open");
                return Err(format!("tq output was not closed within {:?}", self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        }

        Ok(ProcessOutput {
            status,
            stdout: join_reader(stdout)?,
            stderr: join_reader(stderr)?,
        })
    }
}

impl SchedulerClient for TqClient {
    #[instrument(name = "tractor_purge.tq.query", skip(self), fields(predicate = %predicate))]
    fn query(&self, predicate: &JobPredicate) -> Result<Vec<JobId>> {
        let output = self
            .run(&Self::query_args(predicate))
            .map_err(Error::SchedulerQuery)?;

        if !output.status.success() {
            return Err(Error::SchedulerQuery(format!(
                "tq exited with {}: {}",
                output.status,
                output.stderr.lines().next().unwrap_or("no output")
            )));
        }

        parse_job_ids(&output.stdout)
    }

    #[instrument(
        name = "tractor_purge.tq.execute",
        skip(self),
        fields(mode = mode.as_str(), predicate = %predicate)
    )]
    fn execute(&self, mode: ExecuteMode, predicate: &JobPredicate) -> Result<CommandOutcome> {
        let output = self
            .run(&Self::execute_args(mode, predicate))
            .map_err(Error::SchedulerCommand)?;

        let lines = output
            .stdout
            .lines()
            .chain(output.stderr.lines())
            .map(|line| line.trim_end().to_string())
            .collect();

        Ok(CommandOutcome {
            success: output.status.success(),
            exit_code: output.status.code(),
            lines,
        })
    }
}

/// Parses `tq --cols jid --noheader` output: one job id per line.
///
/// Blank lines are ignored. The result is ascending and free of duplicates.
///
/// # Errors
///
/// Returns [`Error::SchedulerQuery`] naming the first line that is not a job
/// id.
pub fn parse_job_ids(output: &str) -> Result<Vec<JobId>> {
    let mut ids = Vec::new();
    for (index, line) in output.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let id = line.parse::<JobId>().map_err(|_| {
            Error::SchedulerQuery(format!("unparsable line {}: {line:?}", index + 1))
        })?;
        ids.push(id);
    }
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn join_reader(
    handle: Option<JoinHandle<io::Result<Vec<u8>>>>,
) -> std::result::Result<String, String> {
    let Some(handle) = handle else {
        return Ok(String::new());
    };
    let bytes = handle
        .join()
        .map_err(|_| "tq output reader panicked".to_string())?
        .map_err(|e| format!("cannot read tq output: {e}"))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
