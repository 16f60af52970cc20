//! End-to-end purge runs against an in-memory scheduler and a real
//! cmd-logs tree on disk.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tractor_purge::config::PurgeConfig;
use tractor_purge::engine::{CancelToken, PurgeReport, PurgeRun, SectionStatus};
use tractor_purge::observability::{BufferWriter, LoggingConfig, build_dispatch_with_writer};
use tractor_purge::scheduler::{
    ExecuteMode, InMemoryScheduler, JobId, JobPredicate, JobRecord, JobState, SchedulerCall,
};

/// Creates `<root>/<bucket>/J<id>/cmd.log` for each entry.
fn build_tree(root: &Path, folders: &[(&str, u64)]) {
    for (bucket, id) in folders {
        let dir = root.join(bucket).join(format!("J{id}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("cmd.log"), format!("job {id} output")).unwrap();
    }
}

/// Sorted list of every path under `root`.
fn snapshot(root: &Path) -> Vec<String> {
    let mut paths = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            paths.push(path.strip_prefix(root).unwrap().display().to_string());
        }
    }
    paths.sort();
    paths
}

fn farm() -> InMemoryScheduler {
    InMemoryScheduler::with_jobs([
        JobRecord::new(5, JobState::Active, 120),
        JobRecord::new(7, JobState::Done, 45),
        JobRecord::new(9, JobState::Done, 4),
        JobRecord::new(12, JobState::Error, 60),
    ])
}

fn base_config(root: &Path) -> PurgeConfig {
    PurgeConfig::new()
        .with_cmd_logs_dir(root)
        .with_countdown(Duration::ZERO)
        .with_days(30)
}

fn run(config: &PurgeConfig, scheduler: &InMemoryScheduler) -> PurgeReport {
    PurgeRun::new(config, scheduler)
        .run(&CancelToken::new())
        .expect("run should complete")
}

#[test]
fn test_retained_five_and_nine_removes_seven_and_twelve() {
    let dir = TempDir::new().unwrap();
    build_tree(dir.path(), &[("alice", 5), ("alice", 7), ("bob", 9), ("bob", 12)]);
    let scheduler = farm();
    let config = base_config(dir.path()).with_delete_cmd_logs(true);

    let report = run(&config, &scheduler);

    assert_eq!(report.folders_found, 4);
    assert_eq!(report.folders_removed, 2);
    assert_eq!(report.folder_failures, 0);
    assert_eq!(
        snapshot(dir.path()),
        vec!["alice", "alice/J5", "alice/J5/cmd.log", "bob", "bob/J9", "bob/J9/cmd.log"]
    );
}

#[test]
fn test_second_log_purge_has_empty_plan() {
    let dir = TempDir::new().unwrap();
    build_tree(dir.path(), &[("alice", 5), ("alice", 7), ("bob", 9), ("bob", 12)]);
    let scheduler = farm();
    let config = base_config(dir.path()).with_delete_cmd_logs(true);

    let first = run(&config, &scheduler);
    let second = run(&config, &scheduler);

    assert_eq!(first.folders_removed, 2);
    assert_eq!(second.folders_found, 2);
    assert_eq!(second.folders_removed, 0);
    assert_eq!(second.log_purge, SectionStatus::NothingToDo);
}

#[test]
fn test_dry_run_matches_live_counts_without_mutation() {
    let layout = [("alice", 5), ("alice", 7), ("bob", 9), ("bob", 12), ("bob", 40)];
    let dry_dir = TempDir::new().unwrap();
    let live_dir = TempDir::new().unwrap();
    build_tree(dry_dir.path(), &layout);
    build_tree(live_dir.path(), &layout);
    let dry_scheduler = farm();
    let live_scheduler = farm();

    let before = snapshot(dry_dir.path());
    let dry = run(
        &base_config(dry_dir.path())
            .with_delete_cmd_logs(true)
            .with_delete_jobs(true)
            .with_dry_run(true),
        &dry_scheduler,
    );
    let live = run(
        &base_config(live_dir.path())
            .with_delete_cmd_logs(true)
            .with_delete_jobs(true),
        &live_scheduler,
    );

    assert_eq!(dry.counts(), live.counts());
    assert_eq!(dry.counts(), (5, 3, 2));
    assert_eq!(snapshot(dry_dir.path()), before);
    assert_eq!(dry_scheduler.execute_count(ExecuteMode::Delete), 0);
    assert_eq!(dry_scheduler.execute_count(ExecuteMode::Preview), 1);
    assert_eq!(dry_scheduler.job_ids().len(), 4);
    assert_eq!(live_scheduler.execute_count(ExecuteMode::Delete), 1);
    assert_ne!(snapshot(live_dir.path()), before);
}

#[test]
fn test_query_failure_aborts_log_deletion_loudly() {
    let dir = TempDir::new().unwrap();
    build_tree(dir.path(), &[("alice", 5), ("alice", 7)]);
    let scheduler = farm().failing_query(JobPredicate::Retained { days: 30 });
    let config = base_config(dir.path()).with_delete_cmd_logs(true);
    let before = snapshot(dir.path());

    let writer = BufferWriter::new();
    let dispatch = build_dispatch_with_writer(&LoggingConfig::default(), writer.clone()).unwrap();
    let report = tracing::dispatcher::with_default(&dispatch, || run(&config, &scheduler));

    assert!(matches!(report.log_purge, SectionStatus::Aborted { .. }));
    assert!(report.has_failures());
    assert_eq!(snapshot(dir.path()), before);

    let logs = writer.contents();
    assert!(logs.contains("WARN"), "query failure should be warned: {logs}");
    assert!(
        logs.lines()
            .any(|l| l.contains("ERROR") && l.contains("refusing to delete any log folders")),
        "abort should be logged at error level: {logs}"
    );
}

#[test]
fn test_aged_jobs_deleted_with_one_predicate_command() {
    let dir = TempDir::new().unwrap();
    let scheduler = InMemoryScheduler::with_jobs([
        JobRecord::new(101, JobState::Done, 31),
        JobRecord::new(102, JobState::Error, 200),
        JobRecord::new(103, JobState::Done, 90),
        JobRecord::new(104, JobState::Ready, 90),
        JobRecord::new(105, JobState::Done, 10),
    ]);
    let config = base_config(dir.path()).with_delete_jobs(true);

    let report = run(&config, &scheduler);

    assert_eq!(report.jobs_deleted, 3);
    let executes: Vec<SchedulerCall> = scheduler
        .calls()
        .into_iter()
        .filter(|c| matches!(c, SchedulerCall::Execute(..)))
        .collect();
    assert_eq!(
        executes,
        vec![SchedulerCall::Execute(
            ExecuteMode::Delete,
            JobPredicate::Aged { days: 30 }
        )]
    );
    assert_eq!(scheduler.job_ids(), vec![JobId::new(104), JobId::new(105)]);
}

#[test]
fn test_blocked_aged_job_keeps_logs_but_loses_record() {
    let dir = TempDir::new().unwrap();
    build_tree(dir.path(), &[("alice", 1), ("alice", 2), ("alice", 3)]);
    let scheduler = InMemoryScheduler::with_jobs([
        JobRecord::new(1, JobState::Blocked, 90),
        JobRecord::new(2, JobState::Done, 90),
        JobRecord::new(3, JobState::Active, 1),
    ]);
    let config = base_config(dir.path())
        .with_delete_cmd_logs(true)
        .with_delete_jobs(true);

    let writer = BufferWriter::new();
    let dispatch = build_dispatch_with_writer(&LoggingConfig::default(), writer.clone()).unwrap();
    let report = tracing::dispatcher::with_default(&dispatch, || run(&config, &scheduler));

    assert_eq!(report.counts(), (3, 1, 2));
    assert!(dir.path().join("alice/J1").exists());
    assert!(!dir.path().join("alice/J2").exists());
    assert_eq!(scheduler.job_ids(), vec![JobId::new(3)]);
    assert!(writer.contents().contains("both retained and aged"));
}

#[test]
fn test_non_job_entries_are_left_alone() {
    let dir = TempDir::new().unwrap();
    build_tree(dir.path(), &[("alice", 5), ("alice", 7)]);
    fs::create_dir_all(dir.path().join("alice/archive")).unwrap();
    fs::create_dir_all(dir.path().join("alice/J7.bak")).unwrap();
    fs::write(dir.path().join("README"), "cmd logs").unwrap();
    let scheduler = farm();
    let config = base_config(dir.path()).with_delete_cmd_logs(true);

    let report = run(&config, &scheduler);

    assert_eq!(report.counts(), (2, 1, 0));
    assert!(dir.path().join("alice/archive").exists());
    assert!(dir.path().join("alice/J7.bak").exists());
    assert!(dir.path().join("README").exists());
}

#[cfg(unix)]
mod tq_binary {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tractor_purge::scheduler::TqClient;

    /// Writes a stand-in `tq` that answers the two queries and records
    /// every invocation.
    fn fake_tq(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let calls = dir.join("calls.txt");
        let script = format!(
            r#"#!/bin/sh
echo "$@" >> "{calls}"
case "$1" in
  jobs)
    if [ "$3" = "--noheader" ]; then
      case "$2" in
        active*) printf '5\n9\n' ;;
        *) printf '7\n12\n' ;;
      esac
    else
      echo "jid 7 done"
      echo "jid 12 error"
    fi
    ;;
  --force) echo "deleted 2 jobs" ;;
esac
"#,
            calls = calls.display()
        );
        let tq = dir.join("tq");
        fs::write(&tq, script).unwrap();
        fs::set_permissions(&tq, fs::Permissions::from_mode(0o755)).unwrap();
        (tq, calls)
    }

    #[test]
    fn test_dry_run_through_tq_issues_no_delete() {
        let bin = TempDir::new().unwrap();
        let logs = TempDir::new().unwrap();
        build_tree(logs.path(), &[("alice", 5), ("alice", 7), ("bob", 9), ("bob", 12)]);
        let (tq, calls) = fake_tq(bin.path());
        let config = base_config(logs.path())
            .with_tq(&tq)
            .with_delete_cmd_logs(true)
            .with_delete_jobs(true)
            .with_dry_run(true);
        config.validate().unwrap();
        let before = snapshot(logs.path());

        let client = TqClient::new(&tq, Duration::from_secs(30));
        let report = PurgeRun::new(&config, &client)
            .run(&CancelToken::new())
            .unwrap();

        assert_eq!(report.counts(), (4, 2, 2));
        assert_eq!(snapshot(logs.path()), before);
        let calls = fs::read_to_string(calls).unwrap();
        assert_eq!(calls.lines().count(), 3);
        assert!(!calls.contains("delete"));
    }

    #[test]
    fn test_live_run_through_tq() {
        let bin = TempDir::new().unwrap();
        let logs = TempDir::new().unwrap();
        build_tree(logs.path(), &[("alice", 5), ("alice", 7), ("bob", 9), ("bob", 12)]);
        let (tq, calls) = fake_tq(bin.path());
        let config = base_config(logs.path())
            .with_tq(&tq)
            .with_delete_cmd_logs(true)
            .with_delete_jobs(true);

        let client = TqClient::new(&tq, Duration::from_secs(30));
        let report = PurgeRun::new(&config, &client)
            .run(&CancelToken::new())
            .unwrap();

        assert_eq!(report.counts(), (4, 2, 2));
        assert!(!report.has_failures());
        assert!(logs.path().join("alice/J5").exists());
        assert!(!logs.path().join("bob/J12").exists());
        let calls = fs::read_to_string(calls).unwrap();
        assert_eq!(
            calls.lines().filter(|l| l.contains("delete")).count(),
            1,
            "one delete invocation expected: {calls}"
        );
    }
}
