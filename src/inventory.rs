//! Cmd-log folder inventory.
//!
//! Tractor writes command logs to `<root>/<bucket>/J<jid>/`, where bucket is
//! usually the submitting user. The inventory walks exactly those two
//! levels, read-only, and tags every entry as either a job folder or not.

use crate::scheduler::JobId;
use crate::{Error, Result};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, instrument, warn};

/// Matches a job folder name: `J` followed by the job id.
static JOB_FOLDER_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^J([0-9]+)$").ok());

/// A log folder belonging to a job.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct JobFolder {
    /// Folder path.
    pub path: PathBuf,
    /// Job id parsed from the folder name.
    pub job_id: JobId,
}

/// Classification of a path by its final segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderName {
    /// The name is `J<digits>`.
    Job(JobFolder),
    /// Anything else. Not an error; such entries are ignored.
    NotAJobFolder,
}

/// Parses the job id out of a folder path.
///
/// Only the final segment counts, and it must be exactly `J` followed by
/// decimal digits that fit a job id. `J1042.old`, `j1042` and `archive` are
/// not job folders.
pub fn parse_job_folder(path: &Path) -> FolderName {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return FolderName::NotAJobFolder;
    };
    let Some(re) = JOB_FOLDER_NAME.as_ref() else {
        return FolderName::NotAJobFolder;
    };
    let Some(job_id) = re
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse::<u64>().ok())
    else {
        return FolderName::NotAJobFolder;
    };

    FolderName::Job(JobFolder {
        path: path.to_path_buf(),
        job_id: JobId::new(job_id),
    })
}

/// Result of an inventory scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryScan {
    /// Job folders found, sorted by path.
    pub folders: Vec<JobFolder>,
    /// Entries at the job level that were not job folders.
    pub skipped: usize,
}

/// Enumerates job log folders under a root directory.
#[derive(Debug, Clone)]
pub struct FolderInventory {
    root: PathBuf,
}

impl FolderInventory {
    /// Creates an inventory rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walks `<root>/<bucket>/<entry>` and collects job folders.
    ///
    /// Buckets that cannot be read are logged and skipped so one bad
    /// permission does not hide the rest of the tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Inventory`] if the root itself cannot be read.
    #[instrument(name = "tractor_purge.inventory.scan", skip(self), fields(root = %self.root.display()))]
    pub fn scan(&self) -> Result<InventoryScan> {
        let mut scan = InventoryScan::default();

        for bucket in subdirectories(&self.root).map_err(|e| Error::Inventory {
            path: self.root.clone(),
            cause: e.to_string(),
        })? {
            let entries = match subdirectories(&bucket) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(bucket = %bucket.display(), error = %e, "Cannot read log bucket, skipping");
                    continue;
                },
            };

            for entry in entries {
                match parse_job_folder(&entry) {
                    FolderName::Job(folder) => scan.folders.push(folder),
                    FolderName::NotAJobFolder => {
                        debug!(path = %entry.display(), "Not a job folder, skipping");
                        scan.skipped += 1;
                    },
                }
            }
        }

        scan.folders.sort();
        info!(
            found = scan.folders.len(),
            skipped = scan.skipped,
            "Log folder inventory complete"
        );
        Ok(scan)
    }
}

/// Lists the immediate subdirectories of `dir`.
fn subdirectories(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("/root/b1/J1042", Some(1042) ; "plain job folder")]
    #[test_case("/root/b1/J0", Some(0) ; "job zero")]
    #[test_case("/root/b1/J007", Some(7) ; "leading zeros")]
    #[test_case("/root/b1/archive", None ; "non job name")]
    #[test_case("/root/b1/J", None ; "no digits")]
    #[test_case("/root/b1/j1042", None ; "lowercase prefix")]
    #[test_case("/root/b1/J1042.old", None ; "suffix after digits")]
    #[test_case("/root/b1/XJ1042", None ; "prefix before J")]
    #[test_case("/root/b1/J99999999999999999999999", None ; "overflowing id")]
    fn test_parse_job_folder(path: &str, expected: Option<u64>) {
        let parsed = parse_job_folder(Path::new(path));
        match expected {
            Some(id) => assert_eq!(
                parsed,
                FolderName::Job(JobFolder {
                    path: PathBuf::from(path),
                    job_id: JobId::new(id),
                })
            ),
            None => assert_eq!(parsed, FolderName::NotAJobFolder),
        }
    }

    #[test]
    fn test_scan_two_level_layout() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for path in ["alice/J5", "alice/J7", "bob/J12", "bob/notes", "carol/J9/J99"] {
            fs::create_dir_all(root.join(path)).unwrap();
        }
        // Files and top-level job-looking dirs are ignored.
        fs::write(root.join("alice/J100"), b"not a dir").unwrap();
        fs::create_dir_all(root.join("J200")).unwrap();

        let scan = FolderInventory::new(root).scan().unwrap();

        let ids: Vec<u64> = scan.folders.iter().map(|f| f.job_id.get()).collect();
        assert_eq!(ids, vec![5, 7, 12, 9]);
        assert_eq!(scan.skipped, 1);
        assert!(scan.folders.iter().all(|f| f.path.starts_with(root)));
    }

    #[test]
    fn test_scan_is_read_only() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("alice/J5")).unwrap();

        let inventory = FolderInventory::new(dir.path());
        let first = inventory.scan().unwrap();
        let second = inventory.scan().unwrap();

        assert_eq!(first, second);
        assert!(dir.path().join("alice/J5").is_dir());
    }

    #[test]
    fn test_scan_missing_root_is_error() {
        let dir = TempDir::new().unwrap();
        let err = FolderInventory::new(dir.path().join("missing"))
            .scan()
            .unwrap_err();
        assert!(matches!(err, Error::Inventory { .. }));
    }
}
