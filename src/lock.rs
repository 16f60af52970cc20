//! Single-run exclusivity.
//!
//! Two purges racing over the same cmd-logs tree would each delete folders
//! the other is still walking. An exclusive `flock` on a lock file keeps
//! runs serial; a second run fails fast instead of waiting.

use crate::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive lock held for the lifetime of a run.
///
/// The lock is released when the guard is dropped. The lock file itself is
/// left in place.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    file: File,
}

impl RunLock {
    /// Acquires the lock at `path`, creating the file if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] if another run holds the lock, or
    /// [`Error::OperationFailed`] if the lock file cannot be opened.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                operation: "create_lock_dir".to_string(),
                cause: e.to_string(),
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::OperationFailed {
                operation: "open_lock_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;

        fs2::FileExt::try_lock_exclusive(&file).map_err(|e| {
            let contended = e.kind() == ErrorKind::WouldBlock
                || e.raw_os_error() == fs2::lock_contended_error().raw_os_error();
            if contended {
                Error::AlreadyRunning(path.clone())
            } else {
                Error::OperationFailed {
                    operation: "lock_run".to_string(),
                    cause: format!("{}: {e}", path.display()),
                }
            }
        })?;

        debug!(path = %path.display(), "Acquired run lock");
        Ok(Self { path, file })
    }

    /// Returns the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "Released run lock");
    }
}
