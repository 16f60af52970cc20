//! Prometheus metrics.
//!
//! A purge run is a short-lived cron job, so nothing listens for scrapes.
//! The binary installs a recorder and, once the run is over, renders it to a
//! textfile for the node exporter's textfile collector.
//!
//! Counters recorded during a run:
//!
//! | Name | Labels |
//! |------|--------|
//! | `purge_query_failures_total` | `mode` |
//! | `purge_folders_removed_total` | |
//! | `purge_folder_failures_total` | |
//! | `purge_job_commands_total` | `mode` |

use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::Path;

/// Installs a Prometheus recorder as the process-wide metrics recorder.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|e| Error::OperationFailed {
        operation: "metrics_recorder_install".to_string(),
        cause: e.to_string(),
    })?;
    Ok(handle)
}

/// Renders the recorded metrics to `path`.
///
/// The file is written next to `path` first and renamed into place, so the
/// collector never reads a partial file.
///
/// # Errors
///
/// Returns an error if the file cannot be written or renamed.
pub fn write_textfile(handle: &PrometheusHandle, path: &Path) -> Result<()> {
    let mut payload = handle.render();
    if !payload.ends_with('\n') {
        payload.push('\n');
    }

    let staging = path.with_extension("prom.tmp");
    std::fs::write(&staging, payload)
        .and_then(|()| std::fs::rename(&staging, path))
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_textfile_write".to_string(),
            cause: format!("{}: {e}", path.display()),
        })
}
