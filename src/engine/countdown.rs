//! Operator warning and abort window.

use crate::config::PurgeConfig;
use crate::{Error, Result};
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Granularity of the cancellation check.
const TICK: Duration = Duration::from_millis(100);

/// Cancellation flag shared with the Ctrl+C handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates an un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Builds the warning shown before anything happens.
pub fn banner(config: &PurgeConfig) -> String {
    let days = config.retention.age_threshold_days;
    let mut message = String::from(
        "Welcome to tractor-purge.\n\nThis run will now execute the following actions",
    );
    message.push_str(if config.dry_run {
        " in \"dry run\" mode:\n"
    } else {
        ":\n"
    });
    if config.delete_cmd_logs {
        let _ = writeln!(message, "- Delete cmd-logs older than {days} days.");
    }
    if config.delete_jobs {
        let _ = writeln!(message, "- Delete/archive jobs older than {days} days.");
    }
    let _ = write!(
        message,
        "\nAbort now (ctrl+c) if this does not look right to you. \
         You have {} seconds and counting...",
        config.countdown.as_secs()
    );
    message
}

/// Waits for `duration` unless `token` is cancelled first.
///
/// # Errors
///
/// Returns [`Error::Cancelled`] if cancellation was requested before or
/// during the wait.
pub fn wait(duration: Duration, token: &CancelToken) -> Result<()> {
    let deadline = Instant::now() + duration;
    loop {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(());
        }
        thread::sleep(remaining.min(TICK));
    }
}
