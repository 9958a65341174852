//! Retention sweeper: deletes archived records past their time-to-live.
//!
//! Pure cleanup. The archival timestamp is the file's modification time,
//! set when the archiver renamed the record in. A failure to delete one
//! file is logged and never aborts deletion of the others.

use std::{fs, path::PathBuf, sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use urd_core::Clock;

/// Deletes archived records older than the configured TTL.
pub struct RetentionSweeper {
    archive_dir: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl RetentionSweeper {
    /// Creates a sweeper over the archive directory.
    pub fn new(archive_dir: impl Into<PathBuf>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { archive_dir: archive_dir.into(), ttl, clock }
    }

    /// Creates a sweeper with the TTL given in days.
    pub fn with_ttl_days(archive_dir: impl Into<PathBuf>, days: u64, clock: Arc<dyn Clock>) -> Self {
        Self::new(archive_dir, Duration::from_secs(days * 86_400), clock)
    }

    /// Deletes expired archived records; returns the deletion count.
    pub fn sweep(&self) -> usize {
        let Some(cutoff) = self.clock.now_system().checked_sub(self.ttl) else {
            return 0;
        };

        let entries = match fs::read_dir(&self.archive_dir) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(dir = %self.archive_dir.display(), error = %error, "cannot read archive directory");
                return 0;
            },
        };

        let mut deleted = 0;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!(error = %error, "cannot read archive entry");
                    continue;
                },
            };

            let path = entry.path();
            let archived_at = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(error) => {
                    warn!(file = %path.display(), error = %error, "cannot stat archived record");
                    continue;
                },
            };

            if archived_at >= cutoff {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(file = %path.display(), "expired archived record deleted");
                    deleted += 1;
                },
                Err(error) => {
                    warn!(file = %path.display(), error = %error, "cannot delete archived record");
                },
            }
        }

        if deleted > 0 {
            info!(deleted, ttl_secs = self.ttl.as_secs(), "retention sweep completed");
        }
        deleted
    }
}
