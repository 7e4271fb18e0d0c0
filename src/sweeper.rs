//! Retention Sweeper
//!
//! Reclaims anonymous private stores (`a_*.db`) whose last modification is
//! older than the retention window. User stores and the shared store are
//! never touched.
//!
//! The sweep runs at most once per process: the first page request (or the
//! server start, whichever comes first) launches it on a blocking worker and
//! every later call is a no-op. Several processes sharing one data directory
//! may sweep concurrently; a file that vanishes between listing and deletion
//! counts as already deleted.

use crate::clock::SharedClock;
use crate::session_info::DbClass;
use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outcome counters of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
    /// Anonymous stores inspected
    pub scanned: usize,
    /// Stores deleted by this sweep
    pub deleted: usize,
    /// Stores that disappeared before we could delete them
    pub vanished: usize,
    /// Stores that could not be inspected or deleted
    pub failed: usize,
}

/// Deletes stale anonymous stores, once per process.
pub struct RetentionSweeper {
    data_dir: PathBuf,
    shared_db_name: String,
    retention: Duration,
    clock: SharedClock,
    started: AtomicBool,
}

impl RetentionSweeper {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        shared_db_name: impl Into<String>,
        retention_days: i64,
        clock: SharedClock,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            shared_db_name: shared_db_name.into(),
            retention: Duration::days(retention_days),
            clock,
            started: AtomicBool::new(false),
        }
    }

    /// Whether the once-per-process sweep has been launched.
    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Launch the sweep in the background unless it already ran.
    ///
    /// Must be called from within a tokio runtime. The returned handle may be
    /// dropped; failures are logged, never reported to the caller.
    pub fn spawn_once(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<SweepReport>> {
        if self.started.swap(true, Ordering::AcqRel) {
            return None;
        }
        let sweeper = Arc::clone(self);
        Some(tokio::task::spawn_blocking(move || sweeper.sweep()))
    }

    /// Run one sweep synchronously.
    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let cutoff = self.clock.now() - self.retention;

        let entries = match fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(data_dir = %self.data_dir.display(), error = %e, "retention_sweep_list_failed");
                return report;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "retention_sweep_entry_failed");
                    report.failed += 1;
                    continue;
                }
            };
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !DbClass::of(&name, &self.shared_db_name).is_retained_temporarily() {
                continue;
            }

            report.scanned += 1;
            self.sweep_one(&entry.path(), cutoff, &mut report);
        }

        tracing::info!(
            scanned = report.scanned,
            deleted = report.deleted,
            vanished = report.vanished,
            failed = report.failed,
            "retention_sweep_finished"
        );
        report
    }

    fn sweep_one(&self, path: &Path, cutoff: DateTime<Utc>, report: &mut SweepReport) {
        let modified = match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(t) => DateTime::<Utc>::from(t),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                report.vanished += 1;
                return;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "retention_sweep_stat_failed");
                report.failed += 1;
                return;
            }
        };

        if modified >= cutoff {
            return;
        }

        match fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), %modified, "retention_sweep_deleted");
                report.deleted += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => report.vanished += 1,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "retention_sweep_delete_failed");
                report.failed += 1;
            }
        }
    }
}
