//! Data retention: size caps on every persisted log and pruning of rotated
//! log files.
//!
//! Each category is handled independently; a failure in one is reported in
//! its own [`CategoryReport`] and does not stop the others.

pub mod aggregate;
pub mod log_rotation;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{HubConfig, RetentionConfig};
use crate::history::{HistoryLog, trim_oldest};
use crate::learning::{JsonLearningRecorder, LearningDocument};
use crate::overseer::OverseerLog;
use crate::persist::{file_len, read_json, write_json_atomic};

/// Outcome of one retention category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryStatus {
    Optimized,
    NoChanges,
    Skipped,
    Error,
}

/// Report for one document category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryReport {
    pub status: CategoryStatus,
    /// Records removed or folded.
    pub removed: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CategoryReport {
    fn skipped(message: impl Into<String>) -> Self {
        Self {
            status: CategoryStatus::Skipped,
            removed: 0,
            bytes_before: 0,
            bytes_after: 0,
            message: Some(message.into()),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: CategoryStatus::Error,
            message: Some(message.into()),
            ..Self::skipped("")
        }
    }

    fn measured(removed: usize, bytes_before: u64, bytes_after: u64) -> Self {
        Self {
            status: if removed > 0 {
                CategoryStatus::Optimized
            } else {
                CategoryStatus::NoChanges
            },
            removed,
            bytes_before,
            bytes_after,
            message: None,
        }
    }

    pub fn bytes_saved(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// Report for the rotated-log category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogReport {
    pub status: CategoryStatus,
    pub files_deleted: usize,
    pub bytes_freed: u64,
    pub dir_bytes: u64,
    /// Directory is larger than the advisory limit.
    pub size_warning: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LogReport {
    fn without_cleanup(status: CategoryStatus, message: String) -> Self {
        Self {
            status,
            files_deleted: 0,
            bytes_freed: 0,
            dir_bytes: 0,
            size_warning: false,
            message: Some(message),
        }
    }
}

/// Result of a full retention pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationReport {
    pub timestamp: DateTime<Utc>,
    pub learning: CategoryReport,
    pub overseer_log: CategoryReport,
    pub history: CategoryReport,
    pub logs: LogReport,
}

impl OptimizationReport {
    /// Bytes reclaimed across every category.
    pub fn bytes_saved(&self) -> u64 {
        self.learning.bytes_saved()
            + self.overseer_log.bytes_saved()
            + self.history.bytes_saved()
            + self.logs.bytes_freed
    }

    /// One-line summary of every category's status.
    pub fn summary(&self) -> String {
        format!(
            "learning {:?}, overseer log {:?}, history {:?}, logs {:?}",
            self.learning.status, self.overseer_log.status, self.history.status, self.logs.status
        )
    }
}

/// Runs the retention pass over the hub's documents.
#[derive(Debug, Clone)]
pub struct Optimizer {
    limits: RetentionConfig,
    learning: JsonLearningRecorder,
    history: HistoryLog,
    overseer_log: OverseerLog,
    log_dir: PathBuf,
}

impl Optimizer {
    pub fn new(
        limits: RetentionConfig,
        learning: JsonLearningRecorder,
        history: HistoryLog,
        overseer_log: OverseerLog,
        log_dir: PathBuf,
    ) -> Self {
        Self {
            limits,
            learning,
            history,
            overseer_log,
            log_dir,
        }
    }

    pub fn from_config(config: &HubConfig) -> Self {
        let lock_timeout = Duration::from_millis(config.orchestrator.state_lock_timeout_ms);
        Self::new(
            config.retention.clone(),
            JsonLearningRecorder::new(config.learning_file(), lock_timeout),
            HistoryLog::new(
                config.history_file(),
                config.orchestrator.history_max_entries,
                lock_timeout,
            ),
            OverseerLog::new(
                config.overseer_log_file(),
                config.overseer.log_max_entries,
                lock_timeout,
            ),
            config.log_dir(),
        )
    }

    pub fn run_optimization(&self) -> OptimizationReport {
        self.run_optimization_at(Utc::now())
    }

    /// Apply every retention rule once.
    pub fn run_optimization_at(&self, now: DateTime<Utc>) -> OptimizationReport {
        let report = OptimizationReport {
            timestamp: now,
            learning: self.compact_learning(),
            overseer_log: compact_document(self.overseer_log.path(), || {
                self.overseer_log.compact(self.limits.max_overseer_log)
            }),
            history: compact_document(self.history.path(), || {
                self.history.compact(self.limits.max_history)
            }),
            logs: self.prune_logs(),
        };

        info!(
            bytes_saved = report.bytes_saved(),
            "retention pass complete: {}",
            report.summary()
        );
        report
    }

    fn compact_learning(&self) -> CategoryReport {
        let path = self.learning.path();
        if !path.exists() {
            return CategoryReport::skipped("no learning document");
        }

        let _guard = self.learning.lock().acquire_or_warn();
        let bytes_before = file_len(path);
        let mut doc = match read_json::<LearningDocument>(path) {
            Ok(doc) => doc.unwrap_or_default(),
            Err(e) => {
                warn!("cannot compact learning document: {e}");
                return CategoryReport::error(e.to_string());
            }
        };

        let folded = aggregate::fold_outcomes(
            &mut doc,
            self.limits.max_learning_outcomes,
            self.limits.max_weekly_aggregates,
        );
        let removed = folded
            + trim_oldest(&mut doc.insights, self.limits.max_insights)
            + trim_oldest(&mut doc.adjustments, self.limits.max_adjustments);

        if removed == 0 {
            return CategoryReport::measured(0, bytes_before, bytes_before);
        }
        if let Err(e) = write_json_atomic(path, &doc) {
            warn!("cannot write compacted learning document: {e}");
            return CategoryReport::error(e.to_string());
        }
        CategoryReport::measured(removed, bytes_before, file_len(path))
    }

    fn prune_logs(&self) -> LogReport {
        if !self.log_dir.is_dir() {
            return LogReport::without_cleanup(CategoryStatus::Skipped, "no log directory".into());
        }

        let max_age = Duration::from_secs(self.limits.log_max_age_days.saturating_mul(86_400));
        match log_rotation::prune_rotated_logs(&self.log_dir, max_age) {
            Ok(cleanup) => {
                let size_warning = cleanup.dir_bytes > self.limits.log_dir_warn_bytes;
                if size_warning {
                    warn!(
                        dir_bytes = cleanup.dir_bytes,
                        "log directory {} exceeds advisory size",
                        self.log_dir.display()
                    );
                }
                LogReport {
                    status: if cleanup.files_deleted > 0 {
                        CategoryStatus::Optimized
                    } else {
                        CategoryStatus::NoChanges
                    },
                    files_deleted: cleanup.files_deleted,
                    bytes_freed: cleanup.bytes_freed,
                    dir_bytes: cleanup.dir_bytes,
                    size_warning,
                    message: None,
                }
            }
            Err(e) => {
                warn!("cannot prune rotated logs: {e}");
                LogReport::without_cleanup(CategoryStatus::Error, e.to_string())
            }
        }
    }
}

fn compact_document(
    path: &Path,
    compact: impl FnOnce() -> crate::error::Result<usize>,
) -> CategoryReport {
    if !path.exists() {
        return CategoryReport::skipped(format!("{} not found", path.display()));
    }
    let bytes_before = file_len(path);
    match compact() {
        Ok(removed) => CategoryReport::measured(removed, bytes_before, file_len(path)),
        Err(e) => {
            warn!("cannot compact {}: {e}", path.display());
            CategoryReport::error(e.to_string())
        }
    }
}
