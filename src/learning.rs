//! Learning document: raw task outcomes plus the summaries derived from them.
//!
//! The orchestrator appends one [`LearningRecord`] per executed task. The
//! retention pass folds old records into [`WeeklyAggregate`] buckets and caps
//! the insight and adjustment lists. Keys written by other tools are kept
//! as-is.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, warn};

use crate::lock::DocumentLock;
use crate::persist::{read_json, write_json_atomic};
use crate::registry::TaskRegistryEntry;
use crate::state::RunOutcome;

/// One executed task, as recorded for later analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningRecord {
    pub task: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl LearningRecord {
    pub fn from_outcome(
        entry: &TaskRegistryEntry,
        outcome: &RunOutcome,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            task: entry.name.clone(),
            timestamp,
            success: outcome.success,
            duration_ms: outcome.duration_ms,
            error: outcome.error.clone(),
            category: entry.category.clone(),
        }
    }
}

/// Outcome counts for one week (Monday start, UTC).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WeeklyAggregate {
    pub week_start: NaiveDate,
    pub total: u64,
    pub success: u64,
    pub failure: u64,
    pub by_task: BTreeMap<String, TaskTally>,
    pub by_error_type: BTreeMap<String, u64>,
}

/// Per-task counts inside a weekly bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskTally {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
}

/// The whole learning document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LearningDocument {
    /// Raw records, oldest first.
    pub outcomes: Vec<LearningRecord>,
    /// Free-form insights produced by analysis tools, oldest first.
    pub insights: Vec<serde_json::Value>,
    /// Free-form adjustments produced by analysis tools, oldest first.
    pub adjustments: Vec<serde_json::Value>,
    /// Folded history, oldest week first.
    pub weekly_aggregates: Vec<WeeklyAggregate>,
    /// Fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Receiver of outcome records. Fire-and-forget: implementations log and
/// swallow their own failures.
pub trait LearningRecorder: Send + Sync {
    fn record(&self, record: &LearningRecord);
}

/// Recorder that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLearningRecorder;

impl LearningRecorder for NoopLearningRecorder {
    fn record(&self, _record: &LearningRecord) {}
}

/// File-backed learning document.
#[derive(Debug, Clone)]
pub struct JsonLearningRecorder {
    path: PathBuf,
    lock: DocumentLock,
}

impl JsonLearningRecorder {
    pub fn new(path: PathBuf, lock_timeout: Duration) -> Self {
        let lock = DocumentLock::for_document(&path, lock_timeout);
        Self { path, lock }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock(&self) -> &DocumentLock {
        &self.lock
    }

    /// Load the document; an unreadable document reads as empty.
    pub fn load(&self) -> LearningDocument {
        match read_json::<LearningDocument>(&self.path) {
            Ok(doc) => doc.unwrap_or_default(),
            Err(e) => {
                warn!("learning document unavailable, treating as empty: {e}");
                LearningDocument::default()
            }
        }
    }
}

impl LearningRecorder for JsonLearningRecorder {
    fn record(&self, record: &LearningRecord) {
        let _guard = self.lock.acquire_or_warn();
        let mut doc = match read_json::<LearningDocument>(&self.path) {
            Ok(doc) => doc.unwrap_or_default(),
            Err(e) => {
                // Appending to a document we cannot parse would discard it.
                error!("cannot record outcome for {}: {e}", record.task);
                return;
            }
        };
        doc.outcomes.push(record.clone());
        if let Err(e) = write_json_atomic(&self.path, &doc) {
            error!("cannot record outcome for {}: {e}", record.task);
        }
    }
}
