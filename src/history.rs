//! Append-only, size-bounded record of past task executions.
//!
//! Entries are stored oldest-first in one JSON array; reads return the most
//! recent entries first. Individual entries are never edited; only the
//! retention pass removes the oldest ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, warn};

use crate::error::Result;
use crate::lock::DocumentLock;
use crate::persist::{read_json, write_json_atomic};
use crate::state::RunOutcome;

/// Raw entries kept on every append.
pub const DEFAULT_HISTORY_LIMIT: usize = 500;

/// One finished task execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Task name.
    pub task: String,
    /// When the execution finished.
    pub timestamp: DateTime<Utc>,
    /// Whether the execution succeeded.
    pub success: bool,
    /// Executor output summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Published URL, if the task produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock execution time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

impl HistoryEntry {
    /// Build an entry from a completed run.
    pub fn from_outcome(task: &str, outcome: &RunOutcome, timestamp: DateTime<Utc>) -> Self {
        Self {
            task: task.to_owned(),
            timestamp,
            success: outcome.success,
            output: outcome.output.clone(),
            url: outcome.url.clone(),
            error: outcome.error.clone(),
            duration: outcome.duration_ms,
        }
    }
}

/// File-backed history log.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
    max_entries: usize,
    lock: DocumentLock,
}

impl HistoryLog {
    /// History log stored at `path`, capped at `max_entries`.
    pub fn new(path: PathBuf, max_entries: usize, lock_timeout: Duration) -> Self {
        let lock = DocumentLock::for_document(&path, lock_timeout);
        Self {
            path,
            max_entries: max_entries.max(1),
            lock,
        }
    }

    /// Path of the history document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all entries oldest-first. Unreadable documents read as empty.
    pub fn load(&self) -> Vec<HistoryEntry> {
        match read_json::<Vec<HistoryEntry>>(&self.path) {
            Ok(entries) => entries.unwrap_or_default(),
            Err(e) => {
                warn!("history unavailable, treating as empty: {e}");
                Vec::new()
            }
        }
    }

    /// Append an entry, keeping only the most recent `max_entries`.
    ///
    /// Best-effort: a write failure is logged, never returned.
    pub fn add_entry(&self, entry: HistoryEntry) {
        let _guard = self.lock.acquire_or_warn();
        let mut entries = self.load();
        entries.push(entry);
        trim_oldest(&mut entries, self.max_entries);
        if let Err(e) = write_json_atomic(&self.path, &entries) {
            error!("cannot persist history entry: {e}");
        }
    }

    /// Append the outcome of a run finished at `now`.
    pub fn record(&self, task: &str, outcome: &RunOutcome, now: DateTime<Utc>) {
        self.add_entry(HistoryEntry::from_outcome(task, outcome, now));
    }

    /// The most recent `limit` entries, most recent first.
    pub fn get_history(&self, limit: usize) -> Vec<HistoryEntry> {
        recent_first(self.load(), limit)
    }

    /// Like [`Self::get_history`], but reports an unreadable document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document exists but cannot be read or parsed.
    pub fn try_get_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let entries = read_json::<Vec<HistoryEntry>>(&self.path)?.unwrap_or_default();
        Ok(recent_first(entries, limit))
    }

    /// Drop all but the most recent `keep` entries. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed document cannot be written.
    pub fn compact(&self, keep: usize) -> Result<usize> {
        let _guard = self.lock.acquire_or_warn();
        let mut entries = match read_json::<Vec<HistoryEntry>>(&self.path)? {
            Some(entries) => entries,
            None => return Ok(0),
        };
        let removed = trim_oldest(&mut entries, keep);
        if removed > 0 {
            write_json_atomic(&self.path, &entries)?;
        }
        Ok(removed)
    }
}

/// Keep only the newest `keep` items of an oldest-first list.
pub(crate) fn trim_oldest<T>(items: &mut Vec<T>, keep: usize) -> usize {
    if items.len() <= keep {
        return 0;
    }
    let drop_count = items.len() - keep;
    items.drain(0..drop_count);
    drop_count
}

/// Reverse an oldest-first list and take `limit` items.
pub(crate) fn recent_first<T>(items: Vec<T>, limit: usize) -> Vec<T> {
    items.into_iter().rev().take(limit).collect()
}
