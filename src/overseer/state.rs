//! Persisted overseer state and the overseer activity log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, warn};

use super::checks::{HealthSummary, Issue};
use crate::error::Result;
use crate::history::trim_oldest;
use crate::lock::DocumentLock;
use crate::persist::{read_json, write_json_atomic};

/// Lifecycle status of the overseer process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverseerStatus {
    Starting,
    Running,
    IssuesDetected,
    Healthy,
    Stopped,
}

/// Corrective work the overseer performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ActionKind {
    /// A stuck in-flight marker was cleared.
    StuckTaskReset { task: String, running_minutes: i64 },
    /// The retention pass reclaimed space.
    Optimization { bytes_saved: u64, summary: String },
}

/// One recorded action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverseerAction {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl OverseerAction {
    pub fn new(timestamp: DateTime<Utc>, kind: ActionKind) -> Self {
        Self { timestamp, kind }
    }

    pub fn describe(&self) -> String {
        match &self.kind {
            ActionKind::StuckTaskReset {
                task,
                running_minutes,
            } => format!("Reset stuck task {task} after {running_minutes}m"),
            ActionKind::Optimization {
                bytes_saved,
                summary,
            } => format!("Optimization saved {bytes_saved} bytes ({summary})"),
        }
    }
}

/// The overseer-state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverseerState {
    pub status: OverseerStatus,
    pub started_at: DateTime<Utc>,
    pub last_check: Option<DateTime<Utc>>,
    pub checks_performed: u64,
    /// Issues found by the most recent cycle.
    pub current_issues: Vec<Issue>,
    /// Most recent actions, oldest first.
    pub recent_actions: Vec<OverseerAction>,
    pub health_summary: Option<HealthSummary>,
    pub auto_recovery_enabled: bool,
    pub last_optimization: Option<DateTime<Utc>>,
}

impl OverseerState {
    /// Fresh state for an overseer starting at `now`.
    pub fn starting(now: DateTime<Utc>, auto_recovery_enabled: bool) -> Self {
        Self {
            status: OverseerStatus::Starting,
            started_at: now,
            last_check: None,
            checks_performed: 0,
            current_issues: Vec::new(),
            recent_actions: Vec::new(),
            health_summary: None,
            auto_recovery_enabled,
            last_optimization: None,
        }
    }

    /// Append actions, keeping at most `limit` of the most recent.
    pub fn push_actions(&mut self, actions: impl IntoIterator<Item = OverseerAction>, limit: usize) {
        self.recent_actions.extend(actions);
        trim_oldest(&mut self.recent_actions, limit);
    }

    /// Persist to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    /// Load from `path`; `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the document exists but cannot be parsed.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        read_json(path)
    }
}

/// Overseer log entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Check,
    Alert,
    Action,
    Error,
    Info,
}

/// One overseer log entry with free-form detail fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverseerLogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl OverseerLogEntry {
    pub fn new(timestamp: DateTime<Utc>, kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            kind,
            message: message.into(),
            details: serde_json::Map::new(),
        }
    }

    /// Attach a detail field. Values that fail to serialize are dropped.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.details.insert(key.to_owned(), value);
        }
        self
    }
}

/// Bounded, file-backed overseer log.
#[derive(Debug, Clone)]
pub struct OverseerLog {
    path: PathBuf,
    max_entries: usize,
    lock: DocumentLock,
}

impl OverseerLog {
    pub fn new(path: PathBuf, max_entries: usize, lock_timeout: Duration) -> Self {
        let lock = DocumentLock::for_document(&path, lock_timeout);
        Self {
            path,
            max_entries: max_entries.max(1),
            lock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, oldest first. Unreadable logs read as empty.
    pub fn load(&self) -> Vec<OverseerLogEntry> {
        match read_json::<Vec<OverseerLogEntry>>(&self.path) {
            Ok(entries) => entries.unwrap_or_default(),
            Err(e) => {
                warn!("overseer log unavailable, treating as empty: {e}");
                Vec::new()
            }
        }
    }

    /// Append an entry, dropping the oldest beyond the cap. Best-effort.
    pub fn append(&self, entry: OverseerLogEntry) {
        let _guard = self.lock.acquire_or_warn();
        let mut entries = self.load();
        entries.push(entry);
        trim_oldest(&mut entries, self.max_entries);
        if let Err(e) = write_json_atomic(&self.path, &entries) {
            error!("cannot persist overseer log entry: {e}");
        }
    }

    /// Drop all but the most recent `keep` entries. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or rewritten.
    pub fn compact(&self, keep: usize) -> Result<usize> {
        let _guard = self.lock.acquire_or_warn();
        let Some(mut entries) = read_json::<Vec<OverseerLogEntry>>(&self.path)? else {
            return Ok(0);
        };
        let removed = trim_oldest(&mut entries, keep);
        if removed > 0 {
            write_json_atomic(&self.path, &entries)?;
        }
        Ok(removed)
    }
}
