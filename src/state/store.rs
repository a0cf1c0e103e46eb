//! Durable load/save of the hub execution state.
//!
//! Every load fills missing fields with defaults and lazily rolls daily
//! counters over to the current UTC date. Mutations go through
//! [`StateStore::update_at`], which holds the document lock across the whole
//! load → mutate → save cycle so the orchestrator and the overseer cannot
//! overwrite each other's changes. Loading and saving never fail the caller:
//! errors are logged, a failed load yields defaults, and a failed save drops
//! the update.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::model::{HubState, RunOutcome, TaskState};
use crate::config::HubConfig;
use crate::error::Result;
use crate::history::HistoryLog;
use crate::lock::DocumentLock;
use crate::persist::{read_json, write_json_atomic};

/// Owner of the state document and the history log.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    lock: DocumentLock,
    history: HistoryLog,
}

impl StateStore {
    /// Store for the state document at `path`, appending history to `history`.
    pub fn new(path: PathBuf, history: HistoryLog, lock_timeout: Duration) -> Self {
        let lock = DocumentLock::for_document(&path, lock_timeout);
        Self {
            path,
            lock,
            history,
        }
    }

    /// Store using the document locations and limits from `config`.
    pub fn from_config(config: &HubConfig) -> Self {
        let lock_timeout = Duration::from_millis(config.orchestrator.state_lock_timeout_ms);
        let history = HistoryLog::new(
            config.history_file(),
            config.orchestrator.history_max_entries,
            lock_timeout,
        );
        Self::new(config.state_file(), history, lock_timeout)
    }

    /// Path of the state document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The history log written by [`Self::complete_task_at`].
    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Load the state as of now.
    pub fn load_state(&self) -> HubState {
        self.load_state_at(Utc::now())
    }

    /// Load the state, applying defaults and daily rollover for `now`.
    pub fn load_state_at(&self, now: DateTime<Utc>) -> HubState {
        let mut state = match read_json::<HubState>(&self.path) {
            Ok(Some(state)) => state,
            Ok(None) => {
                debug!("no state at {}, starting fresh", self.path.display());
                HubState::default()
            }
            Err(e) => {
                warn!("cannot load hub state, using defaults: {e}");
                HubState::default()
            }
        };

        let rolled = state.roll_over(now.date_naive());
        if rolled > 0 {
            debug!("rolled daily counters over for {rolled} tasks");
        }
        state
    }

    /// Persist the state, stamping `last_updated`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn try_save_state_at(&self, state: &mut HubState, now: DateTime<Utc>) -> Result<()> {
        state.last_updated = Some(now);
        write_json_atomic(&self.path, state)
    }

    /// Persist the state as of now. Best-effort: failures are logged.
    pub fn save_state(&self, state: &mut HubState) {
        if let Err(e) = self.try_save_state_at(state, Utc::now()) {
            error!("cannot persist hub state: {e}");
        }
    }

    /// Apply `mutate` to the freshly loaded state under the document lock and
    /// persist the result.
    pub fn update_at<R>(&self, now: DateTime<Utc>, mutate: impl FnOnce(&mut HubState) -> R) -> R {
        let _guard = self.lock.acquire_or_warn();
        let mut state = self.load_state_at(now);
        let result = mutate(&mut state);
        if let Err(e) = self.try_save_state_at(&mut state, now) {
            error!("cannot persist hub state: {e}");
        }
        result
    }

    /// Mark `name` as in flight and persist immediately.
    ///
    /// Returns the task state as written.
    pub fn start_task_at(&self, name: &str, now: DateTime<Utc>) -> TaskState {
        self.update_at(now, |state| state.start_task(name, now).clone())
    }

    /// Record the outcome of a run, persist it, and append a history entry.
    ///
    /// Returns the task state as written.
    pub fn complete_task_at(
        &self,
        name: &str,
        outcome: &RunOutcome,
        now: DateTime<Utc>,
    ) -> TaskState {
        let task = self.update_at(now, |state| {
            state.complete_task(name, outcome, now);
            state.tasks[name].clone()
        });
        self.history.record(name, outcome, now);
        task
    }

    /// Clear the in-flight marker of `name` without touching any counters,
    /// but only if it still belongs to run `run_id`.
    ///
    /// Returns `true` when the marker was cleared.
    pub fn clear_current_run_at(&self, name: &str, run_id: Uuid, now: DateTime<Utc>) -> bool {
        self.update_at(now, |state| {
            let Some(task) = state.tasks.get_mut(name) else {
                return false;
            };
            match &task.current_run {
                Some(run) if run.run_id == run_id => {
                    task.current_run = None;
                    true
                }
                _ => false,
            }
        })
    }
}
