//! Persisted execution-state document.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Schema version written into every saved document.
pub const STATE_VERSION: u32 = 1;

/// Fallback failure reason when an executor supplies none.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Root execution-state document shared by the orchestrator and the overseer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HubState {
    /// Schema version.
    pub version: u32,
    /// Start of the most recent task run of any task.
    pub last_run: Option<DateTime<Utc>>,
    /// Time of the most recent save.
    pub last_updated: Option<DateTime<Utc>>,
    /// Per-task state keyed by task name.
    pub tasks: BTreeMap<String, TaskState>,
    /// Hub-wide counters.
    pub global: GlobalStats,
}

impl Default for HubState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            last_run: None,
            last_updated: None,
            tasks: BTreeMap::new(),
            global: GlobalStats::default(),
        }
    }
}

/// Hub-wide run counters.
///
/// `total_runs == total_success + total_failure` after every completed write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalStats {
    pub total_runs: u64,
    pub total_success: u64,
    pub total_failure: u64,
}

/// State of one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskState {
    /// Successful runs counted against `today_date`.
    pub today_count: u32,
    /// Calendar day (UTC) that `today_count` applies to.
    pub today_date: Option<NaiveDate>,
    pub total_runs: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Start of the most recent run.
    pub last_run: Option<DateTime<Utc>>,
    /// Completion of the most recent successful run.
    pub last_success: Option<DateTime<Utc>>,
    /// Failure reason of the most recent run, cleared on success.
    pub last_error: Option<String>,
    /// In-flight marker; `Some` means the task is logically running.
    pub current_run: Option<CurrentRun>,
    /// Consecutive failures since the last success.
    pub retry_count: u32,
}

impl TaskState {
    /// Zero-valued state for a task first seen on `today`.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today_date: Some(today),
            ..Self::default()
        }
    }

    /// Reset the daily counter if it belongs to a previous day.
    ///
    /// Returns `true` when the counter rolled over.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.today_date == Some(today) {
            return false;
        }
        self.today_count = 0;
        self.today_date = Some(today);
        true
    }

    /// Whether an in-flight marker is set.
    pub fn is_running(&self) -> bool {
        self.current_run.is_some()
    }
}

/// In-flight marker written when a task starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentRun {
    /// Identity of this run; lets a reset confirm it clears the run it observed.
    #[serde(default = "Uuid::nil")]
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub status: RunStatus,
}

impl CurrentRun {
    /// A freshly started run.
    pub fn started(now: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            status: RunStatus::Running,
        }
    }
}

/// Status recorded on an in-flight marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    /// Any status written by another tool that this hub does not understand.
    #[serde(other)]
    Unknown,
}

/// Result of one task execution as recorded by the state store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub success: bool,
    pub output: Option<String>,
    pub url: Option<String>,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
}

impl RunOutcome {
    /// A successful outcome.
    pub fn success(output: Option<String>, url: Option<String>) -> Self {
        Self {
            success: true,
            output,
            url,
            ..Self::default()
        }
    }

    /// A failed outcome.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Attach the measured execution time.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

impl HubState {
    /// State for `name`, created zero-valued on first access.
    pub fn task_state_mut(&mut self, name: &str, today: NaiveDate) -> &mut TaskState {
        self.tasks
            .entry(name.to_owned())
            .or_insert_with(|| TaskState::new(today))
    }

    /// Roll every task's daily counter forward to `today`.
    ///
    /// Returns the number of tasks whose counter was reset.
    pub fn roll_over(&mut self, today: NaiveDate) -> usize {
        self.tasks
            .values_mut()
            .map(|task| task.roll_over(today))
            .filter(|rolled| *rolled)
            .count()
    }

    /// Mark `name` as in flight.
    pub fn start_task(&mut self, name: &str, now: DateTime<Utc>) -> &TaskState {
        let task = self.task_state_mut(name, now.date_naive());
        task.current_run = Some(CurrentRun::started(now));
        task.last_run = Some(now);
        self.last_run = Some(now);
        &self.tasks[name]
    }

    /// Record the outcome of a run and clear the in-flight marker.
    pub fn complete_task(&mut self, name: &str, outcome: &RunOutcome, now: DateTime<Utc>) {
        let task = self.task_state_mut(name, now.date_naive());
        task.current_run = None;
        task.total_runs += 1;

        if outcome.success {
            task.success_count += 1;
            task.today_count += 1;
            task.last_success = Some(now);
            task.last_error = None;
            task.retry_count = 0;
            self.global.total_success += 1;
        } else {
            task.failure_count += 1;
            task.last_error = Some(
                outcome
                    .error
                    .clone()
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| UNKNOWN_ERROR.to_owned()),
            );
            task.retry_count += 1;
            self.global.total_failure += 1;
        }

        self.global.total_runs += 1;
    }

    /// Names of tasks with an in-flight marker.
    pub fn running_tasks(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|(_, task)| task.is_running())
            .map(|(name, _)| name.clone())
            .collect()
    }
}
