//! Admission gate: decides whether a task may start right now.
//!
//! Rules are evaluated in priority order and the first failing rule wins:
//! daily limit, cooldown, retry ceiling, in-flight marker. The gate is pure;
//! it reads the state and the registry entry and never writes either.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::registry::TaskRegistryEntry;
use crate::state::HubState;

/// Why a task was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// The task already used its quota of successful runs today.
    DailyLimit { count: u32, limit: u32 },
    /// The previous run started too recently.
    Cooldown { elapsed_minutes: i64 },
    /// Consecutive failures reached the retry ceiling.
    MaxRetries { count: u32, max: u32 },
    /// An in-flight marker is set.
    AlreadyRunning,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DailyLimit { count, limit } => {
                write!(f, "Daily limit reached ({count}/{limit})")
            }
            Self::Cooldown { elapsed_minutes } => {
                write!(f, "Cooldown: last run {elapsed_minutes}m ago")
            }
            Self::MaxRetries { count, max } => {
                write!(f, "Max retries exceeded ({count}/{max})")
            }
            Self::AlreadyRunning => f.write_str("Task already running"),
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied(DenyReason),
}

impl Admission {
    /// Whether the task may run.
    pub fn can_run(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Human-readable reason, `"Ready"` when allowed.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allowed => f.write_str("Ready"),
            Self::Denied(reason) => reason.fmt(f),
        }
    }
}

/// Decide whether `entry` may run now.
pub fn can_task_run(state: &HubState, entry: &TaskRegistryEntry) -> Admission {
    can_task_run_at(state, entry, Utc::now())
}

/// Decide whether `entry` may run at `now`.
///
/// A task with no recorded state is treated as zero-valued, so it is
/// admitted unless its limits are zero.
pub fn can_task_run_at(
    state: &HubState,
    entry: &TaskRegistryEntry,
    now: DateTime<Utc>,
) -> Admission {
    let task = state.tasks.get(&entry.name);

    let today_count = task
        .filter(|t| t.today_date == Some(now.date_naive()))
        .map_or(0, |t| t.today_count);
    let limit = entry.daily_limit();
    if today_count >= limit {
        return Admission::Denied(DenyReason::DailyLimit {
            count: today_count,
            limit,
        });
    }

    if let Some(last_run) = task.and_then(|t| t.last_run) {
        let elapsed = now.signed_duration_since(last_run);
        if elapsed.num_seconds() < entry.cooldown_secs() {
            return Admission::Denied(DenyReason::Cooldown {
                elapsed_minutes: elapsed.num_minutes(),
            });
        }
    }

    let retries = task.map_or(0, |t| t.retry_count);
    let max = entry.max_retries();
    if retries >= max {
        return Admission::Denied(DenyReason::MaxRetries {
            count: retries,
            max,
        });
    }

    if task.is_some_and(|t| t.is_running()) {
        return Admission::Denied(DenyReason::AlreadyRunning);
    }

    Admission::Allowed
}
