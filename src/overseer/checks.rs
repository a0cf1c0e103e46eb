//! Health checks run by the overseer each cycle.
//!
//! Every check is pure: it takes snapshots of the hub state, registry,
//! review queue, or history, plus the current time, and returns what it
//! found. Acting on the findings is the monitor's job.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::OverseerConfig;
use crate::history::HistoryEntry;
use crate::registry::TaskRegistry;
use crate::review::ReviewItem;
use crate::state::{HubState, RunStatus};

// ── Issues ───────────────────────────────────────────────────────────────────

/// A problem reported by a check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Issue {
    /// A task has been in flight longer than the alert threshold.
    StuckTask {
        task: String,
        started_at: DateTime<Utc>,
        running_minutes: i64,
    },
    /// A task's expected next run passed more than the grace period ago.
    MissedSchedule {
        task: String,
        expected_at: DateTime<Utc>,
        hours_overdue: f64,
    },
    /// A review item has waited too long.
    StaleReview {
        id: String,
        title: String,
        age_hours: f64,
    },
    /// Too many review items are waiting.
    LargeReviewQueue { count: usize },
    /// Nothing has executed for a while.
    NoRecentActivity {
        last_activity: DateTime<Utc>,
        hours_since: f64,
    },
    /// Too many recent executions failed.
    HighFailureRate {
        failures: usize,
        sample: usize,
        rate: f64,
    },
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StuckTask {
                task,
                running_minutes,
                ..
            } => write!(f, "task {task} running for {running_minutes}m"),
            Self::MissedSchedule {
                task,
                hours_overdue,
                ..
            } => write!(f, "task {task} overdue by {hours_overdue}h"),
            Self::StaleReview { id, age_hours, .. } => {
                write!(f, "review {id} pending for {age_hours}h")
            }
            Self::LargeReviewQueue { count } => write!(f, "{count} items awaiting review"),
            Self::NoRecentActivity { hours_since, .. } => {
                write!(f, "no task activity for {hours_since}h")
            }
            Self::HighFailureRate {
                failures, sample, ..
            } => write!(f, "{failures} of the last {sample} runs failed"),
        }
    }
}

// ── Stuck tasks ──────────────────────────────────────────────────────────────

/// An in-flight run older than the alert threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckRun {
    pub task: String,
    /// Run the observation was made against; resets are conditional on it.
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub running_minutes: i64,
    /// Older than the reset threshold as well.
    pub reset_due: bool,
}

impl StuckRun {
    pub fn to_issue(&self) -> Issue {
        Issue::StuckTask {
            task: self.task.clone(),
            started_at: self.started_at,
            running_minutes: self.running_minutes,
        }
    }
}

/// Runs marked `running` for longer than the alert threshold.
pub fn find_stuck_runs(
    state: &HubState,
    config: &OverseerConfig,
    now: DateTime<Utc>,
) -> Vec<StuckRun> {
    let alert_after = Duration::minutes(config.stuck_alert_minutes);
    let reset_after = Duration::minutes(config.stuck_reset_minutes);

    state
        .tasks
        .iter()
        .filter_map(|(name, task)| {
            let run = task.current_run.as_ref()?;
            if run.status != RunStatus::Running {
                return None;
            }
            let elapsed = now.signed_duration_since(run.started_at);
            (elapsed > alert_after).then(|| StuckRun {
                task: name.clone(),
                run_id: run.run_id,
                started_at: run.started_at,
                running_minutes: elapsed.num_minutes(),
                reset_due: elapsed > reset_after,
            })
        })
        .collect()
}

// ── Schedules ────────────────────────────────────────────────────────────────

/// Enabled tasks whose expected next run is overdue by more than the grace period.
pub fn check_missed_schedules(
    state: &HubState,
    registry: &TaskRegistry,
    config: &OverseerConfig,
    now: DateTime<Utc>,
) -> Vec<Issue> {
    let grace = Duration::hours(config.missed_schedule_grace_hours);

    registry
        .enabled()
        .filter_map(|entry| {
            let last_run = state.tasks.get(&entry.name)?.last_run?;
            let expected_at = last_run + Duration::seconds(entry.schedule_interval_secs());
            (now > expected_at + grace).then(|| Issue::MissedSchedule {
                task: entry.name.clone(),
                expected_at,
                hours_overdue: hours_between(expected_at, now),
            })
        })
        .collect()
}

// ── Review queue ─────────────────────────────────────────────────────────────

/// Stale pending items, plus the queue itself when it is too large.
pub fn check_review_queue(
    pending: &[ReviewItem],
    config: &OverseerConfig,
    now: DateTime<Utc>,
) -> Vec<Issue> {
    let stale_after = Duration::hours(config.stale_review_hours);

    let mut issues: Vec<Issue> = pending
        .iter()
        .filter(|item| now.signed_duration_since(item.created_at) > stale_after)
        .map(|item| Issue::StaleReview {
            id: item.id.clone(),
            title: item.title.clone(),
            age_hours: hours_between(item.created_at, now),
        })
        .collect();

    if pending.len() >= config.large_review_queue {
        issues.push(Issue::LargeReviewQueue {
            count: pending.len(),
        });
    }
    issues
}

// ── System health ────────────────────────────────────────────────────────────

/// Inactivity and failure-rate checks over history, most recent first.
pub fn check_system_health(
    recent: &[HistoryEntry],
    config: &OverseerConfig,
    now: DateTime<Utc>,
) -> Vec<Issue> {
    let mut issues = Vec::new();

    if let Some(latest) = recent.first() {
        let idle_for = now.signed_duration_since(latest.timestamp);
        if idle_for > Duration::hours(config.no_activity_hours) {
            issues.push(Issue::NoRecentActivity {
                last_activity: latest.timestamp,
                hours_since: hours_between(latest.timestamp, now),
            });
        }
    }

    let sample = &recent[..recent.len().min(config.failure_rate_window)];
    if !sample.is_empty() && sample.len() >= config.failure_rate_min_sample {
        let failures = sample.iter().filter(|e| !e.success).count();
        let rate = ratio(failures, sample.len());
        if rate > config.failure_rate_threshold {
            issues.push(Issue::HighFailureRate {
                failures,
                sample: sample.len(),
                rate: round1(rate * 100.0) / 100.0,
            });
        }
    }
    issues
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// Whether any task is currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Active,
    Idle,
}

/// Snapshot of hub health published in the overseer state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    pub status: ActivityStatus,
    pub enabled_tasks: usize,
    pub running_tasks: Vec<String>,
    /// Absent when the review queue could not be read.
    pub pending_reviews: Option<usize>,
    /// Percentage over the recent history window; absent without history.
    pub success_rate: Option<f64>,
    pub total_runs: u64,
}

/// Build the health summary.
pub fn summarize(
    state: &HubState,
    registry: &TaskRegistry,
    pending_reviews: Option<usize>,
    recent: &[HistoryEntry],
    config: &OverseerConfig,
) -> HealthSummary {
    let running_tasks = state.running_tasks();
    let sample = &recent[..recent.len().min(config.success_rate_window)];
    let success_rate = (!sample.is_empty()).then(|| {
        let successes = sample.iter().filter(|e| e.success).count();
        round1(ratio(successes, sample.len()) * 100.0)
    });

    HealthSummary {
        status: if running_tasks.is_empty() {
            ActivityStatus::Idle
        } else {
            ActivityStatus::Active
        },
        enabled_tasks: registry.enabled().count(),
        running_tasks,
        pending_reviews,
        success_rate,
        total_runs: state.global.total_runs,
    }
}

#[allow(clippy::cast_precision_loss)]
fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    round1(to.signed_duration_since(from).num_seconds() as f64 / 3600.0)
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: usize, whole: usize) -> f64 {
    part as f64 / whole as f64
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
