//! The overseer loop: periodic health checks, stuck-task recovery, and
//! scheduled retention passes.

use chrono::{DateTime, Utc};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::checks::{
    Issue, check_missed_schedules, check_review_queue, check_system_health, find_stuck_runs,
    summarize,
};
use super::state::{
    ActionKind, LogKind, OverseerAction, OverseerLog, OverseerLogEntry, OverseerState,
    OverseerStatus,
};
use crate::config::{HubConfig, OverseerConfig};
use crate::error::{HubError, Result};
use crate::registry::TaskRegistry;
use crate::retention::{OptimizationReport, Optimizer};
use crate::review::{JsonReviewQueue, ReviewQueue};
use crate::state::StateStore;

/// What one check cycle found and did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub issues: Vec<Issue>,
    pub actions: Vec<OverseerAction>,
    /// Checks that errored or panicked and were skipped this cycle.
    pub failed_checks: Vec<&'static str>,
    /// Present on cycles that ran the retention pass.
    pub optimization: Option<OptimizationReport>,
}

/// Long-lived monitor over the hub state.
pub struct Overseer {
    config: OverseerConfig,
    store: StateStore,
    registry: TaskRegistry,
    reviews: Arc<dyn ReviewQueue>,
    log: OverseerLog,
    optimizer: Optimizer,
    state_path: PathBuf,
    state: OverseerState,
}

impl Overseer {
    /// Overseer wired to the documents and registry named by `config`.
    pub fn from_config(config: &HubConfig) -> Self {
        let lock_timeout = Duration::from_millis(config.orchestrator.state_lock_timeout_ms);
        Self {
            config: config.overseer.clone(),
            store: StateStore::from_config(config),
            registry: TaskRegistry::load_or_empty(&config.registry_file()),
            reviews: Arc::new(JsonReviewQueue::new(config.review_queue_file())),
            log: OverseerLog::new(
                config.overseer_log_file(),
                config.overseer.log_max_entries,
                lock_timeout,
            ),
            optimizer: Optimizer::from_config(config),
            state_path: config.overseer_state_file(),
            state: OverseerState::starting(Utc::now(), config.overseer.auto_recovery),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: TaskRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_review_queue(mut self, reviews: Arc<dyn ReviewQueue>) -> Self {
        self.reviews = reviews;
        self
    }

    pub fn state(&self) -> &OverseerState {
        &self.state
    }

    pub fn log(&self) -> &OverseerLog {
        &self.log
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Mark the overseer as running and persist the initial state.
    ///
    /// # Errors
    ///
    /// Returns an error if the overseer state cannot be written.
    pub fn start_at(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.state = OverseerState::starting(now, self.config.auto_recovery);
        self.state.status = OverseerStatus::Running;
        self.log.append(
            OverseerLogEntry::new(now, LogKind::Info, "Overseer started")
                .with("autoRecovery", self.config.auto_recovery)
                .with("enabledTasks", self.registry.enabled().count()),
        );
        info!(
            auto_recovery = self.config.auto_recovery,
            interval_secs = self.config.check_interval_secs,
            "overseer started"
        );
        self.state.save(&self.state_path)
    }

    /// Mark the overseer as stopped and flush its state.
    ///
    /// # Errors
    ///
    /// Returns an error if the overseer state cannot be written.
    pub fn stop_at(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.state.status = OverseerStatus::Stopped;
        self.log.append(
            OverseerLogEntry::new(now, LogKind::Info, "Overseer stopped")
                .with("checksPerformed", self.state.checks_performed),
        );
        info!(checks = self.state.checks_performed, "overseer stopped");
        self.state.save(&self.state_path)
    }

    /// Check every `check_interval_secs` until `cancel` fires, then stop.
    ///
    /// # Errors
    ///
    /// Returns an error if the overseer state cannot be written at start or stop.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        self.start_at(Utc::now())?;

        let period = Duration::from_secs(self.config.check_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("overseer cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }
            // Cycles do blocking file I/O and may wait on document locks.
            let now = Utc::now();
            self = tokio::task::spawn_blocking(move || {
                self.run_cycle_at(now);
                self
            })
            .await
            .map_err(|e| HubError::Overseer(format!("check cycle did not finish: {e}")))?;
        }

        self.stop_at(Utc::now())
    }

    /// Run one full check cycle as of `now`.
    pub fn run_cycle_at(&mut self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();
        let hub = self.store.load_state_at(now);

        // Stuck tasks: report, or reset once past the reset threshold.
        let config = &self.config;
        if let Some(stuck) = self.isolated("stuck_tasks", now, &mut report, || {
            Ok(find_stuck_runs(&hub, config, now))
        }) {
            for run in stuck {
                if !(run.reset_due && self.config.auto_recovery) {
                    report.issues.push(run.to_issue());
                    continue;
                }
                if self.store.clear_current_run_at(&run.task, run.run_id, now) {
                    warn!(
                        task = %run.task,
                        running_minutes = run.running_minutes,
                        "reset stuck task"
                    );
                    report.actions.push(OverseerAction::new(
                        now,
                        ActionKind::StuckTaskReset {
                            task: run.task,
                            running_minutes: run.running_minutes,
                        },
                    ));
                } else {
                    debug!(task = %run.task, "stuck run changed before reset, leaving it");
                }
            }
        }
        let hub = if report.actions.is_empty() {
            hub
        } else {
            self.store.load_state_at(now)
        };

        let registry = &self.registry;
        if let Some(issues) = self.isolated("missed_schedules", now, &mut report, || {
            Ok(check_missed_schedules(&hub, registry, config, now))
        }) {
            report.issues.extend(issues);
        }

        let reviews = Arc::clone(&self.reviews);
        let pending = self.isolated("review_queue", now, &mut report, || {
            let items = reviews.pending_items()?;
            Ok((check_review_queue(&items, config, now), items.len()))
        });
        let pending_reviews = pending.map(|(issues, count)| {
            report.issues.extend(issues);
            count
        });

        let window = config.failure_rate_window.max(config.success_rate_window);
        let history = self.store.history().clone();
        let recent = self.isolated("system_health", now, &mut report, || {
            let recent = history.try_get_history(window)?;
            Ok((check_system_health(&recent, config, now), recent))
        });
        let recent = match recent {
            Some((issues, recent)) => {
                report.issues.extend(issues);
                recent
            }
            None => Vec::new(),
        };

        let summary = self.isolated("health_summary", now, &mut report, || {
            Ok(summarize(&hub, registry, pending_reviews, &recent, config))
        });

        self.state.checks_performed += 1;
        self.state.last_check = Some(now);
        self.state.current_issues = report.issues.clone();
        if summary.is_some() {
            self.state.health_summary = summary;
        }
        self.state.status = if report.issues.is_empty() {
            OverseerStatus::Healthy
        } else {
            OverseerStatus::IssuesDetected
        };

        for issue in &report.issues {
            debug!(%issue, "overseer issue");
            self.log.append(
                OverseerLogEntry::new(now, LogKind::Alert, issue.to_string()).with("issue", issue),
            );
        }
        for action in &report.actions {
            self.log.append(
                OverseerLogEntry::new(now, LogKind::Action, action.describe())
                    .with("action", &action.kind),
            );
        }
        self.log.append(
            OverseerLogEntry::new(
                now,
                LogKind::Check,
                format!(
                    "Check #{}: {} issues, {} actions",
                    self.state.checks_performed,
                    report.issues.len(),
                    report.actions.len()
                ),
            )
            .with("issues", &report.issues)
            .with("failedChecks", &report.failed_checks),
        );

        let every = self.config.optimize_every_checks;
        if every > 0 && self.state.checks_performed % every == 0 {
            report.optimization = Some(self.optimize_at(now, &mut report.actions));
        }

        self.state
            .push_actions(report.actions.iter().cloned(), self.config.recent_actions_limit);
        self.persist_state(now);

        if report.issues.is_empty() {
            debug!(check = self.state.checks_performed, "overseer check healthy");
        } else {
            info!(
                check = self.state.checks_performed,
                issues = report.issues.len(),
                actions = report.actions.len(),
                "overseer check found issues"
            );
        }
        report
    }

    fn optimize_at(
        &mut self,
        now: DateTime<Utc>,
        actions: &mut Vec<OverseerAction>,
    ) -> OptimizationReport {
        let optimization = self.optimizer.run_optimization_at(now);
        self.state.last_optimization = Some(now);

        let bytes_saved = optimization.bytes_saved();
        if bytes_saved > 0 {
            let action = OverseerAction::new(
                now,
                ActionKind::Optimization {
                    bytes_saved,
                    summary: optimization.summary(),
                },
            );
            self.log
                .append(OverseerLogEntry::new(now, LogKind::Action, action.describe()));
            actions.push(action);
        }
        optimization
    }

    /// Run one check, logging and recording it as failed instead of letting
    /// an error or panic reach the rest of the cycle.
    fn isolated<T>(
        &self,
        check: &'static str,
        now: DateTime<Utc>,
        report: &mut CycleReport,
        run: impl FnOnce() -> Result<T>,
    ) -> Option<T> {
        let error = match catch_unwind(AssertUnwindSafe(run)) {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(e)) => e,
            Err(_) => HubError::Overseer(format!("{check} check panicked")),
        };

        error!(check, "overseer check failed: {error}");
        self.log.append(
            OverseerLogEntry::new(now, LogKind::Error, format!("{check} check failed"))
                .with("error", error.to_string()),
        );
        report.failed_checks.push(check);
        None
    }

    fn persist_state(&self, now: DateTime<Utc>) {
        if let Err(e) = self.state.save(&self.state_path) {
            error!("cannot persist overseer state: {e}");
            self.log.append(
                OverseerLogEntry::new(now, LogKind::Error, "Failed to persist overseer state")
                    .with("error", e.to_string()),
            );
        }
    }
}
