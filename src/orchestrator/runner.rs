//! One orchestrator pass over the enabled tasks.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, error, info, info_span, warn};

use super::executor::{ExecutorRegistry, TaskContext, TaskFailure, TaskOutput};
use crate::admission::{Admission, can_task_run_at};
use crate::config::HubConfig;
use crate::error::Result;
use crate::learning::{JsonLearningRecorder, LearningRecord, LearningRecorder};
use crate::registry::{TaskRegistry, TaskRegistryEntry};
use crate::state::{RunOutcome, StateStore};

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What happened to one task during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRunStatus {
    Success,
    Failed,
    Skipped,
}

/// Per-task line of a [`RunSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub task: String,
    pub status: TaskRunStatus,
    /// Skip reason, failure reason, or output summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Tally of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Tasks that were executed.
    pub ran: u32,
    pub success: u32,
    pub failed: u32,
    /// Tasks denied by the admission gate.
    pub skipped: u32,
    /// Whether the circuit breaker stopped the pass before every task was reached.
    pub halted: bool,
    pub reports: Vec<TaskReport>,
}

/// Runs the enabled tasks of a registry, one at a time.
pub struct Orchestrator {
    store: StateStore,
    registry: TaskRegistry,
    executors: ExecutorRegistry,
    learning: Arc<dyn LearningRecorder>,
    task_defaults: serde_json::Map<String, serde_json::Value>,
    breaker_threshold: u32,
    clock: Clock,
}

impl Orchestrator {
    pub fn new(
        store: StateStore,
        registry: TaskRegistry,
        executors: ExecutorRegistry,
        learning: Arc<dyn LearningRecorder>,
    ) -> Self {
        Self {
            store,
            registry,
            executors,
            learning,
            task_defaults: serde_json::Map::new(),
            breaker_threshold: 3,
            clock: Arc::new(Utc::now),
        }
    }

    /// Orchestrator wired from `config`: registry file, command executors,
    /// and the JSON learning recorder.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Executor` if an enabled task has no executor.
    pub fn from_config(config: &HubConfig) -> Result<Self> {
        let registry = TaskRegistry::load_or_empty(&config.registry_file());
        let executors = ExecutorRegistry::from_commands(&registry);
        executors.validate(&registry)?;

        let lock_timeout =
            std::time::Duration::from_millis(config.orchestrator.state_lock_timeout_ms);
        let learning = Arc::new(JsonLearningRecorder::new(config.learning_file(), lock_timeout));

        Ok(Self::new(StateStore::from_config(config), registry, executors, learning)
            .with_task_defaults(config.task_defaults.clone())
            .with_circuit_breaker_threshold(config.orchestrator.circuit_breaker_threshold))
    }

    #[must_use]
    pub fn with_task_defaults(
        mut self,
        defaults: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        self.task_defaults = defaults;
        self
    }

    #[must_use]
    pub fn with_circuit_breaker_threshold(mut self, threshold: u32) -> Self {
        self.breaker_threshold = threshold.max(1);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Run every enabled task once, in registry order.
    ///
    /// Failures are counted cumulatively across the pass; once the count
    /// reaches the circuit breaker threshold the remaining tasks are not
    /// reached at all.
    pub async fn run_all(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut failures = 0u32;

        for entry in self.registry.enabled() {
            if failures >= self.breaker_threshold {
                warn!(
                    failures,
                    "circuit breaker open, stopping before task {}", entry.name
                );
                summary.halted = true;
                break;
            }

            let now = (self.clock)();
            let state = self.store.load_state_at(now);
            if let Admission::Denied(reason) = can_task_run_at(&state, entry, now) {
                info!(task = %entry.name, %reason, "skipping task");
                summary.skipped += 1;
                summary.reports.push(TaskReport {
                    task: entry.name.clone(),
                    status: TaskRunStatus::Skipped,
                    detail: Some(reason.to_string()),
                    duration_ms: None,
                });
                continue;
            }

            let outcome = self.run_task(entry, now).await;
            summary.ran += 1;
            let status = if outcome.success {
                summary.success += 1;
                TaskRunStatus::Success
            } else {
                summary.failed += 1;
                failures += 1;
                TaskRunStatus::Failed
            };
            summary.reports.push(TaskReport {
                task: entry.name.clone(),
                status,
                detail: if outcome.success {
                    outcome.output.clone()
                } else {
                    outcome.error.clone()
                },
                duration_ms: outcome.duration_ms,
            });
        }

        info!(
            ran = summary.ran,
            success = summary.success,
            failed = summary.failed,
            skipped = summary.skipped,
            halted = summary.halted,
            "orchestrator pass complete"
        );
        summary
    }

    async fn run_task(&self, entry: &TaskRegistryEntry, now: DateTime<Utc>) -> RunOutcome {
        let task_state = self.store.start_task_at(&entry.name, now);
        let span = info_span!("task", task = %entry.name);
        let context = TaskContext {
            task_name: entry.name.clone(),
            config: entry.merged_config(&self.task_defaults),
            span: span.clone(),
            state: task_state,
        };

        info!(task = %entry.name, "running task");
        let started = Instant::now();
        let result = self.execute(&entry.name, context, span).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let outcome = match result {
            Ok(output) => RunOutcome::success(output.output, output.url),
            Err(failure) => {
                warn!(task = %entry.name, error = %failure, "task failed");
                RunOutcome::failure(failure.error)
            }
        }
        .with_duration_ms(duration_ms);

        let finished = (self.clock)();
        self.store.complete_task_at(&entry.name, &outcome, finished);
        self.learning
            .record(&LearningRecord::from_outcome(entry, &outcome, finished));
        outcome
    }

    /// Run the executor on its own tokio task so a panic becomes a failure
    /// instead of tearing down the pass.
    async fn execute(
        &self,
        task_name: &str,
        context: TaskContext,
        span: tracing::Span,
    ) -> std::result::Result<TaskOutput, TaskFailure> {
        let Some(executor) = self.executors.get(task_name) else {
            return Err(TaskFailure::new(format!(
                "no executor registered for task '{task_name}'"
            )));
        };

        let handle = tokio::spawn(async move { executor.execute(context).await }.instrument(span));
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(task = %task_name, "executor aborted: {e}");
                Err(TaskFailure::new(format!("executor aborted: {e}")))
            }
        }
    }
}
