use crate::helpers::{CountingExecutor, TestClock, at, hub_config};
use std::sync::Arc;
use taskhub::learning::{JsonLearningRecorder, LearningRecorder, NoopLearningRecorder};
use taskhub::orchestrator::{ExecutorRegistry, Orchestrator, TaskRunStatus};
use taskhub::{StateStore, TaskRegistry, TaskRegistryEntry};

fn orchestrator_with(
    config: &taskhub::HubConfig,
    entries: Vec<TaskRegistryEntry>,
    executors: ExecutorRegistry,
    learning: Arc<dyn LearningRecorder>,
) -> Orchestrator {
    Orchestrator::new(
        StateStore::from_config(config),
        TaskRegistry::new(entries),
        executors,
        learning,
    )
}

#[tokio::test]
async fn circuit_breaker_stops_after_three_failures() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = hub_config(&dir);

    let failing = CountingExecutor::failing();
    let unreached = CountingExecutor::succeeding();
    let mut executors = ExecutorRegistry::new();
    let mut entries = Vec::new();
    for (i, name) in ["t1", "t2", "t3", "t4", "t5"].iter().enumerate() {
        entries.push(TaskRegistryEntry::new(*name));
        if i < 3 {
            executors.register(*name, failing.clone());
        } else {
            executors.register(*name, unreached.clone());
        }
    }

    let orchestrator =
        orchestrator_with(&config, entries, executors, Arc::new(NoopLearningRecorder));
    let summary = orchestrator.run_all().await;

    assert_eq!(
        (summary.ran, summary.success, summary.failed, summary.skipped),
        (3, 0, 3, 0)
    );
    assert!(summary.halted);
    assert_eq!(failing.calls(), 3);
    assert_eq!(unreached.calls(), 0);

    let state = orchestrator.store().load_state();
    assert!(!state.tasks.contains_key("t4"));
    assert!(!state.tasks.contains_key("t5"));
    assert_eq!(state.global.total_failure, 3);
    assert_eq!(orchestrator.store().history().get_history(10).len(), 3);
}

#[tokio::test]
async fn daily_limit_holds_until_the_next_day() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = hub_config(&dir);
    let clock = TestClock::new(at(0, 9, 0));

    let mut entry = TaskRegistryEntry::new("digest");
    entry.daily_limit = Some(1);
    entry.cooldown_minutes = Some(0);
    let executor = CountingExecutor::succeeding();
    let mut executors = ExecutorRegistry::new();
    executors.register("digest", executor.clone());

    let orchestrator =
        orchestrator_with(&config, vec![entry], executors, Arc::new(NoopLearningRecorder))
            .with_clock(clock.clock());

    assert_eq!(orchestrator.run_all().await.success, 1);

    clock.set(at(0, 15, 0));
    let blocked = orchestrator.run_all().await;
    assert_eq!(blocked.skipped, 1);
    assert_eq!(blocked.reports[0].status, TaskRunStatus::Skipped);
    assert_eq!(
        blocked.reports[0].detail.as_deref(),
        Some("Daily limit reached (1/1)")
    );

    clock.set(at(1, 0, 30));
    assert_eq!(orchestrator.run_all().await.success, 1);
    assert_eq!(executor.calls(), 2);

    let state = orchestrator.store().load_state_at(at(1, 1, 0));
    let task = &state.tasks["digest"];
    assert_eq!(task.today_count, 1);
    assert_eq!(task.success_count, 2);
}

#[tokio::test]
async fn retry_ceiling_blocks_after_repeated_failures() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = hub_config(&dir);
    let clock = TestClock::new(at(0, 9, 0));

    let mut entry = TaskRegistryEntry::new("publish");
    entry.cooldown_minutes = Some(10);
    let executor = CountingExecutor::failing();
    let mut executors = ExecutorRegistry::new();
    executors.register("publish", executor.clone());

    let orchestrator =
        orchestrator_with(&config, vec![entry], executors, Arc::new(NoopLearningRecorder))
            .with_clock(clock.clock());

    orchestrator.run_all().await;
    clock.set(at(0, 9, 5));
    let cooling = orchestrator.run_all().await;
    assert_eq!(
        cooling.reports[0].detail.as_deref(),
        Some("Cooldown: last run 5m ago")
    );

    clock.set(at(0, 9, 10));
    orchestrator.run_all().await;
    clock.set(at(0, 10, 0));
    let blocked = orchestrator.run_all().await;
    assert_eq!(
        blocked.reports[0].detail.as_deref(),
        Some("Max retries exceeded (2/2)")
    );
    assert_eq!(executor.calls(), 2);

    let state = orchestrator.store().load_state_at(at(0, 10, 0));
    let task = &state.tasks["publish"];
    assert_eq!(task.retry_count, 2);
    assert_eq!(
        task.last_error.as_deref(),
        Some("publish failed: connection refused")
    );
}

#[tokio::test]
async fn outcomes_reach_the_learning_document() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = hub_config(&dir);

    let mut entry = TaskRegistryEntry::new("digest");
    entry.category = Some("content".into());
    let mut executors = ExecutorRegistry::new();
    executors.register("digest", CountingExecutor::succeeding());
    let recorder = Arc::new(JsonLearningRecorder::new(
        config.learning_file(),
        std::time::Duration::from_secs(2),
    ));

    let orchestrator = orchestrator_with(&config, vec![entry], executors, recorder.clone());
    orchestrator.run_all().await;

    let doc = recorder.load();
    assert_eq!(doc.outcomes.len(), 1);
    assert_eq!(doc.outcomes[0].task, "digest");
    assert_eq!(doc.outcomes[0].category.as_deref(), Some("content"));
    assert!(doc.outcomes[0].success);
}

#[test]
fn from_config_rejects_enabled_tasks_without_executors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = hub_config(&dir);
    std::fs::write(
        config.registry_file(),
        "[[tasks]]\nname = \"orphan\"\n\n[[tasks]]\nname = \"off\"\nenabled = false\n",
    )
    .expect("write registry");

    let err = Orchestrator::from_config(&config).err().expect("validation error");
    assert!(err.to_string().contains("orphan"));
}

#[test]
fn missing_registry_means_an_empty_pass() {
    let dir = tempfile::tempdir().expect("tempdir");
    let orchestrator = Orchestrator::from_config(&hub_config(&dir)).expect("empty registry");
    assert!(orchestrator.registry().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn registry_commands_run_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = hub_config(&dir);
    std::fs::write(
        config.registry_file(),
        r#"
[[tasks]]
name = "announce"
category = "social"
command = ["sh", "-c", "echo \"posted by $TASKHUB_TASK_NAME\"; echo url: https://example.test/p/1"]

[[tasks]]
name = "broken"
command = ["sh", "-c", "echo 'HTTP 401 unauthorized' >&2; exit 1"]
"#,
    )
    .expect("write registry");

    let orchestrator = Orchestrator::from_config(&config).expect("orchestrator");
    let summary = orchestrator.run_all().await;
    assert_eq!((summary.success, summary.failed), (1, 1));

    let history = orchestrator.store().history().get_history(10);
    assert_eq!(history[0].task, "broken");
    assert_eq!(history[0].error.as_deref(), Some("HTTP 401 unauthorized"));
    assert_eq!(history[1].url.as_deref(), Some("https://example.test/p/1"));
    assert_eq!(history[1].output.as_deref(), Some("posted by announce"));
}
