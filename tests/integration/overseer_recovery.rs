use crate::helpers::{at, hub_config};
use chrono::Duration;
use taskhub::overseer::{ActionKind, Issue, LogKind, Overseer, OverseerStatus};
use taskhub::state::RunOutcome;
use taskhub::{TaskRegistry, TaskRegistryEntry};

fn digest_overseer(config: &taskhub::HubConfig) -> Overseer {
    Overseer::from_config(config)
        .with_registry(TaskRegistry::new(vec![TaskRegistryEntry::new("digest")]))
}

#[test]
fn long_running_task_is_reported_then_reset() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = hub_config(&dir);
    let mut overseer = digest_overseer(&config);
    overseer.start_at(at(0, 8, 0)).expect("start");

    let store = overseer.store().clone();
    store.start_task_at("digest", at(0, 8, 0));
    store.complete_task_at("digest", &RunOutcome::success(None, None), at(0, 8, 1));
    store.start_task_at("digest", at(0, 9, 0));

    let early = overseer.run_cycle_at(at(0, 9, 35));
    assert!(early.actions.is_empty());
    assert!(matches!(
        early.issues.as_slice(),
        [Issue::StuckTask { task, running_minutes: 35, .. }] if task == "digest"
    ));
    assert!(store.load_state_at(at(0, 9, 35)).tasks["digest"].is_running());
    assert_eq!(overseer.state().status, OverseerStatus::IssuesDetected);

    let late = overseer.run_cycle_at(at(0, 10, 5));
    assert!(late.issues.is_empty());
    assert!(matches!(
        late.actions.as_slice(),
        [action] if matches!(
            &action.kind,
            ActionKind::StuckTaskReset { task, running_minutes: 65 } if task == "digest"
        )
    ));
    assert_eq!(overseer.state().status, OverseerStatus::Healthy);
    assert_eq!(overseer.state().recent_actions.len(), 1);

    // The reset only clears the marker: no counters move and nothing is
    // appended to history.
    let state = store.load_state_at(at(0, 10, 5));
    let task = &state.tasks["digest"];
    assert!(!task.is_running());
    assert_eq!(task.total_runs, 1);
    assert_eq!(state.global.total_runs, 1);
    assert_eq!(store.history().get_history(10).len(), 1);

    let actions: Vec<_> = overseer
        .log()
        .load()
        .into_iter()
        .filter(|e| e.kind == LogKind::Action)
        .collect();
    assert_eq!(actions.len(), 1);
    assert!(actions[0].message.contains("digest"));

    let again = overseer.run_cycle_at(at(0, 10, 10));
    assert!(again.actions.is_empty());
}

#[test]
fn stale_reviews_are_flagged_by_age() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = hub_config(&dir);
    let now = at(2, 12, 0);
    let queue = serde_json::json!([
        {
            "id": "r1",
            "title": "Weekly digest draft",
            "createdAt": now - Duration::hours(40),
        },
        {
            "id": "r2",
            "title": "Fresh post",
            "createdAt": now - Duration::hours(2),
            "status": "pending",
        },
        {
            "id": "r3",
            "title": "Already handled",
            "createdAt": now - Duration::hours(100),
            "status": "approved",
        },
    ]);
    std::fs::write(
        config.review_queue_file(),
        serde_json::to_vec_pretty(&queue).expect("serialize queue"),
    )
    .expect("write queue");

    let mut overseer = digest_overseer(&config);
    let report = overseer.run_cycle_at(now);

    assert!(report.failed_checks.is_empty());
    match report.issues.as_slice() {
        [Issue::StaleReview { id, age_hours, .. }] => {
            assert_eq!(id, "r1");
            assert!((age_hours - 40.0).abs() < 0.05);
        }
        other => panic!("unexpected issues: {other:?}"),
    }

    let summary = overseer.state().health_summary.clone().expect("summary");
    assert_eq!(summary.pending_reviews, Some(2));

    let alerts: Vec<_> = overseer
        .log()
        .load()
        .into_iter()
        .filter(|e| e.kind == LogKind::Alert)
        .collect();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].message.starts_with("review r1"));
    assert_eq!(alerts[0].details["issue"]["type"], "stale_review");
    assert_eq!(alerts[0].details["issue"]["title"], "Weekly digest draft");
}

#[test]
fn overdue_schedule_is_reported_from_the_expected_time() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = hub_config(&dir);
    let mut entry = TaskRegistryEntry::new("digest");
    entry.cooldown_hours = Some(24.0);
    let mut overseer =
        Overseer::from_config(&config).with_registry(TaskRegistry::new(vec![entry]));

    let store = overseer.store().clone();
    store.start_task_at("digest", at(0, 6, 0));
    store.complete_task_at("digest", &RunOutcome::success(None, None), at(0, 6, 5));

    let on_time = overseer.run_cycle_at(at(1, 7, 0));
    assert!(
        !on_time
            .issues
            .iter()
            .any(|i| matches!(i, Issue::MissedSchedule { .. }))
    );

    let overdue = overseer.run_cycle_at(at(1, 9, 0));
    let missed: Vec<_> = overdue
        .issues
        .iter()
        .filter_map(|i| match i {
            Issue::MissedSchedule {
                task,
                hours_overdue,
                ..
            } => Some((task.clone(), *hours_overdue)),
            _ => None,
        })
        .collect();
    assert_eq!(missed, vec![("digest".to_owned(), 3.0)]);
}
