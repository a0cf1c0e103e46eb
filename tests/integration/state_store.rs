use crate::helpers::{at, hub_config};
use taskhub::StateStore;
use taskhub::state::RunOutcome;

#[test]
fn daily_counters_roll_over_once_per_day() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = StateStore::from_config(&hub_config(&dir));

    for minute in 0..3 {
        store.start_task_at("digest", at(0, 9, minute));
        store.complete_task_at("digest", &RunOutcome::success(None, None), at(0, 9, minute));
    }
    assert_eq!(store.load_state_at(at(0, 23, 59)).tasks["digest"].today_count, 3);

    // Reading never writes: each load on the next day sees the rollover,
    // and the stored document keeps the old count until the next save.
    for hour in 0..5 {
        let state = store.load_state_at(at(1, hour, 0));
        assert_eq!(state.tasks["digest"].today_count, 0);
        assert_eq!(state.tasks["digest"].today_date, Some(at(1, 0, 0).date_naive()));
    }

    store.start_task_at("digest", at(1, 10, 0));
    store.complete_task_at("digest", &RunOutcome::success(None, None), at(1, 10, 1));
    store.start_task_at("digest", at(1, 11, 0));
    store.complete_task_at("digest", &RunOutcome::success(None, None), at(1, 11, 1));

    let state = store.load_state_at(at(1, 12, 0));
    let task = &state.tasks["digest"];
    assert_eq!(task.today_count, 2);
    assert_eq!(task.success_count, 5);
    assert_eq!(state.global.total_success, 5);
}

#[test]
fn concurrent_writers_do_not_lose_updates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = StateStore::from_config(&hub_config(&dir));

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = store.clone();
            std::thread::spawn(move || {
                let name = format!("task-{worker}");
                for i in 0..25 {
                    let outcome = if i % 5 == 0 {
                        RunOutcome::failure("upstream returned 503")
                    } else {
                        RunOutcome::success(None, None)
                    };
                    store.start_task_at(&name, at(0, 10, 0));
                    store.complete_task_at(&name, &outcome, at(0, 10, 1));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker thread");
    }

    let state = store.load_state_at(at(0, 12, 0));
    assert_eq!(state.global.total_runs, 100);
    assert_eq!(state.global.total_success, 80);
    assert_eq!(state.global.total_failure, 20);
    for worker in 0..4 {
        let task = &state.tasks[&format!("task-{worker}")];
        assert_eq!(task.total_runs, 25);
        assert!(!task.is_running());
    }
    assert_eq!(store.history().get_history(500).len(), 100);
}

#[test]
fn unlocked_writers_keep_every_task() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = hub_config(&dir);
    config.orchestrator.state_lock_timeout_ms = 5;
    let store = StateStore::from_config(&config);

    for i in 0..40 {
        store.start_task_at(&format!("seeded-{i}"), at(0, 8, 0));
    }
    // A lock left by a crashed writer: fresh enough that nobody evicts it,
    // so every writer below times out and writes unlocked.
    std::fs::write(dir.path().join("state.json.lock"), "0").expect("plant lock");

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..30 {
                    store.complete_task_at(
                        &format!("worker-{worker}"),
                        &RunOutcome::success(None, None),
                        at(0, 9, 0),
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker thread");
    }

    let raw = std::fs::read(dir.path().join("state.json")).expect("state document");
    let state: taskhub::HubState = serde_json::from_slice(&raw).expect("whole document");
    assert!((0..40).all(|i| state.tasks.contains_key(&format!("seeded-{i}"))));
    assert!(state.global.total_runs >= 1);
    assert_eq!(
        state.global.total_runs,
        state.global.total_success + state.global.total_failure
    );
}
