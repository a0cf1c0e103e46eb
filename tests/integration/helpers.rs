//! Shared helpers for integration tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use taskhub::HubConfig;
use taskhub::orchestrator::{Clock, TaskContext, TaskExecutor, TaskFailure, TaskOutput};

/// Config rooted in `dir`, with the registry file inside it too.
pub(crate) fn hub_config(dir: &tempfile::TempDir) -> HubConfig {
    let mut config = HubConfig::with_data_dir(dir.path());
    config.paths.registry_file = Some(dir.path().join("registry.toml"));
    config
}

/// 2026-03-02 (a Monday) at `hour:minute` UTC, plus `day_offset` days.
pub(crate) fn at(day_offset: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2 + day_offset, hour, minute, 0)
        .unwrap()
}

/// Clock whose time can be moved by the test.
#[derive(Clone)]
pub(crate) struct TestClock(Arc<Mutex<DateTime<Utc>>>);

impl TestClock {
    pub(crate) fn new(start: DateTime<Utc>) -> Self {
        Self(Arc::new(Mutex::new(start)))
    }

    pub(crate) fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }

    pub(crate) fn clock(&self) -> Clock {
        let inner = Arc::clone(&self.0);
        Arc::new(move || *inner.lock().unwrap())
    }
}

/// Executor that always succeeds or always fails, counting its calls.
pub(crate) struct CountingExecutor {
    succeed: bool,
    calls: AtomicUsize,
}

impl CountingExecutor {
    pub(crate) fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            succeed: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            succeed: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskExecutor for CountingExecutor {
    async fn execute(&self, context: TaskContext) -> Result<TaskOutput, TaskFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.succeed {
            Ok(TaskOutput {
                output: Some(format!("{} ok", context.task_name)),
                url: None,
            })
        } else {
            Err(TaskFailure::new(format!("{} failed: connection refused", context.task_name)))
        }
    }
}
