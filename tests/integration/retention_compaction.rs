use crate::helpers::{at, hub_config};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::time::Duration;
use taskhub::Optimizer;
use taskhub::history::{HistoryEntry, HistoryLog};
use taskhub::learning::{JsonLearningRecorder, LearningDocument, LearningRecord, TaskTally, WeeklyAggregate};
use taskhub::persist::write_json_atomic;
use taskhub::retention::CategoryStatus;
use taskhub::retention::aggregate::week_start;
use taskhub::state::RunOutcome;

fn week_totals(doc: &LearningDocument) -> BTreeMap<NaiveDate, u64> {
    let mut totals = BTreeMap::new();
    for bucket in &doc.weekly_aggregates {
        *totals.entry(bucket.week_start).or_default() += bucket.total;
    }
    for record in &doc.outcomes {
        *totals
            .entry(week_start(record.timestamp.date_naive()))
            .or_default() += 1;
    }
    totals
}

#[test]
fn learning_compaction_keeps_weekly_totals() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = hub_config(&dir);
    config.retention.max_learning_outcomes = 5;

    let first_week = at(0, 0, 0).date_naive();
    let mut doc = LearningDocument {
        weekly_aggregates: vec![WeeklyAggregate {
            week_start: first_week,
            total: 4,
            success: 4,
            by_task: BTreeMap::from([(
                "digest".to_owned(),
                TaskTally {
                    total: 4,
                    success: 4,
                    failure: 0,
                },
            )]),
            ..WeeklyAggregate::default()
        }],
        ..LearningDocument::default()
    };
    doc.extra
        .insert("analyzer".into(), serde_json::json!({ "lastRun": "2026-02-20" }));
    for day in 0..21 {
        let failed = day % 3 == 0;
        doc.outcomes.push(LearningRecord {
            task: if day % 2 == 0 { "digest" } else { "publish" }.to_owned(),
            timestamp: at(day, 9, 0),
            success: !failed,
            duration_ms: Some(1_200),
            error: failed.then(|| "request timed out".to_owned()),
            category: None,
        });
    }
    let expected = week_totals(&doc);
    write_json_atomic(&config.learning_file(), &doc).expect("write learning");

    let report = Optimizer::from_config(&config).run_optimization_at(at(21, 12, 0));
    assert_eq!(report.learning.status, CategoryStatus::Optimized);
    assert_eq!(report.learning.removed, 16);

    let compacted = JsonLearningRecorder::new(config.learning_file(), Duration::from_secs(2)).load();
    assert_eq!(compacted.outcomes.len(), 5);
    assert_eq!(compacted.outcomes[0].timestamp, at(16, 9, 0));
    assert_eq!(week_totals(&compacted), expected);
    assert_eq!(
        compacted.extra["analyzer"],
        serde_json::json!({ "lastRun": "2026-02-20" })
    );

    let first = &compacted.weekly_aggregates[0];
    assert_eq!(first.week_start, first_week);
    assert_eq!(first.total, 11);
    assert_eq!(first.by_error_type["timeout"], 3);
    assert_eq!(first.success + first.failure, first.total);
}

#[test]
fn history_is_trimmed_to_its_cap() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = hub_config(&dir);

    let entries: Vec<HistoryEntry> = (0..500)
        .map(|i| {
            HistoryEntry::from_outcome(
                "digest",
                &RunOutcome::success(Some(format!("run {i}")), None),
                at(0, 0, 0) + chrono::Duration::minutes(i),
            )
        })
        .collect();
    write_json_atomic(&config.history_file(), &entries).expect("write history");

    let report = Optimizer::from_config(&config).run_optimization_at(at(1, 0, 0));
    assert_eq!(report.history.status, CategoryStatus::Optimized);
    assert_eq!(report.history.removed, 300);
    assert!(report.history.bytes_saved() > 0);
    assert_eq!(report.learning.status, CategoryStatus::Skipped);
    assert_eq!(report.logs.status, CategoryStatus::Skipped);

    let history = HistoryLog::new(config.history_file(), 500, Duration::from_secs(2));
    let kept = history.get_history(1_000);
    assert_eq!(kept.len(), 200);
    assert_eq!(kept[0].output.as_deref(), Some("run 499"));
    assert_eq!(kept[199].output.as_deref(), Some("run 300"));

    let again = Optimizer::from_config(&config).run_optimization_at(at(1, 1, 0));
    assert_eq!(again.history.status, CategoryStatus::NoChanges);
}
