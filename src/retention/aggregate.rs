//! Folding raw learning outcomes into weekly aggregate buckets.

use chrono::{Datelike, Duration, NaiveDate};

use crate::history::trim_oldest;
use crate::learning::{LearningDocument, LearningRecord, WeeklyAggregate};

/// Monday of the ISO week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Coarse class of a failure reason, used as the aggregate breakdown key.
pub fn error_type(error: Option<&str>) -> &'static str {
    let Some(error) = error.map(str::to_lowercase).filter(|e| !e.trim().is_empty()) else {
        return "none";
    };

    let has = |needles: &[&str]| needles.iter().any(|n| error.contains(n));
    if has(&["timeout", "timed out"]) {
        "timeout"
    } else if has(&["rate limit", "rate_limit", "429", "too many requests"]) {
        "rate_limit"
    } else if has(&["unauthorized", "forbidden", "401", "403", "auth", "credential"]) {
        "auth"
    } else if has(&["not found", "404", "no such"]) {
        "not_found"
    } else if has(&["network", "connection", "dns", "econnrefused", "unreachable"]) {
        "network"
    } else {
        "other"
    }
}

/// Add one record to `bucket`.
pub fn accumulate(bucket: &mut WeeklyAggregate, record: &LearningRecord) {
    bucket.total += 1;
    let tally = bucket.by_task.entry(record.task.clone()).or_default();
    tally.total += 1;

    if record.success {
        bucket.success += 1;
        tally.success += 1;
    } else {
        bucket.failure += 1;
        tally.failure += 1;
        *bucket
            .by_error_type
            .entry(error_type(record.error.as_deref()).to_owned())
            .or_default() += 1;
    }
}

/// Fold the oldest outcomes beyond `keep` into weekly buckets.
///
/// Folded records merge into an existing bucket for the same week. Buckets
/// stay sorted by week and are capped at the newest `max_weeks`. Returns the
/// number of records folded.
pub fn fold_outcomes(doc: &mut LearningDocument, keep: usize, max_weeks: usize) -> usize {
    if doc.outcomes.len() <= keep {
        return 0;
    }

    let excess = doc.outcomes.len() - keep;
    for record in doc.outcomes.drain(..excess) {
        let week = week_start(record.timestamp.date_naive());
        let position = doc
            .weekly_aggregates
            .iter()
            .position(|bucket| bucket.week_start == week);
        let bucket = match position {
            Some(index) => &mut doc.weekly_aggregates[index],
            None => {
                doc.weekly_aggregates.push(WeeklyAggregate {
                    week_start: week,
                    ..WeeklyAggregate::default()
                });
                let last = doc.weekly_aggregates.len() - 1;
                &mut doc.weekly_aggregates[last]
            }
        };
        accumulate(bucket, &record);
    }

    doc.weekly_aggregates.sort_by_key(|bucket| bucket.week_start);
    trim_oldest(&mut doc.weekly_aggregates, max_weeks);
    excess
}
