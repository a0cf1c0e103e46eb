//! Pruning of rotated log files.
//!
//! Rolling appenders leave one file per day behind, named either
//! `<prefix>.log.YYYY-MM-DD` or `<prefix>-YYYY-MM-DD.log`. Files matching
//! either pattern are deleted once their modification time is older than the
//! configured age. The active, undated file is never touched.

use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Result of one pruning pass over a log directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogCleanup {
    pub files_deleted: usize,
    pub bytes_freed: u64,
    /// Size of the directory after pruning.
    pub dir_bytes: u64,
}

/// Whether `name` carries a rotation date.
pub fn is_rotated_log(name: &str) -> bool {
    if let Some((_, date)) = name.rsplit_once(".log.") {
        return is_date(date);
    }
    if let Some(stem) = name.strip_suffix(".log") {
        // "<prefix>-YYYY-MM-DD" with a non-empty prefix.
        let Some(split) = stem.len().checked_sub(11) else {
            return false;
        };
        return split > 0
            && stem
                .get(split..)
                .and_then(|tail| tail.strip_prefix('-'))
                .is_some_and(is_date);
    }
    false
}

fn is_date(s: &str) -> bool {
    s.len() == 10 && NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// Delete rotated logs older than `max_age`.
///
/// # Errors
///
/// Returns an `io::Error` if the directory cannot be listed. Individual
/// files that cannot be inspected or removed are skipped.
pub fn prune_rotated_logs(log_dir: &Path, max_age: Duration) -> std::io::Result<LogCleanup> {
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(UNIX_EPOCH);
    prune_with_cutoff(log_dir, cutoff)
}

pub(crate) fn prune_with_cutoff(log_dir: &Path, cutoff: SystemTime) -> std::io::Result<LogCleanup> {
    let mut cleanup = LogCleanup::default();

    let rotated: Vec<(PathBuf, SystemTime, u64)> = fs::read_dir(log_dir)?
        .flatten()
        .filter_map(|e| {
            let path = e.path();
            let name = path.file_name()?.to_str()?;
            if !is_rotated_log(name) {
                return None;
            }
            let metadata = path.metadata().ok()?;
            Some((path, metadata.modified().ok()?, metadata.len()))
        })
        .collect();

    for (path, mtime, len) in rotated {
        if mtime < cutoff && fs::remove_file(&path).is_ok() {
            cleanup.files_deleted += 1;
            cleanup.bytes_freed += len;
        }
    }

    cleanup.dir_bytes = dir_size(log_dir);
    Ok(cleanup)
}

/// Total size of the regular files directly inside `dir`.
pub fn dir_size(dir: &Path) -> u64 {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .filter_map(|e| e.metadata().ok())
                .filter(std::fs::Metadata::is_file)
                .map(|m| m.len())
                .sum()
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn rotation_patterns_are_recognized() {
        assert!(is_rotated_log("overseer.log.2026-03-01"));
        assert!(is_rotated_log("taskhub-run.log.2026-12-31"));
        assert!(is_rotated_log("overseer-2026-03-01.log"));
        assert!(!is_rotated_log("overseer.log"));
        assert!(!is_rotated_log("-2026-03-01.log"));
        assert!(!is_rotated_log("overseer.log.2026-13-01"));
        assert!(!is_rotated_log("notes-2026-03-01.txt"));
        assert!(!is_rotated_log("state.json"));
    }

    #[test]
    fn only_old_rotated_files_are_deleted() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path();
        fs::write(dir.join("overseer.log.2026-03-01"), "old rotated").unwrap();
        fs::write(dir.join("run-2026-03-01.log"), "old rotated").unwrap();
        fs::write(dir.join("overseer.log"), "active").unwrap();

        // A cutoff in the future makes every file look old.
        let cutoff = SystemTime::now() + Duration::from_secs(3600);
        let cleanup = prune_with_cutoff(dir, cutoff).unwrap();

        assert_eq!(cleanup.files_deleted, 2);
        assert_eq!(cleanup.bytes_freed, 22);
        assert!(dir.join("overseer.log").exists());
        assert_eq!(cleanup.dir_bytes, 6);
    }

    #[test]
    fn recent_rotated_files_are_kept() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("overseer.log.2026-03-01"), "fresh").unwrap();

        let cleanup = prune_rotated_logs(tmp.path(), Duration::from_secs(7 * 86_400)).unwrap();
        assert_eq!(cleanup.files_deleted, 0);
        assert_eq!(cleanup.dir_bytes, 5);
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(prune_rotated_logs(Path::new("/nonexistent/logs"), Duration::ZERO).is_err());
    }
}
