//! Task registry: the named, independently-configured tasks the hub runs.
//!
//! The registry is read-only from the hub's point of view. It is loaded from
//! a TOML file of `[[tasks]]` entries; file order defines run order.
//!
//! ```toml
//! [[tasks]]
//! name = "weekly_digest"
//! schedule = "0 9 * * MON"
//! daily_limit = 1
//! cooldown_hours = 24
//! max_retries = 2
//! category = "content"
//! command = ["./bin/digest", "--weekly"]
//!
//! [tasks.config]
//! audience = "subscribers"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{HubError, Result};

/// Daily limit applied when an entry sets none.
pub const DEFAULT_DAILY_LIMIT: u32 = 999;

/// Cooldown applied when an entry sets neither minutes nor hours.
pub const DEFAULT_COOLDOWN_MINUTES: u64 = 60;

/// Retry ceiling applied when an entry sets none.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Interval assumed by the missed-schedule check when no cooldown is set.
pub const DEFAULT_SCHEDULE_INTERVAL_HOURS: f64 = 24.0;

/// One task as configured in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRegistryEntry {
    /// Unique task name; key into the hub state.
    pub name: String,
    /// Disabled tasks are never considered by the orchestrator.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Human-readable schedule (e.g. a cron expression) for operators.
    #[serde(default)]
    pub schedule: Option<String>,
    /// Maximum successful runs per calendar day.
    #[serde(default)]
    pub daily_limit: Option<u32>,
    /// Minimum minutes between runs.
    #[serde(default)]
    pub cooldown_minutes: Option<u64>,
    /// Minimum hours between runs (used when minutes are not set).
    #[serde(default)]
    pub cooldown_hours: Option<f64>,
    /// Consecutive failures after which the task is blocked.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Free-form grouping used by learning records.
    #[serde(default)]
    pub category: Option<String>,
    /// Program and arguments run by the command executor.
    #[serde(default)]
    pub command: Option<Vec<String>>,
    /// Task-specific settings merged over the hub's task defaults.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}

impl TaskRegistryEntry {
    /// Create an enabled entry with every limit at its default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            schedule: None,
            daily_limit: None,
            cooldown_minutes: None,
            cooldown_hours: None,
            max_retries: None,
            category: None,
            command: None,
            config: serde_json::Map::new(),
        }
    }

    /// Effective daily limit.
    pub fn daily_limit(&self) -> u32 {
        self.daily_limit.unwrap_or(DEFAULT_DAILY_LIMIT)
    }

    /// Effective admission cooldown in seconds.
    pub fn cooldown_secs(&self) -> i64 {
        if let Some(minutes) = self.cooldown_minutes {
            return i64::try_from(minutes.saturating_mul(60)).unwrap_or(i64::MAX);
        }
        if let Some(hours) = self.cooldown_hours {
            return hours_to_secs(hours);
        }
        i64::try_from(DEFAULT_COOLDOWN_MINUTES * 60).unwrap_or(i64::MAX)
    }

    /// Interval between expected runs, used for missed-schedule detection.
    pub fn schedule_interval_secs(&self) -> i64 {
        if let Some(hours) = self.cooldown_hours {
            return hours_to_secs(hours);
        }
        if let Some(minutes) = self.cooldown_minutes {
            return i64::try_from(minutes.saturating_mul(60)).unwrap_or(i64::MAX);
        }
        hours_to_secs(DEFAULT_SCHEDULE_INTERVAL_HOURS)
    }

    /// Effective retry ceiling.
    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }

    /// Hub task defaults overlaid with this entry's own config.
    pub fn merged_config(
        &self,
        defaults: &serde_json::Map<String, serde_json::Value>,
    ) -> serde_json::Value {
        let mut merged = defaults.clone();
        for (key, value) in &self.config {
            merged.insert(key.clone(), value.clone());
        }
        serde_json::Value::Object(merged)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn hours_to_secs(hours: f64) -> i64 {
    (hours.max(0.0) * 3600.0).round() as i64
}

#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    tasks: Vec<TaskRegistryEntry>,
}

/// Ordered collection of task registry entries.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    entries: Vec<TaskRegistryEntry>,
}

impl TaskRegistry {
    /// Build a registry from entries, preserving order.
    pub fn new(entries: Vec<TaskRegistryEntry>) -> Self {
        Self { entries }
    }

    /// Parse a registry TOML document.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Registry` on malformed TOML or duplicate task names.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: RegistryFile =
            toml::from_str(content).map_err(|e| HubError::Registry(e.to_string()))?;

        let mut seen = std::collections::HashSet::new();
        for entry in &file.tasks {
            if !seen.insert(entry.name.as_str()) {
                return Err(HubError::Registry(format!(
                    "duplicate task name '{}'",
                    entry.name
                )));
            }
        }

        Ok(Self::new(file.tasks))
    }

    /// Load a registry file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HubError::Registry(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load a registry file, logging and returning an empty registry on failure.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::from_file(path) {
            Ok(registry) => {
                debug!(
                    "loaded {} registry entries from {}",
                    registry.entries.len(),
                    path.display()
                );
                registry
            }
            Err(e) => {
                warn!("task registry unavailable, continuing with no tasks: {e}");
                Self::default()
            }
        }
    }

    /// All entries in registry order.
    pub fn entries(&self) -> &[TaskRegistryEntry] {
        &self.entries
    }

    /// Enabled entries in registry order.
    pub fn enabled(&self) -> impl Iterator<Item = &TaskRegistryEntry> {
        self.entries.iter().filter(|entry| entry.enabled)
    }

    /// Look up an entry by task name.
    pub fn get(&self, name: &str) -> Option<&TaskRegistryEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn defaults_apply_when_limits_are_unset() {
        let entry = TaskRegistryEntry::new("t");
        assert!(entry.enabled);
        assert_eq!(entry.daily_limit(), 999);
        assert_eq!(entry.cooldown_secs(), 3600);
        assert_eq!(entry.max_retries(), 2);
        assert_eq!(entry.schedule_interval_secs(), 24 * 3600);
    }

    #[test]
    fn cooldown_minutes_take_precedence_for_admission() {
        let mut entry = TaskRegistryEntry::new("t");
        entry.cooldown_minutes = Some(90);
        entry.cooldown_hours = Some(6.0);
        assert_eq!(entry.cooldown_secs(), 90 * 60);
        assert_eq!(entry.schedule_interval_secs(), 6 * 3600);
    }

    #[test]
    fn cooldown_hours_convert_to_seconds() {
        let mut entry = TaskRegistryEntry::new("t");
        entry.cooldown_hours = Some(1.5);
        assert_eq!(entry.cooldown_secs(), 5400);
        assert_eq!(entry.schedule_interval_secs(), 5400);
    }

    #[test]
    fn registry_preserves_file_order_and_filters_disabled() {
        let toml_str = r#"
[[tasks]]
name = "zeta"
daily_limit = 2

[[tasks]]
name = "alpha"
enabled = false

[[tasks]]
name = "mid"
cooldown_hours = 12
command = ["echo", "hi"]

[tasks.config]
tone = "formal"
"#;
        let registry = TaskRegistry::from_toml_str(toml_str).unwrap();
        let names: Vec<&str> = registry.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);

        let enabled: Vec<&str> = registry.enabled().map(|e| e.name.as_str()).collect();
        assert_eq!(enabled, vec!["zeta", "mid"]);

        let mid = registry.get("mid").unwrap();
        assert_eq!(mid.command.as_deref(), Some(&["echo".to_owned(), "hi".to_owned()][..]));
        assert_eq!(mid.config["tone"], "formal");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let toml_str = r#"
[[tasks]]
name = "a"

[[tasks]]
name = "a"
"#;
        assert!(matches!(
            TaskRegistry::from_toml_str(toml_str),
            Err(HubError::Registry(_))
        ));
    }

    #[test]
    fn unreadable_registry_loads_empty() {
        let registry = TaskRegistry::load_or_empty(Path::new("/nonexistent/registry.toml"));
        assert!(registry.is_empty());
    }

    #[test]
    fn merged_config_overlays_defaults() {
        let mut defaults = serde_json::Map::new();
        defaults.insert("locale".into(), "en".into());
        defaults.insert("tone".into(), "casual".into());

        let mut entry = TaskRegistryEntry::new("t");
        entry.config.insert("tone".into(), "formal".into());

        let merged = entry.merged_config(&defaults);
        assert_eq!(merged["locale"], "en");
        assert_eq!(merged["tone"], "formal");
    }
}
