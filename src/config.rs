//! Configuration types for the orchestrator, overseer, and retention pass.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::history::DEFAULT_HISTORY_LIMIT;
use crate::hub_dirs::{self, files};

/// Top-level hub configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Where persisted documents and logs live.
    pub paths: PathsConfig,
    /// Orchestrator run-loop settings.
    pub orchestrator: OrchestratorConfig,
    /// Overseer monitor thresholds.
    pub overseer: OverseerConfig,
    /// Size caps and age limits for the retention pass.
    pub retention: RetentionConfig,
    /// Config values merged under every task's own `config` table.
    pub task_defaults: serde_json::Map<String, serde_json::Value>,
}

/// Filesystem locations. Unset entries resolve through [`crate::hub_dirs`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding state, history, overseer, and learning documents.
    pub data_dir: Option<PathBuf>,
    /// Task registry TOML file.
    pub registry_file: Option<PathBuf>,
    /// Review queue JSON file.
    pub review_queue_file: Option<PathBuf>,
    /// Directory for rolling log files.
    pub log_dir: Option<PathBuf>,
}

/// Orchestrator run-loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Cumulative failures within one run that halt the remaining tasks.
    pub circuit_breaker_threshold: u32,
    /// Raw history entries kept by the history log.
    pub history_max_entries: usize,
    /// How long to wait for the state lock before writing unlocked (ms).
    pub state_lock_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            circuit_breaker_threshold: 3,
            history_max_entries: DEFAULT_HISTORY_LIMIT,
            state_lock_timeout_ms: 2_000,
        }
    }
}

/// Overseer monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverseerConfig {
    /// Seconds between check cycles.
    pub check_interval_secs: u64,
    /// A running task older than this is reported as stuck.
    pub stuck_alert_minutes: i64,
    /// A running task older than this is reset when auto-recovery is enabled.
    pub stuck_reset_minutes: i64,
    /// Whether the overseer may clear stuck in-flight markers.
    pub auto_recovery: bool,
    /// Grace period past the expected next run before a schedule counts as missed.
    pub missed_schedule_grace_hours: i64,
    /// Pending review items older than this are stale.
    pub stale_review_hours: i64,
    /// Queue size at which the review queue itself is flagged.
    pub large_review_queue: usize,
    /// No history entry newer than this means the hub looks idle.
    pub no_activity_hours: i64,
    /// Number of recent history entries sampled for the failure rate.
    pub failure_rate_window: usize,
    /// Minimum sample size before the failure rate is judged.
    pub failure_rate_min_sample: usize,
    /// Failure fraction above which the rate is abnormal.
    pub failure_rate_threshold: f64,
    /// Number of recent history entries used for the summary success rate.
    pub success_rate_window: usize,
    /// Run the retention pass every N check cycles (0 disables).
    pub optimize_every_checks: u64,
    /// Raw overseer log entries kept between retention passes.
    pub log_max_entries: usize,
    /// Recent actions retained in the overseer state.
    pub recent_actions_limit: usize,
}

impl Default for OverseerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            stuck_alert_minutes: 30,
            stuck_reset_minutes: 60,
            auto_recovery: true,
            missed_schedule_grace_hours: 2,
            stale_review_hours: 24,
            large_review_queue: 5,
            no_activity_hours: 6,
            failure_rate_window: 20,
            failure_rate_min_sample: 5,
            failure_rate_threshold: 0.5,
            success_rate_window: 50,
            optimize_every_checks: 60,
            log_max_entries: 500,
            recent_actions_limit: 20,
        }
    }
}

/// Retention / compaction limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Raw learning outcomes kept; older ones fold into weekly aggregates.
    pub max_learning_outcomes: usize,
    /// Weekly aggregate buckets kept.
    pub max_weekly_aggregates: usize,
    /// Learning insights kept.
    pub max_insights: usize,
    /// Learning adjustments kept.
    pub max_adjustments: usize,
    /// Overseer log entries kept after compaction.
    pub max_overseer_log: usize,
    /// History entries kept after compaction.
    pub max_history: usize,
    /// Rotated log files older than this are deleted.
    pub log_max_age_days: u64,
    /// Log directory size that triggers an advisory warning.
    pub log_dir_warn_bytes: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_learning_outcomes: 500,
            max_weekly_aggregates: 52,
            max_insights: 50,
            max_adjustments: 100,
            max_overseer_log: 200,
            max_history: 200,
            log_max_age_days: 7,
            log_dir_warn_bytes: 10 * 1024 * 1024,
        }
    }
}

impl HubConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::HubError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| crate::HubError::Config(e.to_string()))
    }

    /// Load the configuration for a binary.
    ///
    /// An explicit `path` must be readable. Without one, the default config
    /// file is used when it exists, and built-in defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the chosen file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> crate::error::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Self::default_config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::HubError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        hub_dirs::config_file()
    }

    /// Configuration rooted at `data_dir`, used by tests and one-off tools.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.paths.data_dir = Some(data_dir.into());
        config
    }

    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.paths.data_dir.clone().unwrap_or_else(hub_dirs::data_dir)
    }

    /// Resolved task registry path.
    pub fn registry_file(&self) -> PathBuf {
        self.paths
            .registry_file
            .clone()
            .unwrap_or_else(hub_dirs::registry_file)
    }

    /// Resolved review queue path.
    pub fn review_queue_file(&self) -> PathBuf {
        self.paths
            .review_queue_file
            .clone()
            .unwrap_or_else(|| self.data_dir().join(files::REVIEW_QUEUE))
    }

    /// Resolved rolling-log directory.
    pub fn log_dir(&self) -> PathBuf {
        self.paths
            .log_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join(files::LOGS))
    }

    /// Hub state document.
    pub fn state_file(&self) -> PathBuf {
        self.data_dir().join(files::STATE)
    }

    /// History document.
    pub fn history_file(&self) -> PathBuf {
        self.data_dir().join(files::HISTORY)
    }

    /// Overseer state document.
    pub fn overseer_state_file(&self) -> PathBuf {
        self.data_dir().join(files::OVERSEER_STATE)
    }

    /// Overseer log document.
    pub fn overseer_log_file(&self) -> PathBuf {
        self.data_dir().join(files::OVERSEER_LOG)
    }

    /// Learning outcomes document.
    pub fn learning_file(&self) -> PathBuf {
        self.data_dir().join(files::LEARNING)
    }
}
