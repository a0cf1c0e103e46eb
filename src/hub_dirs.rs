//! Centralized directory paths for the task hub.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! # Directory Layout
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data (state, history, overseer docs) | `~/Library/Application Support/taskhub/` | `~/.local/share/taskhub/` |
//! | Config (`taskhub.toml`, `registry.toml`) | `~/Library/Application Support/taskhub/` | `~/.config/taskhub/` |
//!
//! # Environment Overrides
//!
//! - `TASKHUB_DATA_DIR`: overrides [`data_dir`]
//! - `TASKHUB_CONFIG_DIR`: overrides [`config_dir`]

use std::path::PathBuf;

/// Data root directory holding every persisted document.
///
/// Resolves to `dirs::data_dir()/taskhub/` by default. Override with
/// the `TASKHUB_DATA_DIR` environment variable.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TASKHUB_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("taskhub"))
        .unwrap_or_else(|| PathBuf::from("/tmp/taskhub-data"))
}

/// Config directory.
///
/// Resolves to `dirs::config_dir()/taskhub/` by default. Override with
/// the `TASKHUB_CONFIG_DIR` environment variable.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TASKHUB_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("taskhub"))
        .unwrap_or_else(|| PathBuf::from("/tmp/taskhub-config"))
}

/// Main config file path (`config_dir()/taskhub.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("taskhub.toml")
}

/// Task registry file path (`config_dir()/registry.toml`).
#[must_use]
pub fn registry_file() -> PathBuf {
    config_dir().join("registry.toml")
}

/// File names of the persisted documents inside the data directory.
pub mod files {
    /// Hub execution state.
    pub const STATE: &str = "state.json";
    /// Bounded execution history.
    pub const HISTORY: &str = "history.json";
    /// Overseer state.
    pub const OVERSEER_STATE: &str = "overseer-state.json";
    /// Bounded overseer log.
    pub const OVERSEER_LOG: &str = "overseer-log.json";
    /// Learning outcomes consumed by the optimizer.
    pub const LEARNING: &str = "learning.json";
    /// External review queue.
    pub const REVIEW_QUEUE: &str = "review-queue.json";
    /// Rolling log directory.
    pub const LOGS: &str = "logs";
}
