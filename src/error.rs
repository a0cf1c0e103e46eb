//! Error types for the task hub.

/// Top-level error type for orchestration, state, and overseer operations.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// Task registry could not be loaded or is inconsistent with the executors.
    #[error("registry error: {0}")]
    Registry(String),

    /// Execution-state document error (read, parse, lock, write).
    #[error("state error: {0}")]
    State(String),

    /// Task executor failed outside of a normal failure outcome.
    #[error("executor error: {0}")]
    Executor(String),

    /// Review queue could not be read.
    #[error("review queue error: {0}")]
    Review(String),

    /// Overseer lifecycle error.
    #[error("overseer error: {0}")]
    Overseer(String),

    /// Retention / compaction error.
    #[error("retention error: {0}")]
    Retention(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, HubError>;
