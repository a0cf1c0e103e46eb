//! Taskhub: scheduled task orchestration with a self-healing overseer.
//!
//! A registry of named tasks is run once per orchestrator invocation, each
//! task gated by per-task admission rules (daily quota, cooldown, retry
//! ceiling). A separate overseer process watches the same persisted state.
//!
//! # Architecture
//!
//! - **State store**: the shared execution-state document, with daily
//!   rollover on load and locked read-modify-write updates
//! - **Admission gate**: pure allow/deny decision per task
//! - **History log**: bounded record of past executions
//! - **Orchestrator**: sequential run loop with a circuit breaker
//! - **Overseer**: periodic health checks and stuck-task recovery
//! - **Retention**: size caps, weekly aggregation, and log pruning

pub mod admission;
pub mod config;
pub mod error;
pub mod history;
pub mod hub_dirs;
pub mod learning;
pub mod lock;
pub mod logging;
pub mod orchestrator;
pub mod overseer;
pub mod persist;
pub mod registry;
pub mod retention;
pub mod review;
pub mod state;

pub use admission::{Admission, DenyReason, can_task_run, can_task_run_at};
pub use config::HubConfig;
pub use error::{HubError, Result};
pub use orchestrator::{Orchestrator, RunSummary};
pub use overseer::Overseer;
pub use registry::{TaskRegistry, TaskRegistryEntry};
pub use retention::Optimizer;
pub use state::{HubState, StateStore, TaskState};
