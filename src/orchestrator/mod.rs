//! Orchestrator: one sequential pass over the task registry.
//!
//! Each enabled task goes through the admission gate, is marked in flight,
//! handed to its [`TaskExecutor`], and has its outcome recorded in the state
//! store, the history log, and the learning recorder. A run-level circuit
//! breaker stops the pass after too many failures.

mod executor;
mod runner;

pub use executor::{
    CommandExecutor, ExecutorRegistry, TASK_CONFIG_ENV, TASK_NAME_ENV, TaskContext, TaskExecutor,
    TaskFailure, TaskOutput,
};
pub use runner::{Clock, Orchestrator, RunSummary, TaskReport, TaskRunStatus};
