//! Task executor contract and the name → executor mapping.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use tracing::debug;

use crate::error::{HubError, Result};
use crate::registry::TaskRegistry;
use crate::state::TaskState;

/// Environment variable carrying the task name to a command executor.
pub const TASK_NAME_ENV: &str = "TASKHUB_TASK_NAME";

/// Environment variable carrying the merged task config as JSON.
pub const TASK_CONFIG_ENV: &str = "TASKHUB_TASK_CONFIG";

/// Everything an executor gets to know about the run it performs.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Registry name of the task.
    pub task_name: String,
    /// Hub task defaults overlaid with the task's own config.
    pub config: serde_json::Value,
    /// Span scoping every log line the executor emits to this run.
    pub span: tracing::Span,
    /// Task state as written when the run started.
    pub state: TaskState,
}

/// Successful executor result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutput {
    pub output: Option<String>,
    pub url: Option<String>,
}

/// Failed executor result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub error: String,
}

impl TaskFailure {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.error)
    }
}

/// A unit of task work. New tasks only need to implement this trait.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run the task once and report how it went.
    async fn execute(&self, context: TaskContext) -> std::result::Result<TaskOutput, TaskFailure>;
}

/// Mapping from task name to its executor.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn TaskExecutor>>,
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.executors.keys().collect();
        names.sort();
        f.debug_struct("ExecutorRegistry")
            .field("tasks", &names)
            .finish()
    }
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a [`CommandExecutor`] for every entry that names a command.
    pub fn from_commands(registry: &TaskRegistry) -> Self {
        let mut executors = Self::new();
        for entry in registry.entries() {
            if let Some(executor) = entry.command.as_deref().and_then(CommandExecutor::from_argv) {
                executors.register(&entry.name, Arc::new(executor));
            }
        }
        executors
    }

    /// Register (or replace) the executor for `task_name`.
    pub fn register(&mut self, task_name: impl Into<String>, executor: Arc<dyn TaskExecutor>) {
        self.executors.insert(task_name.into(), executor);
    }

    /// Executor for `task_name`.
    pub fn get(&self, task_name: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(task_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Check that every enabled task has an executor.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Executor` naming every enabled task without one.
    pub fn validate(&self, registry: &TaskRegistry) -> Result<()> {
        let missing: Vec<&str> = registry
            .enabled()
            .filter(|entry| !self.executors.contains_key(&entry.name))
            .map(|entry| entry.name.as_str())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(HubError::Executor(format!(
                "no executor for enabled tasks: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Runs a configured program as a child process.
///
/// The task name and merged config are passed through [`TASK_NAME_ENV`] and
/// [`TASK_CONFIG_ENV`]. Exit status 0 is success; stdout becomes the output,
/// except a `url:` line, which becomes the URL. On failure stderr (or the
/// exit status when stderr is empty) becomes the error.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from `[program, args...]`; `None` for an empty list.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

#[async_trait]
impl TaskExecutor for CommandExecutor {
    async fn execute(&self, context: TaskContext) -> std::result::Result<TaskOutput, TaskFailure> {
        debug!(program = %self.program, "spawning task command");

        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .env(TASK_NAME_ENV, &context.task_name)
            .env(TASK_CONFIG_ENV, context.config.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TaskFailure::new(format!("cannot run {}: {e}", self.program)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if output.status.success() {
            return Ok(parse_stdout(&stdout));
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        if stderr.is_empty() {
            Err(TaskFailure::new(format!("command exited with {}", output.status)))
        } else {
            Err(TaskFailure::new(stderr))
        }
    }
}

fn parse_stdout(stdout: &str) -> TaskOutput {
    let mut url = None;
    let mut lines = Vec::new();
    for line in stdout.lines() {
        match line.trim().strip_prefix("url:") {
            Some(rest) if url.is_none() => url = Some(rest.trim().to_owned()),
            _ => lines.push(line),
        }
    }
    let text = lines.join("\n").trim().to_owned();
    TaskOutput {
        output: (!text.is_empty()).then_some(text),
        url: url.filter(|u| !u.is_empty()),
    }
}
