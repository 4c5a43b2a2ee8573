//! Engine error types

use std::path::PathBuf;

use thiserror::Error;

use crate::context::ContextId;

/// Errors surfaced by the task engine.
///
/// `Clone` because a single in-flight run is shared between every caller
/// awaiting it, and each of them receives the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// Two tasks registered under the same fully-qualified name
    #[error("Attempted to define task {0} more than once")]
    DuplicateTask(String),

    /// No task registered under this name
    #[error("No such task: {0}")]
    UnknownTask(String),

    /// Task-local storage looked up outside a forked execution context
    #[error("Invalid execution context: {0}")]
    InvalidContext(ContextId),

    /// A task invoked itself, directly or through other tasks
    #[error("Circular task dependency: {0}")]
    CircularDependency(String),

    /// A shell command exited unsuccessfully
    #[error("Command `{command}` failed with exit code {}", code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    CommandFailed { command: String, code: Option<i32> },

    /// A shell command could not be started
    #[error("Failed to spawn `{command}`: {message}")]
    CommandSpawn { command: String, message: String },

    /// A glob pattern was malformed or could not be expanded
    #[error("Invalid glob pattern '{pattern}': {message}")]
    Glob { pattern: String, message: String },

    /// Filesystem failure
    #[error("IO error on {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    /// A scheduled operation never ran
    #[error("Operation aborted: {0}")]
    Aborted(String),

    /// A task failed; `stack` is the chain of task invocations that led here
    #[error("[{stack}] {message}")]
    Failed { stack: String, message: String },
}

impl TaskError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Whether this error already records the invocation chain it came from
    pub fn carries_stack(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::CircularDependency(_))
    }
}

/// Errors reading or writing cache documents
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error
    #[error("Cache IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error
    #[error("Cache serialization error in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The document exists but has no entry for the task
    #[error("the task does not exist in cache")]
    NotCached,
}
