//! Brisk Tasks - Incremental task execution engine
//!
//! Tasks are named units of work scoped to a directory. Running a task
//! consults a persistent fingerprint of its last successful run and skips
//! the work when nothing it depended on has changed. A task's shell
//! commands, glob expansions and dependency runs are queued on a per-task
//! scheduler and execute in the order they were declared.

pub mod artifact;
pub mod cache;
pub mod context;
pub mod declared;
pub mod engine;
pub mod error;
pub mod hashing;
pub mod matcher;
pub mod registry;
pub mod reporter;
pub mod scheduler;
pub mod shell;
pub mod storage;
mod sync;
pub mod task;

pub use artifact::{Artifact, FileRecord};
pub use cache::{CacheOutcome, TaskCache, TaskDependencies, TaskInfo};
pub use context::{ContextArena, ContextId, ExecutionContext, TaskContext};
pub use declared::register_declarations;
pub use engine::{Engine, EngineOptions};
pub use error::{CacheError, TaskError};
pub use registry::TaskRegistry;
pub use reporter::{CollectingReporter, TaskEvent, TaskReporter, TaskReporterRegistry, TracingReporter};
pub use scheduler::{Scheduled, Scheduler};
pub use task::{RunOptions, Task, TaskFn, TaskResult};
