//! Execution contexts
//!
//! Every task owns one slot in the [`ContextArena`], allocated when it is
//! registered. The slot holds the task's [`TaskStorage`] and [`Scheduler`].
//! The engine threads an [`ExecutionContext`] naming that slot through every
//! asynchronous call it makes on the task's behalf, so nothing depends on
//! ambient state such as the process working directory.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::artifact::Artifact;
use crate::engine::Engine;
use crate::error::TaskError;
use crate::scheduler::{Scheduled, Scheduler};
use crate::storage::TaskStorage;
use crate::sync::{read, write};
use crate::task::{RunOptions, Task, TaskResult};

/// Key of a slot in the [`ContextArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// State owned by one execution context
#[derive(Debug, Default)]
pub struct ContextSlot {
    pub storage: Mutex<TaskStorage>,
    pub scheduler: Scheduler,
}

/// Arena of context slots keyed by [`ContextId`]
#[derive(Debug, Default)]
pub struct ContextArena {
    next: AtomicU64,
    slots: RwLock<HashMap<ContextId, Arc<ContextSlot>>>,
}

impl ContextArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh slot
    pub fn fork(&self) -> ContextId {
        let id = ContextId(self.next.fetch_add(1, Ordering::Relaxed));
        write(&self.slots).insert(id, Arc::new(ContextSlot::default()));
        id
    }

    pub fn slot(&self, id: ContextId) -> Result<Arc<ContextSlot>, TaskError> {
        read(&self.slots)
            .get(&id)
            .cloned()
            .ok_or(TaskError::InvalidContext(id))
    }

    /// Free a slot. Returns whether it existed.
    pub fn release(&self, id: ContextId) -> bool {
        write(&self.slots).remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        read(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where an operation runs and on whose behalf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub id: ContextId,
    pub workdir: PathBuf,
    /// Fully-qualified names of the tasks being run, outermost first
    pub stack: Vec<String>,
}

impl ExecutionContext {
    /// The context a build starts in, outside of any task
    pub fn root(id: ContextId, workdir: PathBuf) -> Self {
        Self {
            id,
            workdir,
            stack: Vec::new(),
        }
    }

    /// Context of `task` invoked from `self`
    pub fn enter(&self, task: &Task) -> Self {
        let mut stack = self.stack.clone();
        stack.push(task.fqn().to_string());
        Self {
            id: task.context_id(),
            workdir: task.workdir().to_path_buf(),
            stack,
        }
    }

    pub fn is_root(&self) -> bool {
        self.stack.is_empty()
    }

    /// Fully-qualified name of the running task, empty at the root
    pub fn fqn(&self) -> &str {
        self.stack.last().map(String::as_str).unwrap_or("")
    }

    pub fn contains(&self, fqn: &str) -> bool {
        self.stack.iter().any(|entry| entry == fqn)
    }

    /// Human-readable invocation chain, `a > b > c`
    pub fn chain(&self) -> String {
        self.stack.join(" > ")
    }
}

/// Handle given to a task function.
///
/// Everything scheduled through it runs on the task's own queue, in the
/// order it was scheduled. Handles may be dropped without awaiting; a
/// failure still fails the task when the queue is finalized.
#[derive(Clone)]
pub struct TaskContext {
    engine: Arc<Engine>,
    exec: ExecutionContext,
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext").field("exec", &self.exec).finish()
    }
}

impl TaskContext {
    pub(crate) fn new(engine: Arc<Engine>, exec: ExecutionContext) -> Self {
        Self { engine, exec }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn execution(&self) -> &ExecutionContext {
        &self.exec
    }

    pub fn workdir(&self) -> &Path {
        &self.exec.workdir
    }

    pub fn fqn(&self) -> &str {
        self.exec.fqn()
    }

    /// Run `task` and record it as a dependency of this task
    pub fn run(&self, task: &Arc<Task>) -> Scheduled<TaskResult> {
        self.run_with(task, RunOptions::default())
    }

    pub fn run_with(&self, task: &Arc<Task>, options: RunOptions) -> Scheduled<TaskResult> {
        let invocation = Arc::clone(task).invoke(self.engine.clone(), self.exec.clone(), options);
        self.schedule(invocation)
    }

    /// Run a task looked up by fully-qualified name when its turn comes
    pub fn run_named(&self, fqn: &str, options: RunOptions) -> Scheduled<TaskResult> {
        let engine = self.engine.clone();
        let exec = self.exec.clone();
        let fqn = fqn.to_string();
        self.schedule(async move {
            let task = engine
                .registry()
                .get(&fqn)
                .ok_or(TaskError::UnknownTask(fqn))?;
            task.invoke(engine, exec, options).await
        })
    }

    /// Expand input patterns and record the matched files as inputs
    pub fn input_files(&self, patterns: Vec<String>) -> Scheduled<Vec<PathBuf>> {
        let engine = self.engine.clone();
        let exec = self.exec.clone();
        self.schedule(async move { engine.register_inputs(&exec, &patterns).await })
    }

    /// Expand output patterns into an [`Artifact`]
    pub fn artifact(&self, patterns: Vec<String>) -> Scheduled<Artifact> {
        let exec = self.exec.clone();
        self.schedule(async move { Engine::collect_artifact(&exec, patterns) })
    }

    /// Run a shell command in the task's directory
    pub fn shell(&self, command: impl Into<String>) -> Scheduled<()> {
        let engine = self.engine.clone();
        let exec = self.exec.clone();
        let command = command.into();
        self.schedule(async move { engine.run_shell(&exec, &command).await })
    }

    /// Schedule arbitrary work on this task's queue
    pub fn schedule<T, F>(&self, op: F) -> Scheduled<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        match self.engine.contexts().slot(self.exec.id) {
            Ok(slot) => slot.scheduler.schedule(op),
            Err(e) => Scheduled::failed(e),
        }
    }
}
