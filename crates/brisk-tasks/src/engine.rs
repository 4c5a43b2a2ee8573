//! The build engine
//!
//! One [`Engine`] exists per build. It owns the task registry, the context
//! arena, the cache and the reporter, and is what task functions reach
//! through their [`TaskContext`].

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use brisk_core::config::{Config, DEFAULT_SHELL};
use brisk_core::{normalize_path, task_fqn};
use futures::FutureExt;
use tracing::{info, instrument, warn};

use crate::artifact::{Artifact, FileRecord};
use crate::cache::TaskCache;
use crate::context::{ContextArena, ExecutionContext, TaskContext};
use crate::error::TaskError;
use crate::hashing::hash_file;
use crate::matcher::match_patterns;
use crate::registry::TaskRegistry;
use crate::reporter::{TaskEvent, TaskReporter};
use crate::shell::run_command;
use crate::sync::lock;
use crate::task::{Task, TaskFn, TaskResult};

/// Options for an [`Engine`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Build root; fully-qualified task names are relative to it
    pub root_dir: PathBuf,
    /// Consult the cache before running a task
    pub use_cache: bool,
    /// Program shell commands are passed to with `-c`
    pub shell_program: String,
}

impl EngineOptions {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            use_cache: true,
            shell_program: DEFAULT_SHELL.to_string(),
        }
    }

    pub fn from_config(root_dir: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            root_dir: root_dir.into(),
            use_cache: config.cache.enabled,
            shell_program: config.shell.program.clone(),
        }
    }
}

/// Task registry, contexts, cache and reporter of one build
pub struct Engine {
    options: EngineOptions,
    registry: TaskRegistry,
    contexts: ContextArena,
    cache: TaskCache,
    reporter: Arc<dyn TaskReporter>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.options)
            .field("tasks", &self.registry.len())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(options: EngineOptions, cache: TaskCache, reporter: Arc<dyn TaskReporter>) -> Arc<Self> {
        let root = normalize_path(&options.root_dir);
        Arc::new(Self {
            registry: TaskRegistry::new(root.clone()),
            options: EngineOptions {
                root_dir: root,
                ..options
            },
            contexts: ContextArena::new(),
            cache,
            reporter,
        })
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &TaskCache {
        &self.cache
    }

    pub fn contexts(&self) -> &ContextArena {
        &self.contexts
    }

    pub fn reporter(&self) -> &Arc<dyn TaskReporter> {
        &self.reporter
    }

    /// Register a task named `name` in `workdir`. A relative `workdir` is
    /// taken relative to the build root.
    pub fn register<F, Fut>(&self, name: &str, workdir: impl AsRef<Path>, func: F) -> Result<Arc<Task>, TaskError>
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Artifact>>> + Send + 'static,
    {
        self.register_with_description(name, workdir, None, func)
    }

    pub fn register_with_description<F, Fut>(
        &self,
        name: &str,
        workdir: impl AsRef<Path>,
        description: Option<String>,
        func: F,
    ) -> Result<Arc<Task>, TaskError>
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Artifact>>> + Send + 'static,
    {
        let func: TaskFn = Arc::new(move |ctx| func(ctx).boxed());
        self.register_fn(name, workdir.as_ref(), description, func)
    }

    pub fn register_fn(
        &self,
        name: &str,
        workdir: &Path,
        description: Option<String>,
        func: TaskFn,
    ) -> Result<Arc<Task>, TaskError> {
        let workdir = normalize_path(&self.options.root_dir.join(workdir));
        let fqn = task_fqn(&self.options.root_dir, &workdir, name);

        let context = self.contexts.fork();
        let task = Arc::new(Task::new(name, fqn, workdir, description, func, context));
        if let Err(e) = self.registry.register(Arc::clone(&task)) {
            self.contexts.release(context);
            return Err(e);
        }
        Ok(task)
    }

    /// Run the task registered under `fqn`
    #[instrument(skip(self))]
    pub async fn run(self: &Arc<Self>, fqn: &str) -> Result<TaskResult, TaskError> {
        let task = self
            .registry
            .get(fqn)
            .ok_or_else(|| TaskError::UnknownTask(fqn.to_string()))?;
        self.run_task(&task).await
    }

    /// Run `task` from a fresh root context, outside of any other task.
    ///
    /// Cycles are detected along one invocation chain only. Two concurrent
    /// roots whose tasks depend on each other (`a` needing `b` while another
    /// root runs `b` needing `a`) each join the other's in-flight run and
    /// never complete, so concurrent roots must not overlap on a cycle.
    pub async fn run_task(self: &Arc<Self>, task: &Arc<Task>) -> Result<TaskResult, TaskError> {
        let id = self.contexts.fork();
        let root = ExecutionContext::root(id, self.options.root_dir.clone());
        let slot = self.contexts.slot(id)?;
        slot.scheduler.init();

        info!(fqn = task.fqn(), "running task");
        let result = TaskContext::new(Arc::clone(self), root).run(task).await;
        let drained = slot.scheduler.finalize().await;
        self.contexts.release(id);

        let result = result?;
        drained?;
        Ok(result)
    }

    /// Record `task` as a dependency of the task running in `caller`
    pub(crate) async fn record_dependency(
        &self,
        caller: &ExecutionContext,
        task: &Task,
    ) -> Result<(), TaskError> {
        let slot = self.contexts.slot(caller.id)?;
        let declaration = task.declaration_path();
        let hash = match hash_file(&declaration).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!(
                    dependency = task.fqn(),
                    error = %e,
                    "dependency declaration could not be hashed; the dependent task will not be cached"
                );
                String::new()
            }
        };
        lock(&slot.storage).add_task_dependency(task.workdir(), hash, task.name());
        Ok(())
    }

    pub(crate) async fn register_inputs(
        &self,
        exec: &ExecutionContext,
        patterns: &[String],
    ) -> Result<Vec<PathBuf>, TaskError> {
        let files = match_patterns(patterns, &exec.workdir)?;
        let records = FileRecord::capture_all(&files).await?;
        let slot = self.contexts.slot(exec.id)?;
        lock(&slot.storage).add_input_files(patterns, records);
        Ok(files)
    }

    pub(crate) fn collect_artifact(
        exec: &ExecutionContext,
        patterns: Vec<String>,
    ) -> Result<Artifact, TaskError> {
        let files = match_patterns(&patterns, &exec.workdir)?;
        Ok(Artifact::new(patterns, files))
    }

    pub(crate) async fn run_shell(&self, exec: &ExecutionContext, command: &str) -> Result<(), TaskError> {
        let fqn = exec.fqn();
        self.reporter.report(&TaskEvent::Command {
            fqn: fqn.to_string(),
            command: command.to_string(),
        });
        run_command(
            &self.options.shell_program,
            command,
            &exec.workdir,
            |line, is_stderr| {
                self.reporter.report(&TaskEvent::Output {
                    fqn: fqn.to_string(),
                    line: line.to_string(),
                    is_stderr,
                })
            },
        )
        .await
    }
}
