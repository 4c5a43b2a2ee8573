//! Tasks and their single-flight execution

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use brisk_core::config::DECLARATION_FILE_NAME;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::artifact::{Artifact, FileRecord};
use crate::cache::CacheOutcome;
use crate::context::{ContextId, ContextSlot, ExecutionContext, TaskContext};
use crate::engine::Engine;
use crate::error::TaskError;
use crate::hashing::hash_file;
use crate::reporter::TaskEvent;
use crate::sync::lock;

/// Body of a task
pub type TaskFn =
    Arc<dyn Fn(TaskContext) -> BoxFuture<'static, anyhow::Result<Option<Artifact>>> + Send + Sync>;

type PendingRun = Shared<BoxFuture<'static, Result<TaskResult, TaskError>>>;

/// Options for a single invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Do not record the invoked task as a dependency of the caller
    pub no_dependency: bool,
}

impl RunOptions {
    pub fn no_dependency() -> Self {
        Self {
            no_dependency: true,
        }
    }
}

/// Outcome of running a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    /// Declared outputs, if the task declared any
    pub outputs: Option<Artifact>,
    /// Input patterns the task registered
    pub inputs: Vec<String>,
    /// Whether the result was reused from the cache
    pub cached: bool,
}

/// A named unit of work declared in a directory
pub struct Task {
    name: String,
    fqn: String,
    workdir: PathBuf,
    description: Option<String>,
    func: TaskFn,
    context: ContextId,
    pending: Mutex<Option<PendingRun>>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("fqn", &self.fqn)
            .field("workdir", &self.workdir)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        fqn: impl Into<String>,
        workdir: impl Into<PathBuf>,
        description: Option<String>,
        func: TaskFn,
        context: ContextId,
    ) -> Self {
        Self {
            name: name.into(),
            fqn: fqn.into(),
            workdir: workdir.into(),
            description,
            func,
            context,
            pending: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fqn(&self) -> &str {
        &self.fqn
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn context_id(&self) -> ContextId {
        self.context
    }

    /// The declaration file whose hash keys this task's cache record
    pub fn declaration_path(&self) -> PathBuf {
        self.workdir.join(DECLARATION_FILE_NAME)
    }

    /// Whether a run of this task is in flight
    pub fn is_pending(&self) -> bool {
        lock(&self.pending).is_some()
    }

    /// Invoke the task on behalf of `caller`.
    ///
    /// Joins the in-flight run if there is one, so the task body runs at most
    /// once per episode no matter how many callers ask for it.
    pub(crate) fn invoke(
        self: Arc<Self>,
        engine: Arc<Engine>,
        caller: ExecutionContext,
        options: RunOptions,
    ) -> BoxFuture<'static, Result<TaskResult, TaskError>> {
        async move {
            if !options.no_dependency && !caller.is_root() {
                engine.record_dependency(&caller, &self).await?;
            }

            if caller.contains(&self.fqn) {
                let chain = caller.enter(&self).chain();
                return Err(TaskError::CircularDependency(chain));
            }

            let pending = {
                let mut slot = lock(&self.pending);
                match slot.as_ref() {
                    Some(run) => {
                        debug!(fqn = %self.fqn, "joining in-flight run");
                        engine.reporter().report(&TaskEvent::Joined {
                            fqn: self.fqn.clone(),
                        });
                        run.clone()
                    }
                    None => {
                        let exec = caller.enter(&self);
                        let run = Arc::clone(&self).start(engine.clone(), exec).boxed().shared();
                        *slot = Some(run.clone());
                        run
                    }
                }
            };

            pending.await
        }
        .boxed()
    }

    async fn start(
        self: Arc<Self>,
        engine: Arc<Engine>,
        exec: ExecutionContext,
    ) -> Result<TaskResult, TaskError> {
        let outcome = self.run_in_context(&engine, &exec).await;
        *lock(&self.pending) = None;
        outcome
    }

    async fn run_in_context(
        &self,
        engine: &Arc<Engine>,
        exec: &ExecutionContext,
    ) -> Result<TaskResult, TaskError> {
        let slot = engine.contexts().slot(exec.id)?;
        slot.scheduler.init();
        engine.reporter().report(&TaskEvent::Started {
            fqn: self.fqn.clone(),
        });

        if engine.options().use_cache {
            match engine.cache().lookup(engine.registry(), &self.workdir, &self.name).await {
                CacheOutcome::Hit { artifact, inputs } => {
                    slot.scheduler.finalize().await?;
                    info!(fqn = %self.fqn, "cache hit");
                    engine.reporter().report(&TaskEvent::CacheHit {
                        fqn: self.fqn.clone(),
                    });
                    return Ok(TaskResult {
                        outputs: artifact,
                        inputs,
                        cached: true,
                    });
                }
                CacheOutcome::Miss { reason } => {
                    info!(fqn = %self.fqn, %reason, "cache miss");
                    engine.reporter().report(&TaskEvent::CacheMiss {
                        fqn: self.fqn.clone(),
                        reason,
                    });
                }
            }
        }

        let started = Instant::now();
        let result = match self.execute(engine, &slot, exec).await {
            Ok(result) => Ok(result),
            // A failed scheduled operation takes precedence over the body's error.
            Err(err) => Err(slot.scheduler.abort().await.err().unwrap_or(err)),
        };

        match result {
            Ok(result) => {
                info!(fqn = %self.fqn, elapsed_ms = started.elapsed().as_millis() as u64, "task completed");
                engine.reporter().report(&TaskEvent::Completed {
                    fqn: self.fqn.clone(),
                    duration: started.elapsed(),
                });
                Ok(result)
            }
            Err(err) => {
                let err = if err.carries_stack() {
                    err
                } else {
                    TaskError::Failed {
                        stack: exec.chain(),
                        message: err.to_string(),
                    }
                };
                engine.reporter().report(&TaskEvent::Failed {
                    fqn: self.fqn.clone(),
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        engine: &Arc<Engine>,
        slot: &ContextSlot,
        exec: &ExecutionContext,
    ) -> Result<TaskResult, TaskError> {
        lock(&slot.storage).clear();

        let context = TaskContext::new(engine.clone(), exec.clone());
        let outputs = (self.func)(context).await.map_err(|e| into_task_error(e, exec))?;

        if let Some(artifact) = &outputs {
            let records = FileRecord::capture_all(&artifact.files).await?;
            lock(&slot.storage).add_output_files(&artifact.patterns, records);
        }

        slot.scheduler.finalize().await?;

        let declaration = self.declaration_path();
        let self_hash = match hash_file(&declaration).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!(fqn = %self.fqn, error = %e, "declaration file could not be hashed");
                String::new()
            }
        };

        let (info, inputs) = {
            let storage = lock(&slot.storage);
            (storage.as_task_info(self_hash), storage.input_patterns().to_vec())
        };
        if let Err(e) = engine.cache().save_task_info(&self.workdir, &self.name, &info) {
            warn!(fqn = %self.fqn, error = %e, "failed to save task cache");
        }

        Ok(TaskResult {
            outputs,
            inputs,
            cached: false,
        })
    }

    /// Pretty-printed cache record of this task
    pub fn dump_cache(&self, engine: &Engine) -> String {
        engine.cache().dump(&self.workdir, &self.name)
    }
}

fn into_task_error(err: anyhow::Error, exec: &ExecutionContext) -> TaskError {
    match err.downcast::<TaskError>() {
        Ok(err) => err,
        Err(other) => TaskError::Failed {
            stack: exec.chain(),
            message: format!("{:#}", other),
        },
    }
}
