//! Task registry

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use brisk_core::task_fqn;
use tracing::debug;

use crate::error::TaskError;
use crate::sync::{read, write};
use crate::task::Task;

/// Every task of a build, keyed by fully-qualified name
#[derive(Debug)]
pub struct TaskRegistry {
    root: PathBuf,
    tasks: RwLock<HashMap<String, Arc<Task>>>,
}

impl TaskRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Build root that fully-qualified names are relative to
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn register(&self, task: Arc<Task>) -> Result<(), TaskError> {
        let mut tasks = write(&self.tasks);
        if tasks.contains_key(task.fqn()) {
            return Err(TaskError::DuplicateTask(task.fqn().to_string()));
        }
        debug!(
            fqn = task.fqn(),
            workdir = %task.workdir().display(),
            "registering task"
        );
        tasks.insert(task.fqn().to_string(), task);
        Ok(())
    }

    pub fn get(&self, fqn: &str) -> Option<Arc<Task>> {
        read(&self.tasks).get(fqn).cloned()
    }

    /// Look up the task `name` declared in `workdir`
    pub fn resolve(&self, workdir: &Path, name: &str) -> Option<Arc<Task>> {
        self.get(&task_fqn(&self.root, workdir, name))
    }

    /// All tasks, ordered by fully-qualified name
    pub fn tasks(&self) -> Vec<Arc<Task>> {
        let mut tasks: Vec<_> = read(&self.tasks).values().cloned().collect();
        tasks.sort_by(|a, b| a.fqn().cmp(b.fqn()));
        tasks
    }

    pub fn len(&self) -> usize {
        read(&self.tasks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextArena, TaskContext};
    use crate::task::TaskFn;
    use futures::FutureExt;

    fn noop() -> TaskFn {
        Arc::new(|_: TaskContext| async { Ok::<_, anyhow::Error>(None) }.boxed())
    }

    fn task(arena: &ContextArena, root: &Path, dir: &str, name: &str) -> Arc<Task> {
        let workdir = root.join(dir);
        Arc::new(Task::new(
            name,
            task_fqn(root, &workdir, name),
            workdir,
            None,
            noop(),
            arena.fork(),
        ))
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let arena = ContextArena::new();
        let root = Path::new("/repo");
        let registry = TaskRegistry::new(root);

        registry.register(task(&arena, root, "app", "build")).unwrap();
        let err = registry
            .register(task(&arena, root, "app", "build"))
            .unwrap_err();
        assert_eq!(err, TaskError::DuplicateTask("app/build".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_and_resolve() {
        let arena = ContextArena::new();
        let root = Path::new("/repo");
        let registry = TaskRegistry::new(root);
        registry.register(task(&arena, root, "", "lint")).unwrap();
        registry.register(task(&arena, root, "lib", "build")).unwrap();

        assert!(registry.get("lint").is_some());
        assert!(registry.get("lib/build").is_some());
        assert!(registry.get("app/build").is_none());

        let resolved = registry.resolve(Path::new("/repo/lib"), "build").unwrap();
        assert_eq!(resolved.fqn(), "lib/build");
    }

    #[test]
    fn test_tasks_are_sorted() {
        let arena = ContextArena::new();
        let root = Path::new("/repo");
        let registry = TaskRegistry::new(root);
        registry.register(task(&arena, root, "lib", "test")).unwrap();
        registry.register(task(&arena, root, "app", "build")).unwrap();
        registry.register(task(&arena, root, "lib", "build")).unwrap();

        let names: Vec<_> = registry.tasks().iter().map(|t| t.fqn().to_string()).collect();
        assert_eq!(names, vec!["app/build", "lib/build", "lib/test"]);
    }
}
