//! Loading the build a command operates on

use std::path::{Path, PathBuf};
use std::sync::Arc;

use brisk_core::config::{build_root, load_config_or_default, Config};
use brisk_core::discover_declarations;
use brisk_tasks::{register_declarations, Engine, EngineOptions, Task, TaskCache, TaskError, TaskReporter};
use tracing::debug;

/// Configuration, build root and engine with every declared task registered
pub struct Project {
    pub config: Config,
    pub config_path: Option<PathBuf>,
    /// Directory the command was invoked in
    pub invoked_in: PathBuf,
    pub engine: Arc<Engine>,
}

impl Project {
    pub fn load(dir: &Path, reporter: Arc<dyn TaskReporter>) -> anyhow::Result<Self> {
        Self::load_with(dir, reporter, |_| {})
    }

    /// Load, letting `adjust` override engine options before the engine is built
    pub fn load_with(
        dir: &Path,
        reporter: Arc<dyn TaskReporter>,
        adjust: impl FnOnce(&mut EngineOptions),
    ) -> anyhow::Result<Self> {
        let (config, config_path) = load_config_or_default(dir)?;
        let root = build_root(dir, config_path.as_deref());
        debug!(root = %root.display(), "loading build");

        let mut options = EngineOptions::from_config(&root, &config);
        adjust(&mut options);
        let engine = Engine::new(options, TaskCache::new(config.cache.root()), reporter);

        let files = discover_declarations(&root, &config.discovery.ignore)?;
        register_declarations(&engine, &files)?;

        Ok(Self {
            config,
            config_path,
            invoked_in: dir.to_path_buf(),
            engine,
        })
    }

    pub fn root(&self) -> &Path {
        &self.engine.options().root_dir
    }

    /// Find a task by fully-qualified name, falling back to a task of that
    /// name declared in the invocation directory
    pub fn task(&self, name: &str) -> Result<Arc<Task>, TaskError> {
        let registry = self.engine.registry();
        registry
            .get(name)
            .or_else(|| registry.resolve(&self.invoked_in, name))
            .ok_or_else(|| TaskError::UnknownTask(name.to_string()))
    }
}
