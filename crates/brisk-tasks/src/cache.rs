//! Persistent task fingerprints and staleness detection
//!
//! Each working directory gets one JSON document under the cache root
//! mapping task names to the [`TaskInfo`] recorded by their last successful
//! run. [`TaskCache::lookup`] decides from that record whether a task can be
//! skipped. The checks run in a fixed order and the first one that fails
//! names the reason for the miss.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use brisk_core::config::{default_cache_root, DECLARATION_FILE_NAME};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::artifact::{Artifact, FileRecord};
use crate::error::{CacheError, TaskError};
use crate::hashing::{file_exists, hash_file};
use crate::matcher::{literal_pattern, match_patterns};
use crate::registry::TaskRegistry;

/// Declaration hash and task names recorded for one dependency directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDependencies {
    /// Hash of the directory's declaration file
    pub hash: String,
    /// Tasks of that directory the dependent task ran
    pub tasks: Vec<String>,
}

/// Fingerprint of a task's last successful run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub self_hash: String,
    pub input_patterns: Vec<String>,
    pub input_files: Vec<FileRecord>,
    pub output_patterns: Vec<String>,
    pub output_files: Vec<FileRecord>,
    pub task_dependencies: BTreeMap<PathBuf, TaskDependencies>,
}

type CacheDocument = BTreeMap<String, TaskInfo>;

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    /// The recorded run is still valid
    Hit {
        artifact: Option<Artifact>,
        inputs: Vec<String>,
    },
    /// The task has to run; `reason` says which check failed
    Miss { reason: String },
}

impl CacheOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }

    fn miss(reason: impl Into<String>) -> Self {
        Self::Miss {
            reason: reason.into(),
        }
    }
}

/// Store of per-directory cache documents
#[derive(Debug, Clone)]
pub struct TaskCache {
    root: PathBuf,
}

impl Default for TaskCache {
    fn default() -> Self {
        Self::new(default_cache_root())
    }
}

impl TaskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the document for `workdir`: the workdir's own path
    /// mirrored under the cache root, with a `.json` extension.
    pub fn document_path(&self, workdir: &Path) -> PathBuf {
        let mirrored: PathBuf = workdir
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        let mut path = if mirrored.as_os_str().is_empty() {
            self.root.join("_")
        } else {
            self.root.join(mirrored)
        }
        .into_os_string();
        path.push(".json");
        PathBuf::from(path)
    }

    fn load_document(&self, workdir: &Path) -> Result<CacheDocument, CacheError> {
        let path = self.document_path(workdir);
        let content = fs::read_to_string(&path).map_err(|source| CacheError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| CacheError::Json { path, source })
    }

    /// Stored record of `name` in `workdir`
    pub fn task_info(&self, workdir: &Path, name: &str) -> Result<TaskInfo, CacheError> {
        self.load_document(workdir)?
            .remove(name)
            .ok_or(CacheError::NotCached)
    }

    /// Replace the record of `name`, keeping the other tasks of the document.
    /// An unreadable document is started over.
    pub fn save_task_info(&self, workdir: &Path, name: &str, info: &TaskInfo) -> Result<(), CacheError> {
        let mut document = match self.load_document(workdir) {
            Ok(document) => document,
            Err(e) => {
                debug!(workdir = %workdir.display(), error = %e, "starting a new cache document");
                CacheDocument::new()
            }
        };
        document.insert(name.to_string(), info.clone());

        let path = self.document_path(workdir);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string(&document).map_err(|source| CacheError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(|source| CacheError::Io { path, source })
    }

    /// Delete the document of `workdir`. Returns whether one existed.
    pub fn clear(&self, workdir: &Path) -> Result<bool, CacheError> {
        let path = self.document_path(workdir);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "cache cleared");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }

    /// Pretty JSON of the stored record, or of the reason there is none
    pub fn dump(&self, workdir: &Path, name: &str) -> String {
        let value = match self.task_info(workdir, name) {
            Ok(info) => serde_json::to_value(info),
            Err(e) => Ok(serde_json::json!({ "error": e.to_string() })),
        };
        value
            .and_then(|v| serde_json::to_string_pretty(&v))
            .unwrap_or_else(|e| e.to_string())
    }

    /// Decide whether the recorded run of `name` in `workdir` can be reused
    #[instrument(skip(self, registry, workdir), fields(workdir = %workdir.display()))]
    pub async fn lookup(&self, registry: &TaskRegistry, workdir: &Path, name: &str) -> CacheOutcome {
        let mut visiting = Vec::new();
        self.evaluate(registry, workdir, name, &mut visiting).await
    }

    fn evaluate<'a>(
        &'a self,
        registry: &'a TaskRegistry,
        workdir: &'a Path,
        name: &'a str,
        visiting: &'a mut Vec<(PathBuf, String)>,
    ) -> BoxFuture<'a, CacheOutcome> {
        async move {
            let key = (workdir.to_path_buf(), name.to_string());
            if visiting.contains(&key) {
                return CacheOutcome::miss(format!(
                    "circular task dependency on \"{}\" in {}",
                    name,
                    workdir.display()
                ));
            }

            visiting.push(key);
            let outcome = self.check(registry, workdir, name, visiting).await;
            visiting.pop();

            debug!(workdir = %workdir.display(), task = name, hit = outcome.is_hit(), "evaluated task cache");
            outcome
        }
        .boxed()
    }

    async fn check(
        &self,
        registry: &TaskRegistry,
        workdir: &Path,
        name: &str,
        visiting: &mut Vec<(PathBuf, String)>,
    ) -> CacheOutcome {
        let info = match self.task_info(workdir, name) {
            Ok(info) => info,
            Err(e) => {
                return CacheOutcome::miss(format!(
                    "task cache data could not be loaded because {}.",
                    e
                ))
            }
        };

        if info.input_patterns.is_empty() && info.task_dependencies.is_empty() {
            return CacheOutcome::miss("this task has neither file inputs nor task dependencies");
        }

        if !info.output_patterns.is_empty() && info.output_files.is_empty() {
            return CacheOutcome::miss(
                "this task has declared some outputs but the last run did not generate any output",
            );
        }

        match hash_file(&workdir.join(DECLARATION_FILE_NAME)).await {
            Ok(hash) if hash == info.self_hash => {}
            Ok(_) => {
                return CacheOutcome::miss(
                    "the declaration file containing this task definition has changed.",
                )
            }
            Err(e) => {
                return CacheOutcome::miss(format!(
                    "the declaration file hash could not be computed: {}",
                    e
                ))
            }
        }

        match file_set_differs(&info.input_patterns, &info.input_files, workdir) {
            Ok(false) => {}
            Ok(true) => return CacheOutcome::miss("the set of matching input files has changed."),
            Err(e) => {
                return CacheOutcome::miss(format!(
                    "the set of input files could not be computed: {}",
                    e
                ))
            }
        }

        for file in &info.input_files {
            match file.has_changed().await {
                Ok(false) => {}
                Ok(true) => {
                    return CacheOutcome::miss(format!(
                        "the file \"{}\" has changed since the last successful run of this task.",
                        file.path.display()
                    ))
                }
                Err(e) => {
                    return CacheOutcome::miss(format!(
                        "an error occurred while checking whether the input files changed: {}",
                        e
                    ))
                }
            }
        }

        match file_set_differs(&info.output_patterns, &info.output_files, workdir) {
            Ok(false) => {}
            Ok(true) => {
                return CacheOutcome::miss(format!(
                    "the set of matching output files has changed.\nworkdir: {}\npatterns: {}",
                    workdir.display(),
                    info.output_patterns.join(", ")
                ))
            }
            Err(e) => {
                return CacheOutcome::miss(format!(
                    "the set of output files could not be computed: {}",
                    e
                ))
            }
        }

        for file in &info.output_files {
            match file.has_changed().await {
                Ok(false) => {}
                Ok(true) => {
                    return CacheOutcome::miss(format!(
                        "output file \"{}\" has changed since the last successful run of this task.",
                        file.path.display()
                    ))
                }
                Err(e) => {
                    return CacheOutcome::miss(format!(
                        "an error occurred while checking whether the output files changed: {}",
                        e
                    ))
                }
            }
        }

        for (dependency_dir, dependencies) in &info.task_dependencies {
            if let Some(reason) = self
                .dependency_staleness(registry, dependency_dir, dependencies, visiting)
                .await
            {
                return CacheOutcome::miss(format!(
                    "some task dependencies are out of date: {}",
                    reason
                ));
            }
        }

        let artifact = if info.output_patterns.is_empty() {
            None
        } else {
            let recorded: Vec<String> = info
                .output_files
                .iter()
                .map(|f| literal_pattern(&f.path))
                .collect();
            match match_patterns(&recorded, workdir) {
                Ok(files) => Some(Artifact::new(info.output_patterns.clone(), files)),
                Err(e) => {
                    return CacheOutcome::miss(format!(
                        "the final set of output files could not be gathered: {}",
                        e
                    ))
                }
            }
        };

        CacheOutcome::Hit {
            artifact,
            inputs: info.input_patterns,
        }
    }

    /// Why the tasks recorded for `dependency_dir` must re-run, if they must
    async fn dependency_staleness(
        &self,
        registry: &TaskRegistry,
        dependency_dir: &Path,
        dependencies: &TaskDependencies,
        visiting: &mut Vec<(PathBuf, String)>,
    ) -> Option<String> {
        let declaration = dependency_dir.join(DECLARATION_FILE_NAME);
        let listing = format!(
            "This declaration file contains the following dependencies: {}",
            dependencies.tasks.join(", ")
        );

        match file_exists(&declaration).await {
            Ok(true) => {}
            Ok(false) => {
                return Some(format!(
                    "declaration file \"{}\" does not exist.\n{}",
                    declaration.display(),
                    listing
                ))
            }
            Err(e) => {
                return Some(format!(
                    "an error occurred while reading declaration file \"{}\": {}\n{}",
                    declaration.display(),
                    e,
                    listing
                ))
            }
        }

        match hash_file(&declaration).await {
            Ok(hash) if hash == dependencies.hash => {}
            Ok(_) => {
                return Some(format!(
                    "declaration file \"{}\" has changed.\n{}",
                    declaration.display(),
                    listing
                ))
            }
            Err(e) => {
                return Some(format!(
                    "it could not be determined whether declaration file \"{}\" has changed: {}\n{}",
                    declaration.display(),
                    e,
                    listing
                ))
            }
        }

        for name in &dependencies.tasks {
            let Some(task) = registry.resolve(dependency_dir, name) else {
                return Some(format!("task \"{}\" could not be found.", name));
            };
            if let CacheOutcome::Miss { reason } = self
                .evaluate(registry, task.workdir(), task.name(), visiting)
                .await
            {
                return Some(format!("task \"{}\" must re-run because {}", task.fqn(), reason));
            }
        }

        None
    }
}

/// Whether expanding `patterns` now yields a different set of files than
/// was recorded. Order and duplicates do not matter.
pub fn file_set_differs(
    patterns: &[String],
    recorded: &[FileRecord],
    workdir: &Path,
) -> Result<bool, TaskError> {
    let current: BTreeSet<PathBuf> = match_patterns(patterns, workdir)?.into_iter().collect();
    let recorded: BTreeSet<PathBuf> = recorded.iter().map(|f| f.path.clone()).collect();
    Ok(current != recorded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    async fn record(path: &Path) -> FileRecord {
        FileRecord::capture(path).await.unwrap()
    }

    struct Fixture {
        _temp: TempDir,
        project: PathBuf,
        cache: TaskCache,
        registry: TaskRegistry,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        write(&project, DECLARATION_FILE_NAME, "[tasks.build]\n");
        let cache = TaskCache::new(temp.path().join("cache"));
        let registry = TaskRegistry::new(&project);
        Fixture {
            _temp: temp,
            project,
            cache,
            registry,
        }
    }

    async fn fresh_info(project: &Path, input: &Path) -> TaskInfo {
        TaskInfo {
            self_hash: hash_file(&project.join(DECLARATION_FILE_NAME)).await.unwrap(),
            input_patterns: vec!["src/*.txt".to_string()],
            input_files: vec![record(input).await],
            ..TaskInfo::default()
        }
    }

    #[test]
    fn test_document_path_mirrors_workdir() {
        let cache = TaskCache::new("/tmp/brisk");
        assert_eq!(
            cache.document_path(Path::new("/repo/app")),
            PathBuf::from("/tmp/brisk/repo/app.json")
        );
        assert_eq!(
            cache.document_path(Path::new("/")),
            PathBuf::from("/tmp/brisk/_.json")
        );
    }

    #[test]
    fn test_save_merges_tasks_of_a_document() {
        let f = fixture();
        let build = TaskInfo {
            self_hash: "b".to_string(),
            ..TaskInfo::default()
        };
        let test = TaskInfo {
            self_hash: "t".to_string(),
            ..TaskInfo::default()
        };

        f.cache.save_task_info(&f.project, "build", &build).unwrap();
        f.cache.save_task_info(&f.project, "test", &test).unwrap();

        assert_eq!(f.cache.task_info(&f.project, "build").unwrap(), build);
        assert_eq!(f.cache.task_info(&f.project, "test").unwrap(), test);
        assert!(matches!(
            f.cache.task_info(&f.project, "lint"),
            Err(CacheError::NotCached)
        ));
    }

    #[test]
    fn test_document_is_minified_camel_case() {
        let f = fixture();
        f.cache
            .save_task_info(&f.project, "build", &TaskInfo::default())
            .unwrap();

        let raw = fs::read_to_string(f.cache.document_path(&f.project)).unwrap();
        assert!(!raw.contains('\n'));
        assert!(raw.contains("\"selfHash\""));
        assert!(raw.contains("\"taskDependencies\""));
    }

    #[test]
    fn test_corrupt_document_is_not_fatal() {
        let f = fixture();
        let path = f.cache.document_path(&f.project);
        write(path.parent().unwrap(), path.file_name().unwrap().to_str().unwrap(), "{not json");

        assert!(matches!(
            f.cache.task_info(&f.project, "build"),
            Err(CacheError::Json { .. })
        ));
        f.cache
            .save_task_info(&f.project, "build", &TaskInfo::default())
            .unwrap();
        assert!(f.cache.task_info(&f.project, "build").is_ok());
    }

    #[test]
    fn test_clear() {
        let f = fixture();
        assert!(!f.cache.clear(&f.project).unwrap());
        f.cache
            .save_task_info(&f.project, "build", &TaskInfo::default())
            .unwrap();
        assert!(f.cache.clear(&f.project).unwrap());
        assert!(f.cache.task_info(&f.project, "build").is_err());
    }

    #[test]
    fn test_dump() {
        let f = fixture();
        assert!(f.cache.dump(&f.project, "build").contains("\"error\""));

        f.cache
            .save_task_info(&f.project, "build", &TaskInfo::default())
            .unwrap();
        let dumped = f.cache.dump(&f.project, "build");
        assert!(dumped.contains("\"selfHash\": \"\""));
    }

    #[tokio::test]
    async fn test_missing_record_is_a_miss() {
        let f = fixture();
        match f.cache.lookup(&f.registry, &f.project, "build").await {
            CacheOutcome::Miss { reason } => assert!(reason.contains("could not be loaded")),
            hit => panic!("unexpected {:?}", hit),
        }
    }

    #[tokio::test]
    async fn test_task_without_inputs_or_dependencies_never_hits() {
        let f = fixture();
        let info = TaskInfo {
            self_hash: hash_file(&f.project.join(DECLARATION_FILE_NAME)).await.unwrap(),
            ..TaskInfo::default()
        };
        f.cache.save_task_info(&f.project, "build", &info).unwrap();

        match f.cache.lookup(&f.registry, &f.project, "build").await {
            CacheOutcome::Miss { reason } => assert!(reason.contains("neither file inputs")),
            hit => panic!("unexpected {:?}", hit),
        }
    }

    #[tokio::test]
    async fn test_declared_outputs_without_files_never_hit() {
        let f = fixture();
        let input = write(&f.project, "src/a.txt", "a");
        let mut info = fresh_info(&f.project, &input).await;
        info.output_patterns = vec!["dist/*".to_string()];
        f.cache.save_task_info(&f.project, "build", &info).unwrap();

        match f.cache.lookup(&f.registry, &f.project, "build").await {
            CacheOutcome::Miss { reason } => assert!(reason.contains("did not generate any output")),
            hit => panic!("unexpected {:?}", hit),
        }
    }

    #[tokio::test]
    async fn test_input_change_is_a_miss_naming_the_file() {
        let f = fixture();
        let input = write(&f.project, "src/a.txt", "a");
        let info = fresh_info(&f.project, &input).await;
        f.cache.save_task_info(&f.project, "build", &info).unwrap();

        let hit = f.cache.lookup(&f.registry, &f.project, "build").await;
        assert_eq!(
            hit,
            CacheOutcome::Hit {
                artifact: None,
                inputs: vec!["src/*.txt".to_string()],
            }
        );

        fs::write(&input, "b").unwrap();
        match f.cache.lookup(&f.registry, &f.project, "build").await {
            CacheOutcome::Miss { reason } => {
                assert!(reason.contains(&input.display().to_string()), "{}", reason)
            }
            hit => panic!("unexpected {:?}", hit),
        }
    }

    #[tokio::test]
    async fn test_new_input_file_is_a_miss() {
        let f = fixture();
        let input = write(&f.project, "src/a.txt", "a");
        let info = fresh_info(&f.project, &input).await;
        f.cache.save_task_info(&f.project, "build", &info).unwrap();

        write(&f.project, "src/b.txt", "b");
        match f.cache.lookup(&f.registry, &f.project, "build").await {
            CacheOutcome::Miss { reason } => assert!(reason.contains("input files has changed")),
            hit => panic!("unexpected {:?}", hit),
        }
    }

    #[tokio::test]
    async fn test_declaration_change_is_a_miss() {
        let f = fixture();
        let input = write(&f.project, "src/a.txt", "a");
        let info = fresh_info(&f.project, &input).await;
        f.cache.save_task_info(&f.project, "build", &info).unwrap();

        write(&f.project, DECLARATION_FILE_NAME, "[tasks.build]\nrun = [\"true\"]\n");
        match f.cache.lookup(&f.registry, &f.project, "build").await {
            CacheOutcome::Miss { reason } => assert!(reason.contains("declaration file")),
            hit => panic!("unexpected {:?}", hit),
        }
    }

    #[tokio::test]
    async fn test_hit_reconstructs_outputs() {
        let f = fixture();
        let input = write(&f.project, "src/a.txt", "a");
        let out = write(&f.project, "dist/a.out", "compiled");
        let mut info = fresh_info(&f.project, &input).await;
        info.output_patterns = vec!["dist/*.out".to_string()];
        info.output_files = vec![record(&out).await];
        f.cache.save_task_info(&f.project, "build", &info).unwrap();

        match f.cache.lookup(&f.registry, &f.project, "build").await {
            CacheOutcome::Hit { artifact, .. } => {
                assert_eq!(
                    artifact,
                    Some(Artifact::new(vec!["dist/*.out".to_string()], vec![out.clone()]))
                );
            }
            miss => panic!("unexpected {:?}", miss),
        }

        fs::write(&out, "tampered").unwrap();
        match f.cache.lookup(&f.registry, &f.project, "build").await {
            CacheOutcome::Miss { reason } => assert!(reason.starts_with("output file")),
            hit => panic!("unexpected {:?}", hit),
        }
    }

    #[tokio::test]
    async fn test_missing_dependency_declaration_is_a_miss() {
        let f = fixture();
        let gone = f.project.join("gone");
        let mut info = TaskInfo {
            self_hash: hash_file(&f.project.join(DECLARATION_FILE_NAME)).await.unwrap(),
            ..TaskInfo::default()
        };
        info.task_dependencies.insert(
            gone.clone(),
            TaskDependencies {
                hash: "x".to_string(),
                tasks: vec!["build".to_string()],
            },
        );
        f.cache.save_task_info(&f.project, "build", &info).unwrap();

        match f.cache.lookup(&f.registry, &f.project, "build").await {
            CacheOutcome::Miss { reason } => {
                assert!(reason.contains("does not exist"));
                assert!(reason.contains("following dependencies: build"));
            }
            hit => panic!("unexpected {:?}", hit),
        }
    }

    #[test]
    fn test_file_set_comparison_ignores_order() {
        let temp = TempDir::new().unwrap();
        let a = write(temp.path(), "a.txt", "a");
        let b = write(temp.path(), "b.txt", "b");
        let recorded = |paths: &[&PathBuf]| -> Vec<FileRecord> {
            paths
                .iter()
                .map(|p| FileRecord {
                    path: (*p).clone(),
                    hash: String::new(),
                })
                .collect()
        };
        let patterns = vec!["*.txt".to_string()];

        assert!(!file_set_differs(&patterns, &recorded(&[&a, &b]), temp.path()).unwrap());
        assert!(!file_set_differs(&patterns, &recorded(&[&b, &a]), temp.path()).unwrap());
        assert!(file_set_differs(&patterns, &recorded(&[&a]), temp.path()).unwrap());
    }

    #[tokio::test]
    async fn test_mutually_dependent_records_are_a_miss() {
        use crate::context::{ContextArena, TaskContext};
        use crate::task::{Task, TaskFn};
        use std::sync::Arc;

        let f = fixture();
        let arena = ContextArena::new();
        let noop: TaskFn =
            Arc::new(|_: TaskContext| async { Ok::<_, anyhow::Error>(None) }.boxed());

        let dirs = [f.project.join("a"), f.project.join("b")];
        for dir in &dirs {
            write(dir, DECLARATION_FILE_NAME, "[tasks.build]\n");
            let fqn = brisk_core::task_fqn(&f.project, dir, "build");
            let task = Task::new("build", fqn, dir.clone(), None, noop.clone(), arena.fork());
            f.registry.register(Arc::new(task)).unwrap();
        }

        for (dir, other) in [(&dirs[0], &dirs[1]), (&dirs[1], &dirs[0])] {
            let mut info = TaskInfo {
                self_hash: hash_file(&dir.join(DECLARATION_FILE_NAME)).await.unwrap(),
                ..TaskInfo::default()
            };
            info.task_dependencies.insert(
                other.clone(),
                TaskDependencies {
                    hash: hash_file(&other.join(DECLARATION_FILE_NAME)).await.unwrap(),
                    tasks: vec!["build".to_string()],
                },
            );
            f.cache.save_task_info(dir, "build", &info).unwrap();
        }

        match f.cache.lookup(&f.registry, &dirs[0], "build").await {
            CacheOutcome::Miss { reason } => {
                assert!(reason.contains("task \"b/build\" must re-run"), "{}", reason);
                assert!(reason.contains("circular task dependency"), "{}", reason);
            }
            hit => panic!("unexpected {:?}", hit),
        }
    }
}
