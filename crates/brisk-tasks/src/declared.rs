//! Tasks declared in `make.toml` files

use std::path::Path;
use std::sync::Arc;

use brisk_core::{DeclarationFile, TaskDeclaration};
use futures::FutureExt;
use tracing::{debug, info};

use crate::context::TaskContext;
use crate::engine::Engine;
use crate::error::TaskError;
use crate::task::{RunOptions, Task, TaskFn};

/// A declaration with its dependency references resolved to fqns
#[derive(Debug, Clone, PartialEq, Eq)]
struct DeclaredTask {
    depends: Vec<(String, RunOptions)>,
    inputs: Vec<String>,
    run: Vec<String>,
    outputs: Vec<String>,
}

impl DeclaredTask {
    fn resolve(root: &Path, workdir: &Path, declaration: &TaskDeclaration) -> Self {
        let depends = declaration
            .depends
            .iter()
            .map(|dep| {
                let options = RunOptions {
                    no_dependency: dep.no_dependency(),
                };
                (dep.resolve_fqn(root, workdir), options)
            })
            .collect();

        Self {
            depends,
            inputs: declaration.inputs.clone(),
            run: declaration.run.clone(),
            outputs: declaration.outputs.clone(),
        }
    }

    fn into_fn(self) -> TaskFn {
        let declared = Arc::new(self);
        Arc::new(move |ctx: TaskContext| {
            let declared = Arc::clone(&declared);
            async move {
                for (fqn, options) in &declared.depends {
                    ctx.run_named(fqn, *options);
                }
                if !declared.inputs.is_empty() {
                    ctx.input_files(declared.inputs.clone());
                }
                for command in &declared.run {
                    ctx.shell(command.as_str());
                }
                if declared.outputs.is_empty() {
                    return Ok(None);
                }
                let artifact = ctx.artifact(declared.outputs.clone()).await?;
                Ok(Some(artifact))
            }
            .boxed()
        })
    }
}

/// Register every task of `files` with `engine`.
///
/// Fails on a duplicate name or on a `depends` entry naming a task that is
/// not declared anywhere.
pub fn register_declarations(
    engine: &Engine,
    files: &[DeclarationFile],
) -> Result<Vec<Arc<Task>>, TaskError> {
    let root = engine.options().root_dir.clone();
    let mut registered = Vec::new();
    let mut references = Vec::new();

    for file in files {
        for (name, declaration) in &file.tasks {
            let declared = DeclaredTask::resolve(&root, &file.workdir, declaration);
            references.extend(declared.depends.iter().map(|(fqn, _)| fqn.clone()));

            let task = engine.register_fn(
                name,
                &file.workdir,
                declaration.description.clone(),
                declared.into_fn(),
            )?;
            debug!(fqn = task.fqn(), path = %file.path.display(), "registered declared task");
            registered.push(task);
        }
    }

    if let Some(missing) = references
        .into_iter()
        .find(|fqn| engine.registry().get(fqn).is_none())
    {
        return Err(TaskError::UnknownTask(missing));
    }

    info!(count = registered.len(), "registered declared tasks");
    Ok(registered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TaskCache;
    use crate::engine::EngineOptions;
    use crate::reporter::CollectingReporter;
    use brisk_core::{discover_declarations, DependencyRef};
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn engine_for(temp: &TempDir) -> Arc<Engine> {
        Engine::new(
            EngineOptions::new(temp.path().join("repo")),
            TaskCache::new(temp.path().join("cache")),
            Arc::new(CollectingReporter::default()),
        )
    }

    fn load(engine: &Engine) -> Vec<Arc<Task>> {
        let files = discover_declarations(&engine.options().root_dir, &[]).unwrap();
        register_declarations(engine, &files).unwrap()
    }

    #[test]
    fn test_resolve_dependencies() {
        let declaration = TaskDeclaration {
            depends: vec![
                DependencyRef::Name("install".to_string()),
                DependencyRef::Detailed {
                    task: "../lib/pack".to_string(),
                    no_dependency: true,
                },
            ],
            run: vec!["make".to_string()],
            ..Default::default()
        };
        let declared =
            DeclaredTask::resolve(Path::new("/repo"), Path::new("/repo/app"), &declaration);

        assert_eq!(
            declared.depends,
            vec![
                ("app/install".to_string(), RunOptions::default()),
                ("lib/pack".to_string(), RunOptions::no_dependency()),
            ]
        );
        assert_eq!(declared.run, vec!["make"]);
    }

    #[tokio::test]
    async fn test_declared_build_runs_and_caches() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        write(
            &repo,
            "lib/make.toml",
            r#"
[tasks.build]
description = "Build the library"
inputs = ["src/*.txt"]
run = ["mkdir -p out", "cat src/*.txt > out/lib.txt"]
outputs = ["out/lib.txt"]
"#,
        );
        write(&repo, "lib/src/a.txt", "alpha\n");
        write(
            &repo,
            "app/make.toml",
            r#"
[tasks.build]
depends = ["../lib/build"]
run = ["mkdir -p out", "cp ../lib/out/lib.txt out/app.txt"]
outputs = ["out/app.txt"]
"#,
        );

        let engine = engine_for(&temp);
        let tasks = load(&engine);
        assert_eq!(tasks.len(), 2);
        let lib = engine.registry().get("lib/build").unwrap();
        assert_eq!(lib.description(), Some("Build the library"));

        let first = engine.run("app/build").await.unwrap();
        assert!(!first.cached);
        assert_eq!(
            first.outputs.unwrap().files,
            vec![repo.join("app/out/app.txt")]
        );
        assert_eq!(
            std::fs::read_to_string(repo.join("app/out/app.txt")).unwrap(),
            "alpha\n"
        );

        let second = engine.run("app/build").await.unwrap();
        assert!(second.cached);

        write(&repo, "lib/src/a.txt", "beta\n");
        let third = engine.run("app/build").await.unwrap();
        assert!(!third.cached);
        assert_eq!(
            std::fs::read_to_string(repo.join("app/out/app.txt")).unwrap(),
            "beta\n"
        );
    }

    #[tokio::test]
    async fn test_declared_task_without_outputs() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        write(&repo, "make.toml", "[tasks.lint]\nrun = [\"true\"]\n");

        let engine = engine_for(&temp);
        load(&engine);

        let result = engine.run("lint").await.unwrap();
        assert_eq!(result.outputs, None);
        assert!(result.inputs.is_empty());
    }

    #[tokio::test]
    async fn test_failing_command_fails_the_task() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        write(&repo, "make.toml", "[tasks.broken]\nrun = [\"exit 7\"]\n");

        let engine = engine_for(&temp);
        load(&engine);

        let err = engine.run("broken").await.unwrap_err();
        assert!(err.to_string().contains("exit code 7"), "{}", err);
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        write(&repo, "make.toml", "[tasks.build]\ndepends = [\"missing\"]\n");

        let engine = engine_for(&temp);
        let files = discover_declarations(&repo, &[]).unwrap();
        assert_eq!(
            register_declarations(&engine, &files).unwrap_err(),
            TaskError::UnknownTask("missing".to_string())
        );
    }

    #[test]
    fn test_dependency_outside_root_does_not_bind_inside() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        write(&repo, "make.toml", "[tasks.all]\ndepends = [\"../lib/build\"]\n");
        write(&repo, "lib/make.toml", "[tasks.build]\nrun = [\"true\"]\n");

        let engine = engine_for(&temp);
        let files = discover_declarations(&repo, &[]).unwrap();
        assert_eq!(
            register_declarations(&engine, &files).unwrap_err(),
            TaskError::UnknownTask("../lib/build".to_string())
        );
    }
}
