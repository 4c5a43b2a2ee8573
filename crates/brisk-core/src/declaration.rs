//! Build declarations (`make.toml`)
//!
//! Every directory taking part in a build carries a `make.toml` declaring its
//! tasks. The file's content hash is what the task cache uses to decide
//! whether a task's definition changed, so the declaration is deliberately
//! the single source of truth for a directory's tasks.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::DECLARATION_FILE_NAME;
use crate::error::{ConfigError, DeclarationError, Result};
use crate::paths::{normalize_path, task_fqn};

/// Parsed content of one `make.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeclarationDocument {
    /// Tasks keyed by their local name
    pub tasks: BTreeMap<String, TaskDeclaration>,
}

/// Declaration of a single task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskDeclaration {
    /// Human-readable description shown by `brisk list`
    pub description: Option<String>,

    /// Tasks run before this task's own commands
    pub depends: Vec<DependencyRef>,

    /// Input glob patterns, relative to the declaring directory
    pub inputs: Vec<String>,

    /// Shell commands, run in order
    pub run: Vec<String>,

    /// Output glob patterns, relative to the declaring directory
    pub outputs: Vec<String>,
}

/// Reference to another task from a `depends` list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyRef {
    /// `"build"` or `"../lib/build"`
    Name(String),
    /// `{ task = "../lib/pack", no_dependency = true }`
    Detailed {
        task: String,
        #[serde(default)]
        no_dependency: bool,
    },
}

impl DependencyRef {
    /// The referenced task as written
    pub fn task(&self) -> &str {
        match self {
            Self::Name(task) => task,
            Self::Detailed { task, .. } => task,
        }
    }

    /// Whether the edge is excluded from the dependent's cache record
    pub fn no_dependency(&self) -> bool {
        match self {
            Self::Name(_) => false,
            Self::Detailed { no_dependency, .. } => *no_dependency,
        }
    }

    /// Resolve to a fully-qualified task name.
    ///
    /// A bare name refers to a task of `workdir`; anything containing `/` is
    /// a path relative to `workdir` whose last segment is the task name.
    pub fn resolve_fqn(&self, root: &Path, workdir: &Path) -> String {
        let reference = self.task();
        match reference.rsplit_once('/') {
            Some((dir, name)) => {
                let target = normalize_path(&workdir.join(dir));
                task_fqn(root, &target, name)
            }
            None => task_fqn(root, workdir, reference),
        }
    }
}

/// A loaded `make.toml` together with its location
#[derive(Debug, Clone, PartialEq)]
pub struct DeclarationFile {
    /// Path of the declaration file
    pub path: PathBuf,
    /// Directory the declared tasks run in
    pub workdir: PathBuf,
    /// Declared tasks
    pub tasks: BTreeMap<String, TaskDeclaration>,
}

impl DeclarationFile {
    /// Load and validate a declaration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| DeclarationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    /// Parse declaration content that was read from `path`
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let document: DeclarationDocument =
            toml::from_str(content).map_err(|source| DeclarationError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        for name in document.tasks.keys() {
            validate_task_name(path, name)?;
        }

        let workdir = path
            .parent()
            .map(normalize_path)
            .unwrap_or_else(|| PathBuf::from("."));

        debug!(path = %path.display(), tasks = document.tasks.len(), "parsed build declaration");
        Ok(Self {
            path: path.to_path_buf(),
            workdir,
            tasks: document.tasks,
        })
    }
}

fn validate_task_name(path: &Path, name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name cannot be empty")
    } else if name.contains('/') || name.contains('\\') {
        Some("name cannot contain path separators")
    } else if name == "." || name == ".." {
        Some("name cannot be a relative path segment")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(DeclarationError::InvalidTaskName {
            path: path.to_path_buf(),
            name: name.to_string(),
            reason: reason.to_string(),
        }
        .into()),
        None => Ok(()),
    }
}

/// Find and load every `make.toml` under `root`, skipping directories whose
/// name matches one of the `ignore` globs. Results are ordered by path.
pub fn discover_declarations(root: &Path, ignore: &[String]) -> Result<Vec<DeclarationFile>> {
    debug!(root = %root.display(), "discovering build declarations");
    let ignored = build_ignore_set(ignore)?;

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !(entry.file_type().is_dir() && ignored.is_match(entry.file_name()))
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| DeclarationError::Walk {
            root: root.to_path_buf(),
            message: e.to_string(),
        })?;
        if entry.file_type().is_file() && entry.file_name() == DECLARATION_FILE_NAME {
            files.push(DeclarationFile::load(entry.path())?);
        }
    }

    info!(count = files.len(), "discovered build declarations");
    Ok(files)
}

fn build_ignore_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for (i, pattern) in patterns.iter().enumerate() {
        let glob = Glob::new(pattern).map_err(|e| ConfigError::InvalidValue {
            field: format!("discovery.ignore[{}]", i),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| {
        ConfigError::InvalidValue {
            field: "discovery.ignore".to_string(),
            message: e.to_string(),
        }
        .into()
    })
}
