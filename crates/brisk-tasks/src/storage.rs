//! Task-local storage

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::artifact::FileRecord;
use crate::cache::{TaskDependencies, TaskInfo};

/// What one task execution touched: inputs it registered, outputs it
/// produced, and the other tasks it ran.
#[derive(Debug, Default)]
pub struct TaskStorage {
    input_patterns: Vec<String>,
    input_files: Vec<FileRecord>,
    output_patterns: Vec<String>,
    output_files: Vec<FileRecord>,
    task_dependencies: BTreeMap<PathBuf, TaskDependencies>,
}

impl TaskStorage {
    /// Forget everything recorded by a previous attempt
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn add_input_files(&mut self, patterns: &[String], files: Vec<FileRecord>) {
        debug!(patterns = ?patterns, files = files.len(), "registering input files");
        self.input_patterns.extend_from_slice(patterns);
        self.input_files.extend(files);
    }

    pub fn add_output_files(&mut self, patterns: &[String], files: Vec<FileRecord>) {
        debug!(patterns = ?patterns, files = files.len(), "registering output files");
        self.output_patterns.extend_from_slice(patterns);
        self.output_files.extend(files);
    }

    /// Record that the task `name` of `workdir` ran on behalf of this task.
    /// `hash` is the declaration hash of `workdir`; the first one recorded
    /// for a directory wins.
    pub fn add_task_dependency(&mut self, workdir: &Path, hash: String, name: &str) {
        let entry = self
            .task_dependencies
            .entry(workdir.to_path_buf())
            .or_insert_with(|| TaskDependencies {
                hash,
                tasks: Vec::new(),
            });
        if !entry.tasks.iter().any(|t| t == name) {
            entry.tasks.push(name.to_string());
        }
    }

    pub fn input_patterns(&self) -> &[String] {
        &self.input_patterns
    }

    /// Snapshot as a cache record
    pub fn as_task_info(&self, self_hash: String) -> TaskInfo {
        TaskInfo {
            self_hash,
            input_patterns: self.input_patterns.clone(),
            input_files: self.input_files.clone(),
            output_patterns: self.output_patterns.clone(),
            output_files: self.output_files.clone(),
            task_dependencies: self.task_dependencies.clone(),
        }
    }
}
