//! Artifacts and fingerprinted files

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::hashing::hash_file;

/// Declared output patterns and the absolute files they matched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Glob patterns as declared by the task
    pub patterns: Vec<String>,
    /// Absolute paths matched by `patterns`
    pub files: Vec<PathBuf>,
}

impl Artifact {
    pub fn new(patterns: Vec<String>, files: Vec<PathBuf>) -> Self {
        Self { patterns, files }
    }

    /// First matched file, the common case for single-file outputs
    pub fn first(&self) -> Option<&Path> {
        self.files.first().map(PathBuf::as_path)
    }
}

/// A file path with the content hash it had when recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub hash: String,
}

impl FileRecord {
    /// Hash `path` and record it
    pub async fn capture(path: &Path) -> Result<Self, TaskError> {
        Ok(Self {
            hash: hash_file(path).await?,
            path: path.to_path_buf(),
        })
    }

    /// Capture every path in order
    pub async fn capture_all(paths: &[PathBuf]) -> Result<Vec<Self>, TaskError> {
        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            records.push(Self::capture(path).await?);
        }
        Ok(records)
    }

    /// Whether the file's current content differs from the recorded hash
    pub async fn has_changed(&self) -> Result<bool, TaskError> {
        Ok(hash_file(&self.path).await? != self.hash)
    }
}
