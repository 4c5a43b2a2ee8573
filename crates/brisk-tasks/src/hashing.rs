//! Content hashing

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::TaskError;

const CHUNK_SIZE: usize = 64 * 1024;

/// Stream a file through SHA-256 and return the hex digest
pub async fn hash_file(path: &Path) -> Result<String, TaskError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| TaskError::io(path, &e))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buf).await.map_err(|e| TaskError::io(path, &e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Whether `path` exists and is a regular file. Errors other than
/// "not found" are reported.
pub async fn file_exists(path: &Path) -> Result<bool, TaskError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(TaskError::io(path, &e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_hash_is_stable_and_content_based() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        std::fs::write(&a, "hello").unwrap();
        std::fs::write(&b, "hello").unwrap();

        let ha = hash_file(&a).await.unwrap();
        assert_eq!(ha, hash_file(&b).await.unwrap());
        assert_eq!(
            ha,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[tokio::test]
    async fn test_hash_spans_multiple_chunks() {
        let temp = TempDir::new().unwrap();
        let big = temp.path().join("big");
        std::fs::write(&big, vec![7u8; CHUNK_SIZE * 2 + 3]).unwrap();
        let other = temp.path().join("other");
        std::fs::write(&other, vec![7u8; CHUNK_SIZE * 2 + 4]).unwrap();

        assert_ne!(hash_file(&big).await.unwrap(), hash_file(&other).await.unwrap());
    }

    #[tokio::test]
    async fn test_file_exists() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("f");
        std::fs::write(&file, "").unwrap();

        assert!(file_exists(&file).await.unwrap());
        assert!(!file_exists(&temp.path().join("missing")).await.unwrap());
        assert!(!file_exists(temp.path()).await.unwrap());
    }
}
