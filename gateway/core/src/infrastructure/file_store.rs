// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # SQL File Store
//!
//! Read access to uploaded SQL scripts. Uploading itself belongs to the
//! dashboard builder; this crate only reads what `UploadedFile::file_path`
//! points at.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Resolve stored file paths to script text
//! - **Integration:** SqlFileRunner → SqlFileStore → local filesystem

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use crate::domain::error::ServiceError;

#[async_trait]
pub trait SqlFileStore: Send + Sync {
    /// Reads a stored script as UTF-8.
    async fn read_to_string(&self, path: &str) -> Result<String, ServiceError>;
}

/// Files under a single root directory.
#[derive(Debug, Clone)]
pub struct LocalSqlFileStore {
    root: PathBuf,
}

impl LocalSqlFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins `path` onto the root, refusing anything that could escape it.
    fn resolve(&self, path: &str) -> Result<PathBuf, ServiceError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes {
            return Err(ServiceError::Storage(format!("Invalid file path: {}", path)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl SqlFileStore for LocalSqlFileStore {
    async fn read_to_string(&self, path: &str) -> Result<String, ServiceError> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ServiceError::FileNotFound(format!("{} is missing from storage", path))
            }
            _ => ServiceError::Storage(format!("Failed to read {}: {}", path, e)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_file_under_root() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("factory")).unwrap();
        std::fs::write(dir.path().join("factory/seed.sql"), "SELECT 1;").unwrap();

        let store = LocalSqlFileStore::new(dir.path());
        let content = store.read_to_string("factory/seed.sql").await.unwrap();
        assert_eq!(content, "SELECT 1;");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = LocalSqlFileStore::new(dir.path());

        let err = store.read_to_string("absent.sql").await.unwrap_err();
        assert!(matches!(err, ServiceError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_paths_outside_root() {
        let dir = TempDir::new().unwrap();
        let store = LocalSqlFileStore::new(dir.path());

        for path in ["../etc/passwd", "/etc/passwd", "a/../../b.sql", ""] {
            let err = store.read_to_string(path).await.unwrap_err();
            assert!(matches!(err, ServiceError::Storage(_)), "{path}");
        }
    }
}
