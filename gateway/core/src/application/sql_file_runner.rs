// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # SQL File Runner
//!
//! Runs or splits a previously uploaded `.sql` script and tracks the file's
//! processing status.
//!
//! Status transitions for `execute_file`:
//!
//! ```text
//! uploaded ──► processing ──► processed   (every statement succeeded)
//!                   │    └──► failed      (some statements failed)
//!                   └──────► failed      (script unreadable / connection unusable)
//! ```

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::application::query_executor::QueryExecutor;
use crate::domain::connection::ConnectionId;
use crate::domain::error::ServiceError;
use crate::domain::query::{BatchResult, ParsedStatement};
use crate::domain::repository::SqlFileRepository;
use crate::domain::sql_file::{FileId, FileStatus, SqlFileType, UploadedFile};
use crate::infrastructure::file_store::SqlFileStore;

/// Statements of an uploaded script, not executed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedFile {
    pub file_name: String,
    pub total_queries: usize,
    pub queries: Vec<ParsedStatement>,
}

pub struct SqlFileRunner {
    files: Arc<dyn SqlFileRepository>,
    store: Arc<dyn SqlFileStore>,
    executor: Arc<QueryExecutor>,
}

impl SqlFileRunner {
    pub fn new(
        files: Arc<dyn SqlFileRepository>,
        store: Arc<dyn SqlFileStore>,
        executor: Arc<QueryExecutor>,
    ) -> Self {
        Self {
            files,
            store,
            executor,
        }
    }

    pub async fn execute_file(
        &self,
        file_id: FileId,
        connection_id: ConnectionId,
    ) -> Result<BatchResult, ServiceError> {
        let file = self.sql_file(file_id, "Only SQL files can be executed").await?;

        self.files
            .update_status(file_id, FileStatus::Processing, None)
            .await?;

        match self.run(&file, connection_id).await {
            Ok(batch) => {
                let status = if batch.failure_count == 0 {
                    FileStatus::Processed
                } else {
                    FileStatus::Failed
                };
                let metadata = json!({
                    "executionResults": {
                        "totalQueries": batch.total_queries,
                        "successCount": batch.success_count,
                        "failureCount": batch.failure_count,
                        "executedAt": Utc::now().to_rfc3339(),
                    }
                });
                self.files.update_status(file_id, status, Some(metadata)).await?;

                info!(
                    file_id = %file_id,
                    connection_id = %connection_id,
                    status = status.as_str(),
                    succeeded = batch.success_count,
                    failed = batch.failure_count,
                    "SQL file executed"
                );
                Ok(batch)
            }
            Err(e) => {
                let metadata = json!({ "error": e.to_string() });
                if let Err(update_err) = self
                    .files
                    .update_status(file_id, FileStatus::Failed, Some(metadata))
                    .await
                {
                    error!(file_id = %file_id, error = %update_err, "Failed to record file failure");
                }
                Err(e)
            }
        }
    }

    pub async fn parse(&self, file_id: FileId) -> Result<ParsedFile, ServiceError> {
        let file = self.sql_file(file_id, "Only SQL files can be parsed").await?;
        let content = self.store.read_to_string(&file.file_path).await?;
        let queries = QueryExecutor::parse_sql_file(&content);

        Ok(ParsedFile {
            file_name: file.file_name,
            total_queries: queries.len(),
            queries,
        })
    }

    async fn run(&self, file: &UploadedFile, connection_id: ConnectionId) -> Result<BatchResult, ServiceError> {
        let content = self.store.read_to_string(&file.file_path).await?;
        self.executor.execute_file(connection_id, &content).await
    }

    async fn sql_file(&self, file_id: FileId, wrong_type: &str) -> Result<UploadedFile, ServiceError> {
        let file = self
            .files
            .find_by_id(file_id)
            .await?
            .ok_or_else(|| ServiceError::FileNotFound(file_id.to_string()))?;
        if file.file_type != SqlFileType::Sql {
            return Err(ServiceError::Validation(wrong_type.to_string()));
        }
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::connection_registry::ConnectionRegistry;
    use crate::domain::config::PoolSettings;
    use crate::domain::connection::FactoryId;
    use crate::infrastructure::file_store::LocalSqlFileStore;
    use crate::infrastructure::pool_manager::PoolManager;
    use crate::infrastructure::repositories::{InMemoryConnectionRepository, InMemorySqlFileRepository};
    use crate::infrastructure::vault::CredentialVault;
    use tempfile::TempDir;
    use uuid::Uuid;

    struct Fixture {
        runner: SqlFileRunner,
        files: Arc<InMemorySqlFileRepository>,
        dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let pools = Arc::new(PoolManager::new(PoolSettings::default()));
        let registry = Arc::new(ConnectionRegistry::new(
            Arc::new(InMemoryConnectionRepository::new()),
            Arc::new(CredentialVault::from_hex(&CredentialVault::generate_key()).unwrap()),
            pools.clone(),
        ));
        let executor = Arc::new(QueryExecutor::new(registry, pools, 100));
        let files = Arc::new(InMemorySqlFileRepository::new());
        let runner = SqlFileRunner::new(
            files.clone(),
            Arc::new(LocalSqlFileStore::new(dir.path())),
            executor,
        );
        Fixture { runner, files, dir }
    }

    async fn upload(f: &Fixture, name: &str, file_type: SqlFileType, content: &str) -> UploadedFile {
        std::fs::write(f.dir.path().join(name), content).unwrap();
        let file = UploadedFile::new(
            FactoryId(Uuid::new_v4()),
            name,
            file_type,
            name,
            content.len() as i64,
        );
        f.files.save(&file).await.unwrap();
        file
    }

    #[tokio::test]
    async fn test_parse_reports_statements() {
        let f = fixture();
        let file = upload(&f, "seed.sql", SqlFileType::Sql, "CREATE TABLE a (id int);\nSELECT * FROM a;").await;

        let parsed = f.runner.parse(file.id).await.unwrap();
        assert_eq!(parsed.file_name, "seed.sql");
        assert_eq!(parsed.total_queries, 2);
        assert_eq!(parsed.queries[1].tables, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_backup_files_are_rejected() {
        let f = fixture();
        let file = upload(&f, "dump.bak", SqlFileType::Bak, "binary").await;

        let err = f.runner.parse(file.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Only SQL files can be parsed");

        let err = f.runner.execute_file(file.id, ConnectionId::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Only SQL files can be executed");
    }

    #[tokio::test]
    async fn test_unknown_file() {
        let f = fixture();
        let err = f.runner.parse(FileId::new()).await.unwrap_err();
        assert!(matches!(err, ServiceError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_run_marks_file_failed() {
        let f = fixture();
        let file = upload(&f, "seed.sql", SqlFileType::Sql, "SELECT 1;").await;

        let err = f.runner.execute_file(file.id, ConnectionId::new()).await.unwrap_err();
        assert!(matches!(err, ServiceError::ConnectionNotFound(_)));

        let stored = f.files.find_by_id(file.id).await.unwrap().unwrap();
        assert_eq!(stored.status, FileStatus::Failed);
        let message = stored.metadata.unwrap()["error"].as_str().unwrap().to_string();
        assert!(message.starts_with("Connection not found"));
    }
}
