// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Uploaded File Repository
//!
//! Metadata rows of the `uploaded_files` table. The upload time is the
//! row's `created_at`.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::connection::FactoryId;
use crate::domain::repository::{RepositoryError, SqlFileRepository};
use crate::domain::sql_file::{FileId, FileStatus, SqlFileType, UploadedFile};

pub struct PostgresSqlFileRepository {
    pool: PgPool,
}

impl PostgresSqlFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn file_from_row(row: &PgRow) -> Result<UploadedFile, RepositoryError> {
    let file_type: String = row.try_get("file_type")?;
    let status: String = row.try_get("status")?;

    Ok(UploadedFile {
        id: FileId(row.try_get("id")?),
        factory_id: FactoryId(row.try_get("factory_id")?),
        file_name: row.try_get("file_name")?,
        file_type: SqlFileType::parse(&file_type).ok_or_else(|| {
            RepositoryError::Serialization(format!("Unknown file type: {}", file_type))
        })?,
        file_path: row.try_get("file_path")?,
        file_size: row.try_get("file_size")?,
        status: FileStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Serialization(format!("Unknown file status: {}", status)))?,
        metadata: row.try_get("metadata")?,
        uploaded_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl SqlFileRepository for PostgresSqlFileRepository {
    async fn save(&self, file: &UploadedFile) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO uploaded_files (
                id, factory_id, file_name, file_type, file_path, file_size,
                status, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            ON CONFLICT (id) DO UPDATE SET
                file_name = EXCLUDED.file_name,
                file_path = EXCLUDED.file_path,
                file_size = EXCLUDED.file_size,
                status = EXCLUDED.status,
                metadata = EXCLUDED.metadata,
                updated_at = NOW()
            "#,
        )
        .bind(file.id.0)
        .bind(file.factory_id.0)
        .bind(&file.file_name)
        .bind(file.file_type.as_str())
        .bind(&file.file_path)
        .bind(file.file_size)
        .bind(file.status.as_str())
        .bind(&file.metadata)
        .bind(file.uploaded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save uploaded file: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: FileId) -> Result<Option<UploadedFile>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, factory_id, file_name, file_type, file_path, file_size,
                   status, metadata, created_at
            FROM uploaded_files
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(file_from_row).transpose()
    }

    async fn update_status(
        &self,
        id: FileId,
        status: FileStatus,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE uploaded_files
            SET status = $1, metadata = COALESCE($2, metadata), updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(status.as_str())
        .bind(metadata)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("uploaded file {}", id)));
        }
        Ok(())
    }
}
