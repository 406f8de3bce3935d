// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the records this service reads and writes in
//! its own application database, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Record | Implementations |
//! |-------|--------|-----------------|
//! | `ConnectionRepository` | `Connection` | `InMemoryConnectionRepository`, `PostgresConnectionRepository` |
//! | `WidgetRepository` | `Widget` | `InMemoryWidgetRepository`, `PostgresWidgetRepository` |
//! | `SqlFileRepository` | `UploadedFile` | `InMemorySqlFileRepository`, `PostgresSqlFileRepository` |
//!
//! In-memory implementations back tests and `storage.backend: memory`;
//! PostgreSQL implementations are used in production.

use async_trait::async_trait;

use crate::domain::connection::{Connection, ConnectionId, ConnectionUpdate, FactoryId};
use crate::domain::sql_file::{FileId, FileStatus, UploadedFile};
use crate::domain::widget::{Widget, WidgetId};

/// Repository interface for saved customer connections.
/// Rows only ever hold encrypted credentials.
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    async fn insert(&self, connection: &Connection) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: ConnectionId) -> Result<Option<Connection>, RepositoryError>;

    /// Newest first; every factory when `factory_id` is `None`.
    async fn list(&self, factory_id: Option<FactoryId>) -> Result<Vec<Connection>, RepositoryError>;

    /// Overwrites the provided columns. `Ok(None)` when the row does not exist.
    async fn update(
        &self,
        id: ConnectionId,
        update: &ConnectionUpdate,
    ) -> Result<Option<Connection>, RepositoryError>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: ConnectionId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait WidgetRepository: Send + Sync {
    /// Save widget (create or update)
    async fn save(&self, widget: &Widget) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: WidgetId) -> Result<Option<Widget>, RepositoryError>;
}

#[async_trait]
pub trait SqlFileRepository: Send + Sync {
    /// Save file metadata (create or update)
    async fn save(&self, file: &UploadedFile) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: FileId) -> Result<Option<UploadedFile>, RepositoryError>;

    /// Sets the status; `metadata` replaces the stored metadata only when given.
    async fn update_status(
        &self,
        id: FileId,
        status: FileStatus,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
