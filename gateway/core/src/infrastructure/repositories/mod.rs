// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits declared in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve connections, widgets and uploaded file metadata
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! Backed by the application database (see `infrastructure::db`):
//! - **PostgresConnectionRepository** - `connections` table
//! - **PostgresWidgetRepository** - `widgets` table
//! - **PostgresSqlFileRepository** - `uploaded_files` table
//!
//! ## In-Memory Repositories
//!
//! Thread-safe HashMap-backed storage for tests and `storage.backend: memory`:
//! - **InMemoryConnectionRepository**
//! - **InMemoryWidgetRepository**
//! - **InMemorySqlFileRepository**

pub mod postgres_connection;
pub mod postgres_sql_file;
pub mod postgres_widget;

pub use postgres_connection::PostgresConnectionRepository;
pub use postgres_sql_file::PostgresSqlFileRepository;
pub use postgres_widget::PostgresWidgetRepository;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::connection::{Connection, ConnectionId, ConnectionUpdate, FactoryId};
use crate::domain::repository::{
    ConnectionRepository, RepositoryError, SqlFileRepository, WidgetRepository,
};
use crate::domain::sql_file::{FileId, FileStatus, UploadedFile};
use crate::domain::widget::{Widget, WidgetId};

#[derive(Clone, Default)]
pub struct InMemoryConnectionRepository {
    connections: Arc<RwLock<HashMap<ConnectionId, Connection>>>,
}

impl InMemoryConnectionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionRepository for InMemoryConnectionRepository {
    async fn insert(&self, connection: &Connection) -> Result<(), RepositoryError> {
        let mut connections = self.connections.write().unwrap();
        connections.insert(connection.id, connection.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ConnectionId) -> Result<Option<Connection>, RepositoryError> {
        let connections = self.connections.read().unwrap();
        Ok(connections.get(&id).cloned())
    }

    async fn list(&self, factory_id: Option<FactoryId>) -> Result<Vec<Connection>, RepositoryError> {
        let connections = self.connections.read().unwrap();
        let mut list: Vec<Connection> = connections
            .values()
            .filter(|c| factory_id.is_none_or(|f| c.factory_id == f))
            .cloned()
            .collect();
        // Sort by created_at desc
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn update(
        &self,
        id: ConnectionId,
        update: &ConnectionUpdate,
    ) -> Result<Option<Connection>, RepositoryError> {
        let mut connections = self.connections.write().unwrap();
        Ok(connections.get_mut(&id).map(|connection| {
            update.apply_to(connection);
            connection.clone()
        }))
    }

    async fn delete(&self, id: ConnectionId) -> Result<bool, RepositoryError> {
        let mut connections = self.connections.write().unwrap();
        Ok(connections.remove(&id).is_some())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryWidgetRepository {
    widgets: Arc<RwLock<HashMap<WidgetId, Widget>>>,
}

impl InMemoryWidgetRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WidgetRepository for InMemoryWidgetRepository {
    async fn save(&self, widget: &Widget) -> Result<(), RepositoryError> {
        let mut widgets = self.widgets.write().unwrap();
        widgets.insert(widget.id, widget.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: WidgetId) -> Result<Option<Widget>, RepositoryError> {
        let widgets = self.widgets.read().unwrap();
        Ok(widgets.get(&id).cloned())
    }
}

#[derive(Clone, Default)]
pub struct InMemorySqlFileRepository {
    files: Arc<RwLock<HashMap<FileId, UploadedFile>>>,
}

impl InMemorySqlFileRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SqlFileRepository for InMemorySqlFileRepository {
    async fn save(&self, file: &UploadedFile) -> Result<(), RepositoryError> {
        let mut files = self.files.write().unwrap();
        files.insert(file.id, file.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: FileId) -> Result<Option<UploadedFile>, RepositoryError> {
        let files = self.files.read().unwrap();
        Ok(files.get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: FileId,
        status: FileStatus,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), RepositoryError> {
        let mut files = self.files.write().unwrap();
        let file = files
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("uploaded file {}", id)))?;
        file.status = status;
        if metadata.is_some() {
            file.metadata = metadata;
        }
        Ok(())
    }
}
