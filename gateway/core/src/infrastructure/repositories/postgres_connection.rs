// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Repository
//!
//! `ConnectionRepository` backed by the `connections` table of the
//! application database. Credential columns (`user_enc`, `pass_enc`,
//! `options_enc`) hold vault blobs and are never decrypted here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::connection::{Connection, ConnectionId, ConnectionUpdate, DbType, FactoryId};
use crate::domain::repository::{ConnectionRepository, RepositoryError};

const COLUMNS: &str = "id, factory_id, name, db_type, host, port, database, \
                       user_enc, pass_enc, options_enc, created_at, updated_at";

pub struct PostgresConnectionRepository {
    pool: PgPool,
}

impl PostgresConnectionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn connection_from_row(row: &PgRow) -> Result<Connection, RepositoryError> {
    let db_type: String = row.try_get("db_type")?;
    let db_type: DbType = db_type
        .parse()
        .map_err(|e| RepositoryError::Serialization(format!("Invalid db_type: {}", e)))?;
    let port: i32 = row.try_get("port")?;
    let port = u16::try_from(port)
        .map_err(|_| RepositoryError::Serialization(format!("Invalid port: {}", port)))?;

    Ok(Connection {
        id: ConnectionId(row.try_get("id")?),
        factory_id: FactoryId(row.try_get("factory_id")?),
        name: row.try_get("name")?,
        db_type,
        host: row.try_get("host")?,
        port,
        database: row.try_get("database")?,
        user_enc: row.try_get("user_enc")?,
        pass_enc: row.try_get("pass_enc")?,
        options_enc: row.try_get("options_enc")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

#[async_trait]
impl ConnectionRepository for PostgresConnectionRepository {
    async fn insert(&self, connection: &Connection) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO connections (
                id, factory_id, name, db_type, host, port, database,
                user_enc, pass_enc, options_enc, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(connection.id.0)
        .bind(connection.factory_id.0)
        .bind(&connection.name)
        .bind(connection.db_type.as_str())
        .bind(&connection.host)
        .bind(i32::from(connection.port))
        .bind(&connection.database)
        .bind(&connection.user_enc)
        .bind(&connection.pass_enc)
        .bind(&connection.options_enc)
        .bind(connection.created_at)
        .bind(connection.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to insert connection: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: ConnectionId) -> Result<Option<Connection>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM connections WHERE id = $1", COLUMNS))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(connection_from_row).transpose()
    }

    async fn list(&self, factory_id: Option<FactoryId>) -> Result<Vec<Connection>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM connections \
             WHERE ($1::uuid IS NULL OR factory_id = $1) \
             ORDER BY created_at DESC",
            COLUMNS
        ))
        .bind(factory_id.map(|f| f.0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(connection_from_row).collect()
    }

    async fn update(
        &self,
        id: ConnectionId,
        update: &ConnectionUpdate,
    ) -> Result<Option<Connection>, RepositoryError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE connections SET
                name = COALESCE($2, name),
                db_type = COALESCE($3, db_type),
                host = COALESCE($4, host),
                port = COALESCE($5, port),
                database = COALESCE($6, database),
                user_enc = COALESCE($7, user_enc),
                pass_enc = COALESCE($8, pass_enc),
                options_enc = COALESCE($9, options_enc),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(id.0)
        .bind(&update.name)
        .bind(update.db_type.map(|t| t.as_str()))
        .bind(&update.host)
        .bind(update.port.map(i32::from))
        .bind(&update.database)
        .bind(&update.user_enc)
        .bind(&update.pass_enc)
        .bind(&update.options_enc)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to update connection: {}", e)))?;

        row.as_ref().map(connection_from_row).transpose()
    }

    async fn delete(&self, id: ConnectionId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM connections WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
