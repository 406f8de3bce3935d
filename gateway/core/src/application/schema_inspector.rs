// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Schema Inspector
//!
//! Catalog browsing for the query builder: tables and views, their columns,
//! a row preview and foreign-key edges.
//!
//! Each call opens one dedicated session outside the pool cache and closes
//! it before returning, on success and on error alike. Catalog columns are
//! cast to plain SQL types because `information_schema` exposes them as
//! domains.

use sqlx::postgres::PgConnection;
use sqlx::{Connection as _, Row as _};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::application::connection_registry::ConnectionRegistry;
use crate::domain::connection::ConnectionId;
use crate::domain::error::ServiceError;
use crate::domain::query::Row;
use crate::domain::schema::{ColumnInfo, ForeignKeyInfo, SchemaStructure, TableInfo, TableKind};
use crate::infrastructure::pool_manager::{connect_options, driver_message};
use crate::infrastructure::sql::{quote_ident, values};

const TABLES_SQL: &str = r#"
    SELECT
        table_name::text AS table_name,
        table_schema::text AS schema_name,
        table_type::text AS table_type
    FROM information_schema.tables
    WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
    ORDER BY table_schema, table_name
"#;

const COLUMNS_SQL: &str = r#"
    SELECT
        c.column_name::text AS column_name,
        c.data_type::text AS data_type,
        c.is_nullable::text AS is_nullable,
        c.column_default::text AS default_value,
        c.character_maximum_length::int4 AS max_length,
        EXISTS (
            SELECT 1
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage ku
              ON tc.constraint_name = ku.constraint_name
             AND tc.table_schema = ku.table_schema
            WHERE tc.constraint_type = 'PRIMARY KEY'
              AND tc.table_schema = $1
              AND tc.table_name = $2
              AND ku.column_name = c.column_name
        ) AS is_primary_key,
        EXISTS (
            SELECT 1
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage ku
              ON tc.constraint_name = ku.constraint_name
             AND tc.table_schema = ku.table_schema
            WHERE tc.constraint_type = 'FOREIGN KEY'
              AND tc.table_schema = $1
              AND tc.table_name = $2
              AND ku.column_name = c.column_name
        ) AS is_foreign_key
    FROM information_schema.columns c
    WHERE c.table_schema = $1
      AND c.table_name = $2
    ORDER BY c.ordinal_position
"#;

const FOREIGN_KEYS_SQL: &str = r#"
    SELECT
        tc.table_schema::text AS from_schema,
        tc.table_name::text AS from_table,
        kcu.column_name::text AS from_column,
        ccu.table_schema::text AS to_schema,
        ccu.table_name::text AS to_table,
        ccu.column_name::text AS to_column,
        tc.constraint_name::text AS constraint_name
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON tc.constraint_name = kcu.constraint_name
     AND tc.table_schema = kcu.table_schema
    JOIN information_schema.constraint_column_usage ccu
      ON ccu.constraint_name = tc.constraint_name
     AND ccu.table_schema = tc.table_schema
    WHERE tc.constraint_type = 'FOREIGN KEY'
      AND tc.table_schema NOT IN ('pg_catalog', 'information_schema')
    ORDER BY tc.table_schema, tc.table_name
"#;

pub struct SchemaInspector {
    registry: Arc<ConnectionRegistry>,
    connect_timeout: Duration,
}

impl SchemaInspector {
    pub fn new(registry: Arc<ConnectionRegistry>, connect_timeout: Duration) -> Self {
        Self {
            registry,
            connect_timeout,
        }
    }

    /// Tables and views outside the system schemas, with best-effort row counts.
    pub async fn list_tables(&self, connection_id: ConnectionId) -> Result<Vec<TableInfo>, ServiceError> {
        let mut conn = self.open(connection_id).await?;
        let result = tables(&mut conn).await;
        close(conn).await;
        result
    }

    pub async fn list_columns(
        &self,
        connection_id: ConnectionId,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnInfo>, ServiceError> {
        let mut conn = self.open(connection_id).await?;
        let result = columns(&mut conn, schema, table).await;
        close(conn).await;
        result
    }

    /// First `limit` rows of a catalog-listed table.
    pub async fn preview_rows(
        &self,
        connection_id: ConnectionId,
        schema: &str,
        table: &str,
        limit: i64,
    ) -> Result<Vec<Row>, ServiceError> {
        let mut conn = self.open(connection_id).await?;
        let sql = format!("SELECT * FROM {}.{} LIMIT $1", quote_ident(schema), quote_ident(table));
        let result = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&mut conn)
            .await
            .map(|rows| rows.iter().map(values::decode_row).collect())
            .map_err(execution_error);
        close(conn).await;
        result
    }

    pub async fn list_foreign_keys(&self, connection_id: ConnectionId) -> Result<Vec<ForeignKeyInfo>, ServiceError> {
        let mut conn = self.open(connection_id).await?;
        let result = foreign_keys(&mut conn).await;
        close(conn).await;
        result
    }

    /// Every table with its columns, over a single session.
    pub async fn full_schema(&self, connection_id: ConnectionId) -> Result<SchemaStructure, ServiceError> {
        let mut conn = self.open(connection_id).await?;
        let result = async {
            let tables = tables(&mut conn).await?;
            let mut structure = SchemaStructure::default();
            for table in &tables {
                let cols = columns(&mut conn, &table.schema_name, &table.table_name).await?;
                structure.table_details.insert(table.qualified_name(), cols);
            }
            structure.tables = tables;
            Ok::<_, ServiceError>(structure)
        }
        .await;
        close(conn).await;
        result
    }

    async fn open(&self, connection_id: ConnectionId) -> Result<PgConnection, ServiceError> {
        let decrypted = self.registry.get_decrypted(connection_id).await?;
        decrypted.db_type.ensure_supported()?;
        let options = connect_options(&decrypted.db_config());

        debug!(connection_id = %connection_id, host = %decrypted.host, "Opening inspector session");
        match tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&options)).await {
            Ok(connected) => connected.map_err(execution_error),
            Err(_) => Err(ServiceError::Execution(format!(
                "Timed out connecting to {}:{}",
                decrypted.host, decrypted.port
            ))),
        }
    }
}

async fn close(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        warn!(error = %e, "Failed to close inspector session cleanly");
    }
}

async fn tables(conn: &mut PgConnection) -> Result<Vec<TableInfo>, ServiceError> {
    let rows = sqlx::query(TABLES_SQL)
        .fetch_all(&mut *conn)
        .await
        .map_err(execution_error)?;

    let mut tables = Vec::with_capacity(rows.len());
    for row in rows {
        let table_name: String = row.try_get("table_name").map_err(execution_error)?;
        let schema_name: String = row.try_get("schema_name").map_err(execution_error)?;
        let table_type: String = row.try_get("table_type").map_err(execution_error)?;

        let count_sql = format!(
            "SELECT COUNT(*) FROM {}.{}",
            quote_ident(&schema_name),
            quote_ident(&table_name)
        );
        // A table we cannot count (permissions, broken view) still gets listed
        let row_count = match sqlx::query_scalar::<_, i64>(&count_sql).fetch_one(&mut *conn).await {
            Ok(count) => count,
            Err(e) => {
                debug!(table = %table_name, schema = %schema_name, error = %e, "Row count unavailable");
                0
            }
        };

        tables.push(TableInfo {
            table_name,
            schema_name,
            table_type: TableKind::from_catalog(&table_type),
            row_count,
        });
    }
    Ok(tables)
}

async fn columns(conn: &mut PgConnection, schema: &str, table: &str) -> Result<Vec<ColumnInfo>, ServiceError> {
    let rows = sqlx::query(COLUMNS_SQL)
        .bind(schema)
        .bind(table)
        .fetch_all(&mut *conn)
        .await
        .map_err(execution_error)?;

    rows.iter()
        .map(|row| {
            let is_nullable: String = row.try_get("is_nullable")?;
            Ok(ColumnInfo {
                column_name: row.try_get("column_name")?,
                data_type: row.try_get("data_type")?,
                is_nullable: is_nullable == "YES",
                default_value: row.try_get("default_value")?,
                is_primary_key: row.try_get("is_primary_key")?,
                is_foreign_key: row.try_get("is_foreign_key")?,
                max_length: row.try_get("max_length")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map_err(execution_error)
}

async fn foreign_keys(conn: &mut PgConnection) -> Result<Vec<ForeignKeyInfo>, ServiceError> {
    let rows = sqlx::query(FOREIGN_KEYS_SQL)
        .fetch_all(&mut *conn)
        .await
        .map_err(execution_error)?;

    rows.iter()
        .map(|row| {
            Ok(ForeignKeyInfo {
                from_schema: row.try_get("from_schema")?,
                from_table: row.try_get("from_table")?,
                from_column: row.try_get("from_column")?,
                to_schema: row.try_get("to_schema")?,
                to_table: row.try_get("to_table")?,
                to_column: row.try_get("to_column")?,
                constraint_name: row.try_get("constraint_name")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map_err(execution_error)
}

fn execution_error(err: sqlx::Error) -> ServiceError {
    ServiceError::Execution(driver_message(&err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::PoolSettings;
    use crate::domain::connection::{DbType, FactoryId, NewConnection};
    use crate::infrastructure::pool_manager::PoolManager;
    use crate::infrastructure::repositories::InMemoryConnectionRepository;
    use crate::infrastructure::vault::CredentialVault;
    use uuid::Uuid;

    fn registry() -> Arc<ConnectionRegistry> {
        Arc::new(ConnectionRegistry::new(
            Arc::new(InMemoryConnectionRepository::new()),
            Arc::new(CredentialVault::from_hex(&CredentialVault::generate_key()).unwrap()),
            Arc::new(PoolManager::new(PoolSettings::default())),
        ))
    }

    #[tokio::test]
    async fn test_unknown_connection() {
        let inspector = SchemaInspector::new(registry(), Duration::from_secs(1));
        let err = inspector.list_tables(ConnectionId::new()).await.unwrap_err();
        assert!(matches!(err, ServiceError::ConnectionNotFound(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_execution_error() {
        let registry = registry();
        let id = registry
            .create(NewConnection {
                factory_id: FactoryId(Uuid::new_v4()),
                name: "closed port".into(),
                db_type: DbType::Postgres,
                host: "127.0.0.1".into(),
                port: 1,
                database: "mes".into(),
                username: "u".into(),
                password: "p".into(),
                options: None,
            })
            .await
            .unwrap()
            .id;

        let inspector = SchemaInspector::new(registry, Duration::from_secs(2));
        let err = inspector.list_foreign_keys(id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Execution(_)));
    }
}
