// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Query Executor
//!
//! Runs caller SQL against a saved connection through its cached pool.
//!
//! | Operation | Binding | Row cap | Result |
//! |-----------|---------|---------|--------|
//! | `execute` | none (literal) | none | `ExecutionResult` |
//! | `execute_bound` | `:named` → `$n` | none | `QueryResult` |
//! | `test_bound` | `:named` → `$n` | `query.test_row_limit` | `QueryResult` |
//! | `execute_file` | none, per statement | none | `BatchResult` |
//!
//! Every statement is prepared first. The prepared description supplies the
//! column names (also for empty results) and the placeholder types the JSON
//! parameters are coerced to. Literal text the server refuses to prepare
//! because it holds several statements runs over the simple protocol
//! instead; the result is that of the last statement.
//!
//! Failures are never retried. A connection-level failure evicts the pool so
//! the next call starts from a fresh one.

use futures::TryStreamExt;
use serde_json::{Map, Value};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::{Column, Either, Executor, Row as _, Statement};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::application::connection_registry::ConnectionRegistry;
use crate::domain::connection::ConnectionId;
use crate::domain::error::ServiceError;
use crate::domain::query::{
    BatchResult, ExecutionResult, ParsedStatement, QueryResult, Row, StatementFailure,
};
use crate::infrastructure::pool_manager::{driver_message, CustomerPool, PoolManager};
use crate::infrastructure::sql::{self, values, BoundQuery};

#[derive(Debug, Clone, Copy)]
enum Mode {
    Literal,
    Bound,
    Test,
}

impl Mode {
    fn label(self) -> &'static str {
        match self {
            Mode::Literal => "literal",
            Mode::Bound => "bound",
            Mode::Test => "test",
        }
    }
}

/// Raw outcome of one statement.
struct Outcome {
    columns: Vec<String>,
    rows: Vec<Row>,
    rows_affected: u64,
    elapsed_ms: u64,
}

impl Outcome {
    fn row_count(&self) -> u64 {
        if self.columns.is_empty() {
            self.rows_affected
        } else {
            self.rows.len() as u64
        }
    }
}

pub struct QueryExecutor {
    registry: Arc<ConnectionRegistry>,
    pools: Arc<PoolManager>,
    test_row_limit: u32,
}

impl QueryExecutor {
    pub fn new(registry: Arc<ConnectionRegistry>, pools: Arc<PoolManager>, test_row_limit: u32) -> Self {
        Self {
            registry,
            pools,
            test_row_limit,
        }
    }

    /// Runs `query` verbatim, no parameter binding.
    pub async fn execute(&self, connection_id: ConnectionId, query: &str) -> Result<ExecutionResult, ServiceError> {
        let outcome = self
            .run(connection_id, BoundQuery::literal(query), None, Mode::Literal)
            .await?;

        Ok(ExecutionResult {
            row_count: outcome.row_count(),
            execution_time_ms: outcome.elapsed_ms,
            columns: outcome.columns,
            rows: outcome.rows,
        })
    }

    pub async fn execute_bound(
        &self,
        connection_id: ConnectionId,
        query: &str,
        params: &Map<String, Value>,
    ) -> Result<QueryResult, ServiceError> {
        let bound = sql::bind(query, params);
        let outcome = self.run(connection_id, bound, None, Mode::Bound).await?;
        Ok(query_result(outcome))
    }

    /// `execute_bound` with a hard row cap appended after binding.
    pub async fn test_bound(
        &self,
        connection_id: ConnectionId,
        query: &str,
        params: &Map<String, Value>,
    ) -> Result<QueryResult, ServiceError> {
        let bound = sql::bind(query, params).with_row_limit(self.test_row_limit);
        let cap = usize::try_from(self.test_row_limit).unwrap_or(usize::MAX);
        let outcome = self.run(connection_id, bound, Some(cap), Mode::Test).await?;
        Ok(query_result(outcome))
    }

    /// Runs every statement of a script in order, outside any transaction.
    /// A failing statement is recorded and the batch continues.
    pub async fn execute_file(&self, connection_id: ConnectionId, content: &str) -> Result<BatchResult, ServiceError> {
        self.registry.get(connection_id).await?;

        let statements = Self::parse_sql_file(content);
        let mut batch = BatchResult {
            total_queries: statements.len(),
            ..Default::default()
        };

        for statement in &statements {
            match self.execute(connection_id, &statement.query).await {
                Ok(result) => {
                    batch.results.push(result);
                    batch.success_count += 1;
                }
                Err(e) => {
                    batch.failure_count += 1;
                    batch.errors.push(StatementFailure::new(&statement.query, e.to_string()));
                }
            }
        }

        debug!(
            connection_id = %connection_id,
            total = batch.total_queries,
            failed = batch.failure_count,
            "Script executed"
        );
        Ok(batch)
    }

    pub fn parse_sql_file(content: &str) -> Vec<ParsedStatement> {
        sql::parse_sql(content)
    }

    async fn pool_for(&self, connection_id: ConnectionId) -> Result<Arc<CustomerPool>, ServiceError> {
        let decrypted = self.registry.get_decrypted(connection_id).await?;
        self.pools.get_or_create(connection_id, &decrypted.db_config()).await
    }

    async fn run(
        &self,
        connection_id: ConnectionId,
        bound: BoundQuery,
        max_rows: Option<usize>,
        mode: Mode,
    ) -> Result<Outcome, ServiceError> {
        metrics::counter!("dashforge_queries_total", "mode" => mode.label()).increment(1);

        let result = match self.pool_for(connection_id).await {
            Ok(pool) => self.run_on(connection_id, &pool, &bound, max_rows, mode).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(outcome) => debug!(
                connection_id = %connection_id,
                mode = mode.label(),
                rows = outcome.row_count(),
                elapsed_ms = outcome.elapsed_ms,
                "Query executed"
            ),
            Err(e) => {
                metrics::counter!("dashforge_query_failures_total", "mode" => mode.label()).increment(1);
                debug!(connection_id = %connection_id, mode = mode.label(), error = %e, "Query failed");
            }
        }
        result
    }

    async fn run_on(
        &self,
        connection_id: ConnectionId,
        pool: &Arc<CustomerPool>,
        bound: &BoundQuery,
        max_rows: Option<usize>,
        mode: Mode,
    ) -> Result<Outcome, ServiceError> {
        let fail = |err: sqlx::Error| {
            self.pools.report_failure(connection_id, pool, &err);
            ServiceError::Execution(driver_message(&err))
        };

        let started = Instant::now();
        let mut conn = pool.pool().acquire().await.map_err(fail)?;

        let statement = match (&mut *conn).prepare_with(&bound.sql, &[]).await {
            Ok(statement) => statement,
            Err(err) if matches!(mode, Mode::Literal) && is_multi_statement(&err) => {
                return self.run_simple(connection_id, pool, &mut conn, &bound.sql, started).await;
            }
            Err(err) => return Err(fail(err)),
        };
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let param_types: Option<&[PgTypeInfo]> = match statement.parameters() {
            Some(Either::Left(types)) => Some(types),
            _ => None,
        };
        let bind_values = values::coerce_params(&bound.values, param_types)?;
        let query = values::bind_all(sqlx::query(&bound.sql), bind_values);

        let mut rows = Vec::new();
        let mut rows_affected = 0;
        if columns.is_empty() {
            rows_affected = query.execute(&mut *conn).await.map_err(fail)?.rows_affected();
        } else {
            let mut stream = query.fetch(&mut *conn);
            while let Some(row) = stream.try_next().await.map_err(fail)? {
                rows.push(values::decode_row(&row));
                if max_rows.is_some_and(|cap| rows.len() >= cap) {
                    break;
                }
            }
        }

        Ok(Outcome {
            columns,
            rows,
            rows_affected,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Runs unparameterized multi-statement text in one round trip.
    async fn run_simple(
        &self,
        connection_id: ConnectionId,
        pool: &Arc<CustomerPool>,
        conn: &mut PoolConnection<Postgres>,
        text: &str,
        started: Instant,
    ) -> Result<Outcome, ServiceError> {
        let fail = |err: sqlx::Error| {
            self.pools.report_failure(connection_id, pool, &err);
            ServiceError::Execution(driver_message(&err))
        };

        let mut last = Outcome {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: 0,
            elapsed_ms: 0,
        };
        let mut columns = Vec::new();
        let mut rows = Vec::new();

        let mut stream = sqlx::raw_sql(text).fetch_many(&mut **conn);
        while let Some(item) = stream.try_next().await.map_err(fail)? {
            match item {
                Either::Left(done) => {
                    last.columns = std::mem::take(&mut columns);
                    last.rows = std::mem::take(&mut rows);
                    last.rows_affected = done.rows_affected();
                }
                Either::Right(row) => {
                    if rows.is_empty() {
                        columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                    }
                    rows.push(values::decode_row(&row));
                }
            }
        }

        last.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(last)
    }
}

/// `42601` raised when a prepared statement would hold several commands.
fn is_multi_statement(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some("42601") && db.message().contains("multiple commands")
        }
        _ => false,
    }
}

fn query_result(outcome: Outcome) -> QueryResult {
    QueryResult {
        row_count: outcome.row_count(),
        rows: outcome.rows,
        fields: outcome.columns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::PoolSettings;
    use crate::domain::connection::{DbType, FactoryId, NewConnection};
    use crate::domain::query::StatementKind;
    use crate::infrastructure::repositories::InMemoryConnectionRepository;
    use crate::infrastructure::vault::CredentialVault;
    use uuid::Uuid;

    fn executor() -> (QueryExecutor, Arc<ConnectionRegistry>, Arc<PoolManager>) {
        let pools = Arc::new(PoolManager::new(PoolSettings {
            acquire_timeout_ms: 300,
            ..PoolSettings::default()
        }));
        let vault = Arc::new(CredentialVault::from_hex(&CredentialVault::generate_key()).unwrap());
        let registry = Arc::new(ConnectionRegistry::new(
            Arc::new(InMemoryConnectionRepository::new()),
            vault,
            pools.clone(),
        ));
        (QueryExecutor::new(registry.clone(), pools.clone(), 100), registry, pools)
    }

    async fn unreachable_connection(registry: &ConnectionRegistry) -> ConnectionId {
        registry
            .create(NewConnection {
                factory_id: FactoryId(Uuid::new_v4()),
                name: "nowhere".into(),
                db_type: DbType::Postgres,
                host: "127.0.0.1".into(),
                port: 1,
                database: "none".into(),
                username: "nobody".into(),
                password: "pw".into(),
                options: None,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_missing_connection_fails_before_pool_creation() {
        let (executor, _, pools) = executor();
        let id = ConnectionId::new();

        let err = executor.execute(id, "SELECT 1").await.unwrap_err();
        assert!(matches!(err, ServiceError::ConnectionNotFound(_)));

        let err = executor.execute_bound(id, "SELECT :a", &Map::new()).await.unwrap_err();
        assert!(matches!(err, ServiceError::ConnectionNotFound(_)));

        let err = executor.execute_file(id, "SELECT 1;").await.unwrap_err();
        assert!(matches!(err, ServiceError::ConnectionNotFound(_)));
        assert!(pools.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_execution_error_and_evicts() {
        let (executor, registry, pools) = executor();
        let id = unreachable_connection(&registry).await;

        let err = executor.execute(id, "SELECT 1").await.unwrap_err();
        assert!(matches!(err, ServiceError::Execution(_)));
        assert!(pools.cached(id).is_none());
    }

    #[tokio::test]
    async fn test_batch_records_every_failure() {
        let (executor, registry, _) = executor();
        let id = unreachable_connection(&registry).await;

        let batch = executor
            .execute_file(id, "SELECT 1; SELECT 2; SELECT 3;")
            .await
            .unwrap();
        assert_eq!(batch.total_queries, 3);
        assert_eq!(batch.failure_count, 3);
        assert_eq!(batch.success_count, 0);
        assert_eq!(batch.errors[1].query, "SELECT 2...");
    }

    #[test]
    fn test_parse_sql_file_delegates_to_splitter() {
        let statements = QueryExecutor::parse_sql_file("DROP TABLE a; -- gone\nselect 1");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].kind, StatementKind::Drop);
        assert_eq!(statements[1].kind, StatementKind::Select);
    }
}
