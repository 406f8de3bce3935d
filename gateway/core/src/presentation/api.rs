// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # HTTP API
//!
//! Axum router over the application services.
//!
//! # Architecture
//!
//! - **Layer:** Presentation
//! - **Purpose:** Request validation, id parsing and JSON shaping
//! - **Integration:** `AppState` → application services → `ApiError`
//!
//! Request bodies are parsed leniently: every field is optional at the
//! serde level so that missing fields produce the same
//! `Missing required fields: ...` messages the dashboard client expects.

use axum::body::Bytes;
use axum::extract::{FromRequest, Path, Query, Request, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::application::connection_registry::ConnectionRegistry;
use crate::application::query_analyzer::QueryAnalyzer;
use crate::application::query_executor::QueryExecutor;
use crate::application::schema_inspector::SchemaInspector;
use crate::application::sql_file_runner::{ParsedFile, SqlFileRunner};
use crate::application::widget_execution::WidgetExecutionService;
use crate::domain::analysis::QueryAnalysis;
use crate::domain::config::ServerConfig;
use crate::domain::connection::{
    ConnectionId, ConnectionPatch, ConnectionSummary, CustomerDbConfig, DbType, FactoryId, NewConnection,
};
use crate::domain::error::ServiceError;
use crate::domain::query::{BatchResult, ConnectionTestResult, ExecutionResult, QueryResult, Row};
use crate::domain::repository::{ConnectionRepository, SqlFileRepository, WidgetRepository};
use crate::domain::schema::{ColumnInfo, ForeignKeyInfo, SchemaStructure, TableInfo};
use crate::domain::sql_file::FileId;
use crate::domain::widget::WidgetId;
use crate::infrastructure::file_store::SqlFileStore;
use crate::infrastructure::pool_manager::PoolManager;
use crate::infrastructure::vault::CredentialVault;
use crate::presentation::error::ApiError;

/// Shared services behind every handler.
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub executor: Arc<QueryExecutor>,
    pub widgets: Arc<WidgetExecutionService>,
    pub inspector: Arc<SchemaInspector>,
    pub analyzer: Arc<QueryAnalyzer>,
    pub files: Arc<SqlFileRunner>,
    pub pools: Arc<PoolManager>,
    pub preview_row_limit: u32,
}

/// Storage collaborators the services are assembled from.
pub struct Repositories {
    pub connections: Arc<dyn ConnectionRepository>,
    pub widgets: Arc<dyn WidgetRepository>,
    pub files: Arc<dyn SqlFileRepository>,
    pub store: Arc<dyn SqlFileStore>,
}

impl AppState {
    pub fn assemble(repos: Repositories, vault: Arc<CredentialVault>, config: &ServerConfig) -> Self {
        let pools = Arc::new(PoolManager::new(config.pools.clone()));
        let registry = Arc::new(ConnectionRegistry::new(repos.connections, vault, pools.clone()));
        let executor = Arc::new(QueryExecutor::new(
            registry.clone(),
            pools.clone(),
            config.query.test_row_limit,
        ));

        Self {
            widgets: Arc::new(WidgetExecutionService::new(repos.widgets, executor.clone())),
            inspector: Arc::new(SchemaInspector::new(registry.clone(), config.pools.probe_timeout())),
            analyzer: Arc::new(QueryAnalyzer::new(executor.clone())),
            files: Arc::new(SqlFileRunner::new(repos.files, repos.store, executor.clone())),
            registry,
            executor,
            pools,
            preview_row_limit: config.query.preview_row_limit,
        }
    }
}

pub fn app(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/connections", get(list_connections).post(create_connection))
        .route("/api/connections/test", post(test_connection))
        .route(
            "/api/connections/{id}",
            get(get_connection).put(update_connection).delete(delete_connection),
        )
        .route("/api/connections/{id}/test", post(test_saved_connection))
        .route("/api/sql/execute", post(execute_sql))
        .route("/api/sql/execute-file/{file_id}", post(execute_sql_file))
        .route("/api/sql/analyze", post(analyze_query))
        .route("/api/sql/parse/{file_id}", get(parse_sql_file))
        .route("/api/widgets/{id}/execute", post(execute_widget))
        .route("/api/query/test", post(test_query))
        .route("/api/schema/{connection_id}/tables", get(list_tables))
        .route(
            "/api/schema/{connection_id}/tables/{schema}/{table}/columns",
            get(list_columns),
        )
        .route(
            "/api/schema/{connection_id}/tables/{schema}/{table}/preview",
            get(preview_table),
        )
        .route("/api/schema/{connection_id}/relationships", get(list_relationships))
        .route("/api/schema/{connection_id}/full", get(full_schema))
        .layer(TraceLayer::new_for_http())
        .layer(cors(cors_origins))
        .with_state(state)
}

fn cors(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(Duration::from_secs(600))
}

/// JSON body where an empty body means `T::default()`.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::validation(e.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(T::default()));
        }
        serde_json::from_slice(&bytes)
            .map(Self)
            .map_err(|e| ApiError::validation(format!("Invalid JSON body: {}", e)))
    }
}

fn parse_uuid<T>(raw: &str, what: &str, parse: impl Fn(&str) -> Result<T, uuid::Error>) -> Result<T, ApiError> {
    parse(raw).map_err(|_| ApiError::validation(format!("Invalid {}: {}", what, raw)))
}

fn connection_id(raw: &str) -> Result<ConnectionId, ApiError> {
    parse_uuid(raw, "connection id", ConnectionId::from_string)
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn required<T>(value: Option<T>, message: &str) -> Result<T, ApiError> {
    value.ok_or_else(|| ApiError::validation(message))
}

fn db_type(raw: &str) -> Result<DbType, ApiError> {
    raw.parse::<DbType>().map_err(ApiError::from)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

// ---- connections ----

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListConnectionsQuery {
    factory_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionBody {
    factory_id: Option<String>,
    name: Option<String>,
    db_type: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
    options: Option<Value>,
}

async fn list_connections(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListConnectionsQuery>,
) -> Result<Json<Vec<ConnectionSummary>>, ApiError> {
    let factory_id = query
        .factory_id
        .as_deref()
        .filter(|raw| !raw.is_empty())
        .map(|raw| parse_uuid(raw, "factory id", FactoryId::from_string))
        .transpose()?;

    let connections = state.registry.list(factory_id).await?;
    Ok(Json(connections.iter().map(|c| c.summary()).collect()))
}

async fn get_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ConnectionSummary>, ApiError> {
    let connection = state.registry.get(connection_id(&id)?).await?;
    Ok(Json(connection.summary()))
}

async fn create_connection(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<ConnectionBody>,
) -> Result<impl IntoResponse, ApiError> {
    const MISSING: &str =
        "Missing required fields: factoryId, name, dbType, host, port, database, username, password";

    let complete = present(&body.factory_id)
        && present(&body.name)
        && present(&body.db_type)
        && present(&body.host)
        && body.port.is_some()
        && present(&body.database)
        && present(&body.username)
        && present(&body.password);
    if !complete {
        return Err(ApiError::validation(MISSING));
    }

    let factory_id = parse_uuid(
        &required(body.factory_id, MISSING)?,
        "factory id",
        FactoryId::from_string,
    )?;
    let input = NewConnection {
        factory_id,
        name: required(body.name, MISSING)?,
        db_type: db_type(&required(body.db_type, MISSING)?)?,
        host: required(body.host, MISSING)?,
        port: required(body.port, MISSING)?,
        database: required(body.database, MISSING)?,
        username: required(body.username, MISSING)?,
        password: required(body.password, MISSING)?,
        options: body.options,
    };

    let connection = state.registry.create(input).await?;
    Ok((StatusCode::CREATED, Json(connection.summary())))
}

async fn update_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<ConnectionBody>,
) -> Result<Json<ConnectionSummary>, ApiError> {
    let id = connection_id(&id)?;
    let patch = ConnectionPatch {
        name: body.name,
        db_type: body.db_type.as_deref().map(db_type).transpose()?,
        host: body.host,
        port: body.port,
        database: body.database,
        username: body.username,
        password: body.password,
        options: body.options,
    };

    let connection = state.registry.update(id, patch).await?;
    Ok(Json(connection.summary()))
}

async fn delete_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = connection_id(&id)?;
    if state.registry.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServiceError::ConnectionNotFound(id.to_string()).into())
    }
}

async fn test_connection(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<ConnectionBody>,
) -> Result<Json<ConnectionTestResult>, ApiError> {
    const MISSING: &str = "Missing required fields: dbType, host, port, database, username, password";

    let complete = present(&body.db_type)
        && present(&body.host)
        && body.port.is_some()
        && present(&body.database)
        && present(&body.username)
        && present(&body.password);
    if !complete {
        return Err(ApiError::validation(MISSING));
    }

    let config = CustomerDbConfig {
        db_type: db_type(&required(body.db_type, MISSING)?)?,
        host: required(body.host, MISSING)?,
        port: required(body.port, MISSING)?,
        database: required(body.database, MISSING)?,
        username: required(body.username, MISSING)?,
        password: required(body.password, MISSING)?,
        options: body.options,
    };

    Ok(Json(state.registry.test_config(&config).await?))
}

async fn test_saved_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ConnectionTestResult>, ApiError> {
    Ok(Json(state.registry.test_saved(connection_id(&id)?).await?))
}

// ---- sql ----

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SqlBody {
    connection_id: Option<String>,
    query: Option<String>,
    params: Option<Map<String, Value>>,
}

impl SqlBody {
    /// Connection id and query, both required.
    fn target(&self) -> Result<(ConnectionId, &str), ApiError> {
        const MISSING: &str = "Missing required fields: connectionId, query";
        match (self.connection_id.as_deref(), self.query.as_deref()) {
            (Some(id), Some(query)) if !id.trim().is_empty() && !query.trim().is_empty() => {
                Ok((connection_id(id)?, query))
            }
            _ => Err(ApiError::validation(MISSING)),
        }
    }
}

async fn execute_sql(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<SqlBody>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let (connection_id, query) = body.target()?;
    Ok(Json(state.executor.execute(connection_id, query).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteFileBody {
    connection_id: Option<String>,
}

async fn execute_sql_file(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
    JsonBody(body): JsonBody<ExecuteFileBody>,
) -> Result<Json<BatchResult>, ApiError> {
    let file_id = parse_uuid(&file_id, "file id", FileId::from_string)?;
    let raw = body
        .connection_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::validation("Missing required field: connectionId"))?;

    Ok(Json(state.files.execute_file(file_id, connection_id(&raw)?).await?))
}

async fn analyze_query(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<SqlBody>,
) -> Result<Json<QueryAnalysis>, ApiError> {
    let (connection_id, query) = body.target()?;
    Ok(Json(state.analyzer.analyze(connection_id, query).await?))
}

async fn parse_sql_file(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Json<ParsedFile>, ApiError> {
    let file_id = parse_uuid(&file_id, "file id", FileId::from_string)?;
    Ok(Json(state.files.parse(file_id).await?))
}

// ---- widgets and builder ----

#[derive(Debug, Default, Deserialize)]
struct WidgetExecuteBody {
    #[serde(default)]
    filters: Map<String, Value>,
}

async fn execute_widget(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<WidgetExecuteBody>,
) -> Result<Json<QueryResult>, ApiError> {
    let widget_id = parse_uuid(&id, "widget id", WidgetId::from_string)?;
    Ok(Json(state.widgets.execute_widget(widget_id, &body.filters).await?))
}

async fn test_query(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<SqlBody>,
) -> Result<Json<QueryResult>, ApiError> {
    let (connection_id, query) = body.target()?;
    let params = body.params.clone().unwrap_or_default();
    Ok(Json(state.widgets.test_query(connection_id, query, &params).await?))
}

// ---- schema ----

#[derive(Debug, Default, Deserialize)]
struct PreviewQuery {
    limit: Option<i64>,
}

async fn list_tables(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<TableInfo>>, ApiError> {
    Ok(Json(state.inspector.list_tables(connection_id(&id)?).await?))
}

async fn list_columns(
    State(state): State<Arc<AppState>>,
    Path((id, schema, table)): Path<(String, String, String)>,
) -> Result<Json<Vec<ColumnInfo>>, ApiError> {
    let columns = state
        .inspector
        .list_columns(connection_id(&id)?, &schema, &table)
        .await?;
    Ok(Json(columns))
}

async fn preview_table(
    State(state): State<Arc<AppState>>,
    Path((id, schema, table)): Path<(String, String, String)>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<Vec<Row>>, ApiError> {
    let id = connection_id(&id)?;
    let limit = query.limit.unwrap_or(i64::from(state.preview_row_limit));
    if limit <= 0 {
        return Err(ApiError::validation("limit must be a positive integer"));
    }
    Ok(Json(state.inspector.preview_rows(id, &schema, &table, limit).await?))
}

async fn list_relationships(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ForeignKeyInfo>>, ApiError> {
    Ok(Json(state.inspector.list_foreign_keys(connection_id(&id)?).await?))
}

async fn full_schema(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SchemaStructure>, ApiError> {
    Ok(Json(state.inspector.full_schema(connection_id(&id)?).await?))
}
