// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Router behaviour that needs no customer database: validation, not-found
//! mapping, connection CRUD and health.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use dashforge_core::domain::config::ServerConfig;
use dashforge_core::infrastructure::file_store::LocalSqlFileStore;
use dashforge_core::infrastructure::repositories::{
    InMemoryConnectionRepository, InMemorySqlFileRepository, InMemoryWidgetRepository,
};
use dashforge_core::infrastructure::vault::CredentialVault;
use dashforge_core::presentation::api::{app, AppState, Repositories};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;
use uuid::Uuid;

fn router(upload_dir: &TempDir) -> Router {
    let config = ServerConfig::default();
    let repos = Repositories {
        connections: Arc::new(InMemoryConnectionRepository::new()),
        widgets: Arc::new(InMemoryWidgetRepository::new()),
        files: Arc::new(InMemorySqlFileRepository::new()),
        store: Arc::new(LocalSqlFileStore::new(upload_dir.path())),
    };
    let vault = Arc::new(CredentialVault::from_hex(&CredentialVault::generate_key()).unwrap());
    let state = Arc::new(AppState::assemble(repos, vault, &config));
    app(state, &config.network.cors_origins)
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Collects the message of every event emitted while installed.
#[derive(Clone, Default)]
struct Messages(Arc<Mutex<Vec<String>>>);

impl Messages {
    fn count(&self, message: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|m| *m == message).count()
    }
}

struct MessageField<'a>(&'a mut Option<String>);

impl Visit for MessageField<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.0 = Some(format!("{:?}", value));
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for Messages {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut message = None;
        event.record(&mut MessageField(&mut message));
        if let Some(message) = message {
            self.0.lock().unwrap().push(message);
        }
    }
}

fn connection_body(db_type: &str) -> Value {
    json!({
        "factoryId": Uuid::new_v4().to_string(),
        "name": "Packaging line",
        "dbType": db_type,
        "host": "db.plant.internal",
        "port": 5432,
        "database": "mes",
        "username": "reader",
        "password": "s3cret",
    })
}

#[tokio::test]
async fn test_health() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(&router(&dir), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_execute_requires_connection_and_query() {
    let dir = TempDir::new().unwrap();
    let router = router(&dir);

    for uri in ["/api/sql/execute", "/api/query/test", "/api/sql/analyze"] {
        let (status, body) = send(&router, "POST", uri, Some(json!({ "query": "SELECT 1" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["error"], "ValidationError");
        assert_eq!(body["message"], "Missing required fields: connectionId, query");
    }
}

#[tokio::test]
async fn test_execute_file_requires_connection() {
    let dir = TempDir::new().unwrap();
    let uri = format!("/api/sql/execute-file/{}", Uuid::new_v4());
    let (status, body) = send(&router(&dir), "POST", &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing required field: connectionId");
}

#[tokio::test]
async fn test_unknown_ids_map_to_not_found() {
    let dir = TempDir::new().unwrap();
    let router = router(&dir);

    let (status, body) = send(
        &router,
        "POST",
        "/api/sql/execute",
        Some(json!({ "connectionId": Uuid::new_v4().to_string(), "query": "SELECT 1" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "ConnectionNotFound");

    let uri = format!("/api/widgets/{}/execute", Uuid::new_v4());
    let (status, body) = send(&router, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "WidgetNotFound");

    let uri = format!("/api/sql/parse/{}", Uuid::new_v4());
    let (status, body) = send(&router, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "FileNotFound");
}

#[tokio::test]
async fn test_malformed_id_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(&router(&dir), "GET", "/api/schema/line-3/tables", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid connection id: line-3");
}

#[tokio::test]
async fn test_probe_of_unsupported_engine_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(
        &router(&dir),
        "POST",
        "/api/connections/test",
        Some(connection_body("mysql")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "UnsupportedEngine");
}

#[tokio::test]
async fn test_probe_of_unknown_saved_connection_is_failed_result() {
    let dir = TempDir::new().unwrap();
    let uri = format!("/api/connections/{}/test", Uuid::new_v4());
    let (status, body) = send(&router(&dir), "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": false, "error": "Connection not found" }));
}

#[tokio::test]
async fn test_connection_crud_never_exposes_secrets() {
    let dir = TempDir::new().unwrap();
    let router = router(&dir);

    let (status, created) = send(&router, "POST", "/api/connections", Some(connection_body("postgres"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["dbType"], "postgres");
    let text = created.to_string();
    assert!(!text.contains("s3cret"));
    assert!(!text.contains("reader"));

    let id = created["id"].as_str().unwrap().to_string();
    let (status, fetched) = send(&router, "GET", &format!("/api/connections/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "Packaging line");

    let (status, updated) = send(
        &router,
        "PUT",
        &format!("/api/connections/{}", id),
        Some(json!({ "name": "Packaging line 2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Packaging line 2");
    assert_eq!(updated["host"], "db.plant.internal");

    let (status, listed) = send(&router, "GET", "/api/connections", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, _) = send(&router, "DELETE", &format!("/api/connections/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&router, "DELETE", &format!("/api/connections/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_connection_lists_required_fields() {
    let dir = TempDir::new().unwrap();
    let mut body = connection_body("postgres");
    body.as_object_mut().unwrap().remove("password");

    let (status, response) = send(&router(&dir), "POST", "/api/connections", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response["message"]
        .as_str()
        .unwrap()
        .starts_with("Missing required fields: factoryId"));
}

#[tokio::test]
async fn test_preview_rejects_non_positive_limit() {
    let dir = TempDir::new().unwrap();
    let uri = format!("/api/schema/{}/tables/public/orders/preview?limit=0", Uuid::new_v4());
    let (status, body) = send(&router(&dir), "GET", &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "limit must be a positive integer");
}

#[tokio::test]
async fn test_connection_lifecycle_is_logged_once() {
    let messages = Messages::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(messages.clone()));
    let dir = TempDir::new().unwrap();
    let router = router(&dir);

    let (_, created) = send(&router, "POST", "/api/connections", Some(connection_body("postgres"))).await;
    let id = created["id"].as_str().unwrap().to_string();
    let (status, _) = send(&router, "DELETE", &format!("/api/connections/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert_eq!(messages.count("Connection created"), 1);
    assert_eq!(messages.count("Connection deleted"), 1);
}
