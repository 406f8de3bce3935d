// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Connection registry and pool cache working together.
//!
//! Pools are built lazily, so none of these tests open a socket.

use dashforge_core::application::connection_registry::ConnectionRegistry;
use dashforge_core::application::query_executor::QueryExecutor;
use dashforge_core::domain::config::PoolSettings;
use dashforge_core::domain::connection::{ConnectionId, ConnectionPatch, DbType, FactoryId, NewConnection};
use dashforge_core::domain::error::ServiceError;
use dashforge_core::infrastructure::pool_manager::PoolManager;
use dashforge_core::infrastructure::repositories::InMemoryConnectionRepository;
use dashforge_core::infrastructure::vault::CredentialVault;
use serde_json::Map;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

struct Harness {
    registry: Arc<ConnectionRegistry>,
    pools: Arc<PoolManager>,
    executor: QueryExecutor,
}

fn harness() -> Harness {
    let pools = Arc::new(PoolManager::new(PoolSettings::default()));
    let vault = Arc::new(CredentialVault::from_hex(&CredentialVault::generate_key()).unwrap());
    let registry = Arc::new(ConnectionRegistry::new(
        Arc::new(InMemoryConnectionRepository::new()),
        vault,
        pools.clone(),
    ));
    let executor = QueryExecutor::new(registry.clone(), pools.clone(), 100);
    Harness {
        registry,
        pools,
        executor,
    }
}

fn new_connection(db_type: DbType) -> NewConnection {
    NewConnection {
        factory_id: FactoryId(Uuid::new_v4()),
        name: "line 3 historian".into(),
        db_type,
        host: "db.plant.internal".into(),
        port: 5432,
        database: "mes".into(),
        username: "reader".into(),
        password: "first-password".into(),
        options: None,
    }
}

async fn warm_pool(h: &Harness, id: ConnectionId) {
    let decrypted = h.registry.get_decrypted(id).await.unwrap();
    assert_ok!(h.pools.get_or_create(id, &decrypted.db_config()).await);
}

#[tokio::test]
async fn test_credential_change_evicts_cached_pool() {
    let h = harness();
    let id = h.registry.create(new_connection(DbType::Postgres)).await.unwrap().id;
    warm_pool(&h, id).await;
    let before = h.pools.cached(id).unwrap();

    let patch = ConnectionPatch {
        password: Some("rotated".into()),
        ..Default::default()
    };
    h.registry.update(id, patch).await.unwrap();
    assert!(h.pools.cached(id).is_none());

    warm_pool(&h, id).await;
    let after = h.pools.cached(id).unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_ne!(before.fingerprint(), after.fingerprint());
}

#[tokio::test]
async fn test_rename_keeps_cached_pool() {
    let h = harness();
    let id = h.registry.create(new_connection(DbType::Postgres)).await.unwrap().id;
    warm_pool(&h, id).await;
    let before = h.pools.cached(id).unwrap();

    let patch = ConnectionPatch {
        name: Some("line 3 historian (replica)".into()),
        ..Default::default()
    };
    h.registry.update(id, patch).await.unwrap();

    let after = h.pools.cached(id).unwrap();
    assert!(Arc::ptr_eq(&before, &after));
}

#[tokio::test]
async fn test_delete_evicts_cached_pool() {
    let h = harness();
    let id = h.registry.create(new_connection(DbType::Postgres)).await.unwrap().id;
    warm_pool(&h, id).await;
    assert_eq!(h.pools.len(), 1);

    assert!(h.registry.delete(id).await.unwrap());
    assert!(h.pools.is_empty());
    assert!(!h.registry.delete(id).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_first_use_builds_one_pool() {
    let h = harness();
    let id = h.registry.create(new_connection(DbType::Postgres)).await.unwrap().id;
    let config = h.registry.get_decrypted(id).await.unwrap().db_config();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pools = h.pools.clone();
            let config = config.clone();
            tokio::spawn(async move { pools.get_or_create(id, &config).await })
        })
        .collect();

    let mut created = Vec::new();
    for handle in handles {
        created.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(h.pools.len(), 1);
    assert!(created.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

#[tokio::test]
async fn test_missing_connection_creates_no_pool() {
    let h = harness();
    let err = assert_err!(h.executor.execute(ConnectionId::new(), "SELECT 1").await);
    assert!(matches!(err, ServiceError::ConnectionNotFound(_)));

    let err = assert_err!(
        h.executor
            .execute_bound(ConnectionId::new(), "SELECT :x", &Map::new())
            .await
    );
    assert!(matches!(err, ServiceError::ConnectionNotFound(_)));
    assert!(h.pools.is_empty());
}

#[tokio::test]
async fn test_unsupported_engine_creates_no_pool() {
    let h = harness();
    let id = h.registry.create(new_connection(DbType::Mysql)).await;
    let err = assert_err!(id);
    assert!(matches!(err, ServiceError::UnsupportedEngine(_)));
    assert!(h.registry.list(None).await.unwrap().is_empty());
    assert!(h.pools.is_empty());
}

#[tokio::test]
async fn test_evict_all_empties_cache() {
    let h = harness();
    for _ in 0..3 {
        let id = h.registry.create(new_connection(DbType::Postgres)).await.unwrap().id;
        warm_pool(&h, id).await;
    }
    assert_eq!(h.pools.len(), 3);

    h.pools.evict_all().await;
    assert!(h.pools.is_empty());
}
