// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Customer Pool Manager
//!
//! Process-wide cache of bounded PostgreSQL pools, one per saved connection.
//!
//! - Pools are created lazily on first use and never garbage-collected while
//!   cached. They are destroyed on credential change, deletion, connection
//!   level failure, or shutdown.
//! - `get_or_create` performs lookup and insert under a single shard lock of
//!   the map with no `.await` in between, so concurrent callers for the same
//!   connection always share one pool.
//! - A failing call is never retried. The poisoned pool is dropped from the
//!   cache so the *next* call builds a fresh one.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Own every live session to customer databases
//! - **Integration:** Query Executor / Connection Registry → PoolManager → PgPool

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::config::PoolSettings;
use crate::domain::connection::{ConnectionId, CustomerDbConfig};
use crate::domain::error::ServiceError;
use crate::domain::query::ConnectionTestResult;

const APPLICATION_NAME: &str = "dashforge";

/// A cached pool and the credentials fingerprint it was built with.
#[derive(Debug)]
pub struct CustomerPool {
    connection_id: ConnectionId,
    fingerprint: String,
    pool: PgPool,
    created_at: DateTime<Utc>,
}

impl CustomerPool {
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

pub struct PoolManager {
    pools: DashMap<ConnectionId, Arc<CustomerPool>>,
    settings: PoolSettings,
}

impl PoolManager {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            pools: DashMap::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Returns the cached pool for `connection_id`, building it if absent.
    ///
    /// A cached pool built from different host, port, database or
    /// credentials is replaced and closed.
    pub async fn get_or_create(
        &self,
        connection_id: ConnectionId,
        config: &CustomerDbConfig,
    ) -> Result<Arc<CustomerPool>, ServiceError> {
        config.db_type.ensure_supported()?;
        let fingerprint = fingerprint(config);

        let (pool, stale) = match self.pools.entry(connection_id) {
            Entry::Occupied(entry) if entry.get().fingerprint == fingerprint => {
                return Ok(entry.get().clone());
            }
            Entry::Occupied(mut entry) => {
                let fresh = Arc::new(self.build(connection_id, config, fingerprint));
                let stale = entry.insert(fresh.clone());
                (fresh, Some(stale))
            }
            Entry::Vacant(entry) => {
                let fresh = Arc::new(self.build(connection_id, config, fingerprint));
                entry.insert(fresh.clone());
                (fresh, None)
            }
        };

        metrics::counter!("dashforge_pools_created_total").increment(1);
        self.record_active();

        if let Some(stale) = stale {
            info!(connection_id = %connection_id, "Replacing pool built from outdated settings");
            metrics::counter!("dashforge_pools_evicted_total").increment(1);
            stale.pool.close().await;
        }

        Ok(pool)
    }

    fn build(
        &self,
        connection_id: ConnectionId,
        config: &CustomerDbConfig,
        fingerprint: String,
    ) -> CustomerPool {
        debug!(
            connection_id = %connection_id,
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Creating customer pool"
        );
        let pool = PgPoolOptions::new()
            .max_connections(self.settings.max_connections)
            .acquire_timeout(self.settings.acquire_timeout())
            .idle_timeout(Some(self.settings.idle_timeout()))
            .connect_lazy_with(connect_options(config));

        CustomerPool {
            connection_id,
            fingerprint,
            pool,
            created_at: Utc::now(),
        }
    }

    /// Closes and removes the cached pool. No-op when none is cached.
    pub async fn evict(&self, connection_id: ConnectionId) {
        if let Some((_, cached)) = self.pools.remove(&connection_id) {
            info!(connection_id = %connection_id, "Evicting customer pool");
            metrics::counter!("dashforge_pools_evicted_total").increment(1);
            self.record_active();
            cached.pool.close().await;
        }
    }

    /// Closes every cached pool.
    pub async fn evict_all(&self) {
        let ids: Vec<ConnectionId> = self.pools.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.evict(id).await;
        }
        info!("All customer pools closed");
    }

    /// Drops `pool` from the cache if `err` means its sessions are unusable.
    ///
    /// Only the exact pool instance that failed is removed; a replacement
    /// built concurrently by another caller stays cached.
    pub fn report_failure(&self, connection_id: ConnectionId, pool: &Arc<CustomerPool>, err: &sqlx::Error) {
        if !is_connection_error(err) {
            return;
        }

        let removed = self
            .pools
            .remove_if(&connection_id, |_, cached| Arc::ptr_eq(cached, pool));

        if let Some((_, poisoned)) = removed {
            warn!(
                connection_id = %connection_id,
                error = %err,
                "Connection-level failure, evicting customer pool"
            );
            metrics::counter!("dashforge_pools_evicted_total").increment(1);
            self.record_active();
            tokio::spawn(async move {
                poisoned.pool.close().await;
            });
        }
    }

    /// Probes reachability with a throwaway single-session pool that is
    /// always closed and never cached.
    pub async fn test_once(&self, config: &CustomerDbConfig) -> Result<ConnectionTestResult, ServiceError> {
        config.db_type.ensure_supported()?;

        let probe = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.settings.probe_timeout())
            .connect_lazy_with(connect_options(config));

        let outcome = sqlx::query("SELECT 1").execute(&probe).await;
        probe.close().await;

        Ok(match outcome {
            Ok(_) => ConnectionTestResult::ok(),
            Err(e) => {
                debug!(host = %config.host, error = %e, "Connection probe failed");
                ConnectionTestResult::failed(driver_message(&e))
            }
        })
    }

    pub fn cached(&self, connection_id: ConnectionId) -> Option<Arc<CustomerPool>> {
        self.pools.get(&connection_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    fn record_active(&self) {
        metrics::gauge!("dashforge_pools_active").set(self.pools.len() as f64);
    }
}

/// Session options for one customer database. Never reads `~/.pgpass`.
pub fn connect_options(config: &CustomerDbConfig) -> PgConnectOptions {
    let mut options = PgConnectOptions::new_without_pgpass()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .username(&config.username)
        .password(&config.password)
        .application_name(APPLICATION_NAME);

    if let Some(mode) = config.ssl_mode() {
        match PgSslMode::from_str(mode) {
            Ok(mode) => options = options.ssl_mode(mode),
            Err(_) => warn!(sslmode = mode, "Ignoring unknown sslmode option"),
        }
    }
    options
}

/// SHA-256 over everything that identifies the physical database and login.
fn fingerprint(config: &CustomerDbConfig) -> String {
    let mut hasher = Sha256::new();
    for part in [
        config.host.as_str(),
        &config.port.to_string(),
        config.database.as_str(),
        config.username.as_str(),
        config.password.as_str(),
        config.ssl_mode().unwrap_or(""),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Whether `err` means the pool's sessions (not the statement) are broken.
pub fn is_connection_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db.code().is_some_and(|code| {
            // connection exception, invalid authorization, operator intervention, unknown database
            code.starts_with("08") || code.starts_with("28") || code.starts_with("57P") || code == "3D000"
        }),
        _ => false,
    }
}

/// Driver message without sqlx's wrapping.
pub fn driver_message(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connection::DbType;

    fn config(password: &str) -> CustomerDbConfig {
        CustomerDbConfig {
            db_type: DbType::Postgres,
            host: "127.0.0.1".to_string(),
            port: 1,
            database: "mes".to_string(),
            username: "reporting".to_string(),
            password: password.to_string(),
            options: None,
        }
    }

    #[tokio::test]
    async fn test_same_connection_shares_one_pool() {
        let manager = Arc::new(PoolManager::new(PoolSettings::default()));
        let id = ConnectionId::new();

        let (first, second) = (config("pw"), config("pw"));
        let (a, b) = tokio::join!(
            manager.get_or_create(id, &first),
            manager.get_or_create(id, &second)
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_changed_credentials_rebuild_pool() {
        let manager = PoolManager::new(PoolSettings::default());
        let id = ConnectionId::new();

        let old = manager.get_or_create(id, &config("old")).await.unwrap();
        let new = manager.get_or_create(id, &config("new")).await.unwrap();

        assert!(!Arc::ptr_eq(&old, &new));
        assert!(old.pool().is_closed());
        assert_ne!(old.fingerprint(), new.fingerprint());
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_evict_is_idempotent() {
        let manager = PoolManager::new(PoolSettings::default());
        let id = ConnectionId::new();

        manager.evict(id).await;

        let pool = manager.get_or_create(id, &config("pw")).await.unwrap();
        manager.evict(id).await;
        manager.evict(id).await;

        assert!(pool.pool().is_closed());
        assert!(manager.cached(id).is_none());
    }

    #[tokio::test]
    async fn test_evict_all_closes_everything() {
        let manager = PoolManager::new(PoolSettings::default());
        let pools = [
            manager.get_or_create(ConnectionId::new(), &config("a")).await.unwrap(),
            manager.get_or_create(ConnectionId::new(), &config("b")).await.unwrap(),
        ];

        manager.evict_all().await;

        assert!(manager.is_empty());
        assert!(pools.iter().all(|p| p.pool().is_closed()));
    }

    #[tokio::test]
    async fn test_unsupported_engine_creates_nothing() {
        let manager = PoolManager::new(PoolSettings::default());
        let mut mysql = config("pw");
        mysql.db_type = DbType::Mysql;

        let result = manager.get_or_create(ConnectionId::new(), &mysql).await;
        assert!(matches!(result, Err(ServiceError::UnsupportedEngine(_))));
        assert!(manager.is_empty());

        let probe = manager.test_once(&mysql).await;
        assert!(matches!(probe, Err(ServiceError::UnsupportedEngine(_))));
    }

    #[tokio::test]
    async fn test_failure_evicts_only_the_failing_pool() {
        let manager = PoolManager::new(PoolSettings::default());
        let id = ConnectionId::new();
        let first = manager.get_or_create(id, &config("pw")).await.unwrap();

        manager.report_failure(id, &first, &sqlx::Error::RowNotFound);
        assert!(manager.cached(id).is_some());

        manager.report_failure(id, &first, &sqlx::Error::PoolTimedOut);
        assert!(manager.cached(id).is_none());

        let second = manager.get_or_create(id, &config("pw")).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        manager.report_failure(id, &first, &sqlx::Error::PoolTimedOut);
        assert!(Arc::ptr_eq(&manager.cached(id).unwrap(), &second));
    }

    #[tokio::test]
    async fn test_probe_reports_unreachable_host() {
        let manager = PoolManager::new(PoolSettings {
            probe_timeout_ms: 500,
            ..PoolSettings::default()
        });
        let result = manager.test_once(&config("pw")).await.unwrap();
        assert!(!result.success);
        assert!(result.error.is_some());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_connection_error_classification() {
        assert!(is_connection_error(&sqlx::Error::PoolTimedOut));
        assert!(is_connection_error(&sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused"
        ))));
        assert!(!is_connection_error(&sqlx::Error::RowNotFound));
        assert!(!is_connection_error(&sqlx::Error::ColumnNotFound("x".into())));
    }
}
