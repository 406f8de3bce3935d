// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP server startup and shutdown

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use dashforge_core::domain::config::{ServerConfig, StorageBackend};
use dashforge_core::infrastructure::db::Database;
use dashforge_core::infrastructure::file_store::LocalSqlFileStore;
use dashforge_core::infrastructure::repositories::{
    InMemoryConnectionRepository, InMemorySqlFileRepository, InMemoryWidgetRepository,
    PostgresConnectionRepository, PostgresSqlFileRepository, PostgresWidgetRepository,
};
use dashforge_core::infrastructure::vault::CredentialVault;
use dashforge_core::presentation::api::{app, AppState, Repositories};

use super::{install_metrics_exporter, shutdown_signal};

/// Runs the gateway until a shutdown signal arrives.
///
/// The vault key is checked before anything touches the network, so a
/// missing or malformed key never reaches a bound listener.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    config.validate().context("Configuration validation failed")?;

    let vault = Arc::new(build_vault(&config)?);
    let (repos, database) = build_repositories(&config).await?;

    if config.metrics.enabled {
        install_metrics_exporter(&config.network.bind_address, config.metrics.port)?;
    }

    let state = Arc::new(AppState::assemble(repos, vault, &config));
    let router = app(state.clone(), &config.network.cors_origins);

    let addr = format!("{}:{}", config.network.bind_address, config.network.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Dashforge gateway listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Gateway shutting down");
    state.pools.evict_all().await;
    if let Some(database) = database {
        database.close().await;
    }

    Ok(())
}

pub fn build_vault(config: &ServerConfig) -> Result<CredentialVault> {
    let key = config
        .resolve_encryption_key()
        .context("Credential vault key is not configured")?;
    CredentialVault::from_hex(&key).context("Credential vault key is invalid")
}

/// Repositories for the configured backend, plus the database handle to
/// close on shutdown when there is one.
pub async fn build_repositories(config: &ServerConfig) -> Result<(Repositories, Option<Database>)> {
    let store = Arc::new(LocalSqlFileStore::new(config.storage.upload_dir.clone()));

    match config.storage.backend {
        StorageBackend::Postgres => {
            let url = config
                .resolve_database_url()
                .context("Application database URL is not configured")?;
            let database = Database::new(&url, &config.database).await?;
            database
                .ensure_schema()
                .await
                .context("Failed to prepare application tables")?;

            let pool = database.get_pool().clone();
            let repos = Repositories {
                connections: Arc::new(PostgresConnectionRepository::new(pool.clone())),
                widgets: Arc::new(PostgresWidgetRepository::new(pool.clone())),
                files: Arc::new(PostgresSqlFileRepository::new(pool)),
                store,
            };
            Ok((repos, Some(database)))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; saved connections are lost on restart");
            let repos = Repositories {
                connections: Arc::new(InMemoryConnectionRepository::new()),
                widgets: Arc::new(InMemoryWidgetRepository::new()),
                files: Arc::new(InMemorySqlFileRepository::new()),
                store,
            };
            Ok((repos, None))
        }
    }
}
