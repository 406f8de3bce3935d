// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Application Database Pool
//!
//! Wraps the `sqlx::postgres::PgPool` of the application database (saved
//! connections, widgets, uploaded file metadata) in a `Database` newtype
//! injected into the PostgreSQL repositories.
//!
//! This pool is unrelated to customer pools, which live in
//! `infrastructure::pool_manager`.

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

use crate::domain::config::DatabaseConfig;

const IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Tables this service owns. Columns this service does not read are left to
/// the dashboard builder's own migrations.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS connections (
        id UUID PRIMARY KEY,
        factory_id UUID NOT NULL,
        name TEXT NOT NULL,
        db_type TEXT NOT NULL,
        host TEXT NOT NULL,
        port INTEGER NOT NULL,
        database TEXT NOT NULL,
        user_enc TEXT NOT NULL,
        pass_enc TEXT NOT NULL,
        options_enc TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_connections_factory ON connections (factory_id, created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS widgets (
        id UUID PRIMARY KEY,
        dashboard_id UUID NOT NULL,
        type TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT,
        connection_id UUID NOT NULL,
        query TEXT NOT NULL,
        params JSONB NOT NULL DEFAULT '{}'::jsonb,
        refresh_interval INTEGER,
        viz_options JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS uploaded_files (
        id UUID PRIMARY KEY,
        factory_id UUID NOT NULL,
        file_name TEXT NOT NULL,
        file_type TEXT NOT NULL,
        file_path TEXT NOT NULL,
        file_size BIGINT NOT NULL,
        status TEXT NOT NULL DEFAULT 'uploaded',
        metadata JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
];

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(connection_string: &str, config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .idle_timeout(Some(IDLE_TIMEOUT))
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(connection_string)
            .await
            .context("Failed to connect to application database")?;

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the owned tables when missing. Idempotent.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply application schema")?;
        }
        info!("Application schema ready");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
