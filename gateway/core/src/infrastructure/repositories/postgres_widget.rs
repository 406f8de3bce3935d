// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Widget Repository
//!
//! Reads and upserts rows of the `widgets` table. `params` and
//! `viz_options` are JSONB columns.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::connection::ConnectionId;
use crate::domain::repository::{RepositoryError, WidgetRepository};
use crate::domain::widget::{Widget, WidgetId, WidgetType};

pub struct PostgresWidgetRepository {
    pool: PgPool,
}

impl PostgresWidgetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn widget_from_row(row: &PgRow) -> Result<Widget, RepositoryError> {
    let type_str: String = row.try_get("type")?;
    let widget_type = WidgetType::parse(&type_str)
        .ok_or_else(|| RepositoryError::Serialization(format!("Unknown widget type: {}", type_str)))?;

    // NULL or non-object params behave like no defaults
    let params = match row.try_get::<Option<serde_json::Value>, _>("params")? {
        Some(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };

    Ok(Widget {
        id: WidgetId(row.try_get("id")?),
        dashboard_id: row.try_get("dashboard_id")?,
        widget_type,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        connection_id: ConnectionId(row.try_get("connection_id")?),
        query: row.try_get("query")?,
        params,
        refresh_interval: row.try_get("refresh_interval")?,
        viz_options: row.try_get("viz_options")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl WidgetRepository for PostgresWidgetRepository {
    async fn save(&self, widget: &Widget) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO widgets (
                id, dashboard_id, type, title, description, connection_id,
                query, params, refresh_interval, viz_options, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                type = EXCLUDED.type,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                connection_id = EXCLUDED.connection_id,
                query = EXCLUDED.query,
                params = EXCLUDED.params,
                refresh_interval = EXCLUDED.refresh_interval,
                viz_options = EXCLUDED.viz_options,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(widget.id.0)
        .bind(widget.dashboard_id)
        .bind(widget.widget_type.as_str())
        .bind(&widget.title)
        .bind(&widget.description)
        .bind(widget.connection_id.0)
        .bind(&widget.query)
        .bind(serde_json::Value::Object(widget.params.clone()))
        .bind(widget.refresh_interval)
        .bind(&widget.viz_options)
        .bind(widget.created_at)
        .bind(widget.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save widget: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: WidgetId) -> Result<Option<Widget>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, dashboard_id, type, title, description, connection_id,
                   query, params, refresh_interval, viz_options, created_at, updated_at
            FROM widgets
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(widget_from_row).transpose()
    }
}
