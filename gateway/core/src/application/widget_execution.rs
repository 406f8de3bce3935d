// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Widget Execution Facade
//!
//! Entry point of the dashboard runtime: runs a saved widget's template
//! with the caller's filter values, and runs unsaved templates from the
//! builder's "Test Query" action under the test row cap.
//!
//! Nothing is persisted here.

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

use crate::application::query_executor::QueryExecutor;
use crate::domain::connection::ConnectionId;
use crate::domain::error::ServiceError;
use crate::domain::query::QueryResult;
use crate::domain::repository::WidgetRepository;
use crate::domain::widget::WidgetId;

pub struct WidgetExecutionService {
    widgets: Arc<dyn WidgetRepository>,
    executor: Arc<QueryExecutor>,
}

impl WidgetExecutionService {
    pub fn new(widgets: Arc<dyn WidgetRepository>, executor: Arc<QueryExecutor>) -> Self {
        Self { widgets, executor }
    }

    /// Runs the widget's query with its defaults overridden by `filters`.
    pub async fn execute_widget(
        &self,
        widget_id: WidgetId,
        filters: &Map<String, Value>,
    ) -> Result<QueryResult, ServiceError> {
        let widget = self
            .widgets
            .find_by_id(widget_id)
            .await?
            .ok_or_else(|| ServiceError::WidgetNotFound(widget_id.to_string()))?;

        let params = widget.merged_params(filters);
        let result = self
            .executor
            .execute_bound(widget.connection_id, &widget.query, &params)
            .await
            .map_err(|e| prefixed(e, "Query execution failed"))?;

        info!(
            widget_id = %widget_id,
            connection_id = %widget.connection_id,
            rows = result.row_count,
            "Widget executed"
        );
        Ok(result)
    }

    /// Runs an unsaved template, capped like every builder test query.
    pub async fn test_query(
        &self,
        connection_id: ConnectionId,
        query: &str,
        params: &Map<String, Value>,
    ) -> Result<QueryResult, ServiceError> {
        self.executor
            .test_bound(connection_id, query, params)
            .await
            .map_err(|e| prefixed(e, "Query test failed"))
    }
}

/// Prefixes driver failures; other kinds keep their own message and status.
fn prefixed(err: ServiceError, prefix: &str) -> ServiceError {
    match err {
        ServiceError::Execution(message) => ServiceError::Execution(format!("{}: {}", prefix, message)),
        other => other,
    }
}
