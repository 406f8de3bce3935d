// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Executes a query and profiles its result for chart recommendations.

use std::sync::Arc;
use tracing::debug;

use crate::application::query_executor::QueryExecutor;
use crate::domain::analysis::QueryAnalysis;
use crate::domain::connection::ConnectionId;
use crate::domain::error::ServiceError;

pub struct QueryAnalyzer {
    executor: Arc<QueryExecutor>,
}

impl QueryAnalyzer {
    pub fn new(executor: Arc<QueryExecutor>) -> Self {
        Self { executor }
    }

    pub async fn analyze(&self, connection_id: ConnectionId, query: &str) -> Result<QueryAnalysis, ServiceError> {
        let result = self.executor.execute(connection_id, query).await?;
        let analysis = QueryAnalysis::from_result(query, &result);
        debug!(
            connection_id = %connection_id,
            recommended = ?analysis.recommended_chart_types,
            "Query analysed"
        );
        Ok(analysis)
    }
}
