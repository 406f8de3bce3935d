// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Query Analysis
//!
//! Classifies the shape of a result set and recommends widget chart types
//! for it. Pure functions over an [`ExecutionResult`]; running the query is
//! the caller's business (`application::query_analyzer`).

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::domain::query::{ExecutionResult, SqlValue};
pub use crate::domain::widget::WidgetType as ChartType;

static AGGREGATE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)count|sum|avg|min|max").expect("static regex"));
static GROUP_BY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)GROUP\s+BY").expect("static regex"));

/// Row count up to which a single numeric series still reads well as bars.
const SMALL_SERIES_ROWS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Text,
    Date,
    Boolean,
    Other,
}

impl ColumnKind {
    /// Profiles a column from one sample value.
    ///
    /// Text that parses as a number counts as numeric since `numeric`
    /// aggregates (`avg`, `sum` over decimals) are decoded as text to keep
    /// their precision.
    pub fn of(sample: Option<&SqlValue>) -> Self {
        match sample {
            Some(SqlValue::Int(_)) | Some(SqlValue::Float(_)) => ColumnKind::Numeric,
            Some(SqlValue::Bool(_)) => ColumnKind::Boolean,
            Some(SqlValue::Timestamp(_)) => ColumnKind::Date,
            Some(SqlValue::Text(text)) => {
                if text.trim().parse::<f64>().is_ok_and(f64::is_finite) {
                    ColumnKind::Numeric
                } else if looks_like_date(text) {
                    ColumnKind::Date
                } else {
                    ColumnKind::Text
                }
            }
            _ => ColumnKind::Other,
        }
    }
}

fn looks_like_date(text: &str) -> bool {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text).is_ok()
        || DateTime::parse_from_rfc2822(text).is_ok()
        || NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProfile {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ColumnKind,
    pub is_aggregated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataShape {
    pub has_time_series: bool,
    pub has_aggregation: bool,
    pub has_multiple_series: bool,
    pub column_count: usize,
    pub row_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnalysis {
    pub recommended_chart_types: Vec<ChartType>,
    pub data_shape: DataShape,
    pub columns: Vec<ColumnProfile>,
}

impl QueryAnalysis {
    pub fn from_result(query: &str, result: &ExecutionResult) -> Self {
        let first_row = result.rows.first();
        let columns: Vec<ColumnProfile> = result
            .columns
            .iter()
            .map(|name| ColumnProfile {
                name: name.clone(),
                kind: ColumnKind::of(first_row.and_then(|row| row.get(name))),
                is_aggregated: AGGREGATE_NAME.is_match(name),
            })
            .collect();

        let rows = result.rows.len();
        let numeric = columns
            .iter()
            .filter(|c| c.kind == ColumnKind::Numeric)
            .count();
        let has_time_series = columns.iter().any(|c| c.kind == ColumnKind::Date);
        let has_aggregation =
            columns.iter().any(|c| c.is_aggregated) || GROUP_BY.is_match(query);

        let mut recommended = Vec::new();
        if rows == 1 && numeric == 1 {
            recommended.push(ChartType::Kpi);
        }
        if has_time_series && numeric > 0 {
            recommended.extend([ChartType::Line, ChartType::Area]);
        }
        if has_aggregation && !has_time_series {
            recommended.extend([ChartType::Bar, ChartType::HorizontalBar]);
        }
        if numeric == 1 && rows <= SMALL_SERIES_ROWS {
            recommended.extend([ChartType::Bar, ChartType::HorizontalBar]);
        }
        if columns.len() >= 3 {
            recommended.push(ChartType::Table);
        }
        if numeric == 1 && rows == 1 {
            recommended.push(ChartType::Gauge);
        }
        if recommended.is_empty() {
            recommended.push(ChartType::Table);
        }

        let mut seen = Vec::with_capacity(recommended.len());
        recommended.retain(|chart| {
            if seen.contains(chart) {
                false
            } else {
                seen.push(*chart);
                true
            }
        });

        Self {
            recommended_chart_types: recommended,
            data_shape: DataShape {
                has_time_series,
                has_aggregation,
                has_multiple_series: numeric > 1,
                column_count: columns.len(),
                row_count: rows,
            },
            columns,
        }
    }
}
