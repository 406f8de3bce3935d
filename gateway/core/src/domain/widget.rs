// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Widget Input Record
//!
//! Widgets are owned by the dashboard builder; this crate only reads them to
//! run their query. A widget carries a SQL template with `:named`
//! placeholders, the default values for those placeholders, and the
//! connection the template runs against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::connection::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetId(pub Uuid);

impl WidgetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for WidgetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Visualisation kind of a widget. Also used for chart recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WidgetType {
    Kpi,
    Line,
    Area,
    Bar,
    HorizontalBar,
    Table,
    Gauge,
    Heatmap,
}

impl WidgetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetType::Kpi => "KPI",
            WidgetType::Line => "LINE",
            WidgetType::Area => "AREA",
            WidgetType::Bar => "BAR",
            WidgetType::HorizontalBar => "HORIZONTAL_BAR",
            WidgetType::Table => "TABLE",
            WidgetType::Gauge => "GAUGE",
            WidgetType::Heatmap => "HEATMAP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "KPI" => Some(WidgetType::Kpi),
            "LINE" => Some(WidgetType::Line),
            "AREA" => Some(WidgetType::Area),
            "BAR" => Some(WidgetType::Bar),
            "HORIZONTAL_BAR" => Some(WidgetType::HorizontalBar),
            "TABLE" => Some(WidgetType::Table),
            "GAUGE" => Some(WidgetType::Gauge),
            "HEATMAP" => Some(WidgetType::Heatmap),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    pub id: WidgetId,
    pub dashboard_id: Uuid,
    #[serde(rename = "type")]
    pub widget_type: WidgetType,
    pub title: String,
    pub description: Option<String>,
    pub connection_id: ConnectionId,
    pub query: String,
    /// Default parameter values, overridden key-by-key by caller filters.
    pub params: serde_json::Map<String, serde_json::Value>,
    pub refresh_interval: Option<i32>,
    pub viz_options: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Widget {
    pub fn new(
        dashboard_id: Uuid,
        widget_type: WidgetType,
        title: impl Into<String>,
        connection_id: ConnectionId,
        query: impl Into<String>,
        params: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: WidgetId::new(),
            dashboard_id,
            widget_type,
            title: title.into(),
            description: None,
            connection_id,
            query: query.into(),
            params,
            refresh_interval: None,
            viz_options: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Widget defaults overlaid with `filters`; filter values win on equal keys.
    pub fn merged_params(
        &self,
        filters: &serde_json::Map<String, serde_json::Value>,
    ) -> serde_json::Map<String, serde_json::Value> {
        let mut merged = self.params.clone();
        for (key, value) in filters {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn widget_with(params: serde_json::Value) -> Widget {
        Widget::new(
            Uuid::new_v4(),
            WidgetType::Kpi,
            "OEE",
            ConnectionId::new(),
            "SELECT avg(oee) FROM shifts WHERE site = :site",
            params.as_object().cloned().unwrap_or_default(),
        )
    }

    #[test]
    fn test_filters_override_defaults() {
        let widget = widget_with(json!({"site": "a", "range": "7d"}));
        let filters = json!({"site": "b"}).as_object().cloned().unwrap();

        let merged = widget.merged_params(&filters);
        assert_eq!(merged["site"], json!("b"));
        assert_eq!(merged["range"], json!("7d"));
    }

    #[test]
    fn test_empty_filters_keep_defaults() {
        let widget = widget_with(json!({"site": "a"}));
        let merged = widget.merged_params(&serde_json::Map::new());
        assert_eq!(merged, widget.params);
    }

    #[test]
    fn test_widget_type_wire_names() {
        assert_eq!(
            serde_json::to_value(WidgetType::HorizontalBar).unwrap(),
            json!("HORIZONTAL_BAR")
        );
        assert_eq!(WidgetType::parse("KPI"), Some(WidgetType::Kpi));
        assert_eq!(WidgetType::parse("PIE"), None);
    }
}
