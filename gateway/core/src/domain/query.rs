// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Query Value Objects
//!
//! Result shapes produced by the query executor. Customer SQL is arbitrary,
//! so rows are dynamic: a [`Row`] is an ordered list of `(column, SqlValue)`
//! pairs and every result carries its authoritative column list next to the
//! rows instead of relying on map iteration order.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Tagged cell value decoded from a customer database.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// RFC 3339 (or ISO date/time) text.
    Timestamp(String),
    Json(serde_json::Value),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, SqlValue::Int(_) | SqlValue::Float(_))
    }
}

/// One result row, column order preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(Vec<(String, SqlValue)>);

impl Row {
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Adds a column. A repeated column name overwrites the earlier value in
    /// place, matching how row objects behave on the wire.
    pub fn push(&mut self, column: impl Into<String>, value: SqlValue) {
        let column = column.into();
        if let Some(slot) = self.0.iter_mut().find(|(name, _)| *name == column) {
            slot.1 = value;
        } else {
            self.0.push((column, value));
        }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.0
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, SqlValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        let mut row = Row::default();
        for (column, value) in iter {
            row.push(column, value);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (column, value) in &self.0 {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Result of a bound (widget or test) execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub fields: Vec<String>,
    pub row_count: u64,
}

/// Result of a literal (administrative) execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Rows returned, or rows affected for statements that return none.
    pub row_count: u64,
    pub execution_time_ms: u64,
}

/// A statement of a batch that failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementFailure {
    /// First 100 characters of the statement followed by `...`.
    pub query: String,
    pub error: String,
}

impl StatementFailure {
    pub const PREFIX_CHARS: usize = 100;

    pub fn new(statement: &str, error: impl Into<String>) -> Self {
        let prefix: String = statement.chars().take(Self::PREFIX_CHARS).collect();
        Self {
            query: format!("{}...", prefix),
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub results: Vec<ExecutionResult>,
    pub total_queries: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub errors: Vec<StatementFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Alter,
    Drop,
    Other,
}

impl StatementKind {
    /// Classifies a statement by its leading keyword, case-insensitively.
    pub fn detect(statement: &str) -> Self {
        let upper = statement.trim_start().to_ascii_uppercase();
        [
            ("SELECT", StatementKind::Select),
            ("INSERT", StatementKind::Insert),
            ("UPDATE", StatementKind::Update),
            ("DELETE", StatementKind::Delete),
            ("CREATE", StatementKind::Create),
            ("ALTER", StatementKind::Alter),
            ("DROP", StatementKind::Drop),
        ]
        .into_iter()
        .find(|(keyword, _)| upper.starts_with(keyword))
        .map(|(_, kind)| kind)
        .unwrap_or(StatementKind::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
            StatementKind::Create => "CREATE",
            StatementKind::Alter => "ALTER",
            StatementKind::Drop => "DROP",
            StatementKind::Other => "OTHER",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedStatement {
    pub query: String,
    #[serde(rename = "type")]
    pub kind: StatementKind,
    pub tables: Vec<String>,
}

/// Outcome of a reachability probe. Probe failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionTestResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_serializes_in_column_order() {
        let mut row = Row::default();
        row.push("zeta", SqlValue::Int(1));
        row.push("alpha", SqlValue::Text("a".into()));
        row.push("mid", SqlValue::Null);

        let text = serde_json::to_string(&row).unwrap();
        assert_eq!(text, r#"{"zeta":1,"alpha":"a","mid":null}"#);
    }

    #[test]
    fn test_duplicate_column_keeps_first_position() {
        let row: Row = vec![
            ("id".to_string(), SqlValue::Int(1)),
            ("name".to_string(), SqlValue::Text("x".into())),
            ("id".to_string(), SqlValue::Int(2)),
        ]
        .into_iter()
        .collect();

        assert_eq!(row.len(), 2);
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["id", "name"]);
        assert_eq!(row.get("id"), Some(&SqlValue::Int(2)));
    }

    #[test]
    fn test_sql_value_natural_json() {
        assert_eq!(serde_json::to_value(SqlValue::Null).unwrap(), json!(null));
        assert_eq!(serde_json::to_value(SqlValue::Bool(true)).unwrap(), json!(true));
        assert_eq!(serde_json::to_value(SqlValue::Float(1.5)).unwrap(), json!(1.5));
        assert_eq!(
            serde_json::to_value(SqlValue::Timestamp("2026-01-02T03:04:05Z".into())).unwrap(),
            json!("2026-01-02T03:04:05Z")
        );
        assert_eq!(
            serde_json::to_value(SqlValue::Json(json!({"a": [1]}))).unwrap(),
            json!({"a": [1]})
        );
    }

    #[test]
    fn test_statement_kind_detection() {
        assert_eq!(StatementKind::detect("  select 1"), StatementKind::Select);
        assert_eq!(StatementKind::detect("Insert into t values (1)"), StatementKind::Insert);
        assert_eq!(StatementKind::detect("DROP TABLE t"), StatementKind::Drop);
        assert_eq!(StatementKind::detect("WITH x AS (SELECT 1) SELECT * FROM x"), StatementKind::Other);
        assert_eq!(StatementKind::detect("TRUNCATE t"), StatementKind::Other);
    }

    #[test]
    fn test_failure_prefix_truncation() {
        let long = "x".repeat(250);
        let failure = StatementFailure::new(&long, "boom");
        assert_eq!(failure.query.len(), 103);
        assert!(failure.query.ends_with("..."));

        let short = StatementFailure::new("SELEC 1", "syntax error");
        assert_eq!(short.query, "SELEC 1...");
    }

    #[test]
    fn test_result_wire_names() {
        let result = ExecutionResult {
            columns: vec!["n".into()],
            rows: vec![],
            row_count: 0,
            execution_time_ms: 3,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["rowCount"], json!(0));
        assert_eq!(value["executionTimeMs"], json!(3));

        let probe = serde_json::to_value(ConnectionTestResult::ok()).unwrap();
        assert_eq!(probe, json!({"success": true}));
    }
}
