// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Parameter Binder
//!
//! Rewrites `:name` placeholders into PostgreSQL positional placeholders
//! (`$1`, `$2`, ...) and collects the matching values in the same order.
//!
//! - Every occurrence gets its own index and its own copy of the value, so
//!   `:x OR :x` becomes `$1 OR $2` with the value bound twice.
//! - A name absent from the parameter map is left untouched in the SQL text.
//!   The database then rejects the statement with its own error.
//! - Values are never written into the SQL text.

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::LazyLock;

static NAMED_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":([A-Za-z0-9_]+)").expect("static regex"));

/// SQL with positional placeholders and the values that fill them.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    pub sql: String,
    pub values: Vec<Value>,
}

impl BoundQuery {
    /// Statement with no parameters.
    pub fn literal(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            values: Vec::new(),
        }
    }

    /// Appends a hard row cap after the statement.
    ///
    /// The limit goes on its own line so a trailing `--` comment cannot
    /// swallow it; trailing semicolons are dropped first.
    pub fn with_row_limit(mut self, limit: u32) -> Self {
        let trimmed = self.sql.trim_end().trim_end_matches(';').trim_end();
        self.sql = format!("{}\nLIMIT {}", trimmed, limit);
        self
    }
}

pub fn bind(query: &str, params: &Map<String, Value>) -> BoundQuery {
    let mut values = Vec::new();
    let sql = NAMED_PARAM.replace_all(query, |caps: &Captures| match params.get(&caps[1]) {
        Some(value) => {
            values.push(value.clone());
            format!("${}", values.len())
        }
        None => caps[0].to_string(),
    });

    BoundQuery {
        sql: sql.into_owned(),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_binds_in_encounter_order() {
        let bound = bind(
            "SELECT * FROM t WHERE a = :x AND b = :y",
            &params(json!({"y": "foo", "x": 1})),
        );
        assert_eq!(bound.sql, "SELECT * FROM t WHERE a = $1 AND b = $2");
        assert_eq!(bound.values, vec![json!(1), json!("foo")]);
    }

    #[test]
    fn test_unmatched_placeholder_passes_through() {
        let bound = bind("SELECT :missing", &Map::new());
        assert_eq!(bound.sql, "SELECT :missing");
        assert!(bound.values.is_empty());
    }

    #[test]
    fn test_repeated_placeholder_expands() {
        let bound = bind("WHERE a = :x OR b = :x", &params(json!({"x": 5})));
        assert_eq!(bound.sql, "WHERE a = $1 OR b = $2");
        assert_eq!(bound.values, vec![json!(5), json!(5)]);
    }

    #[test]
    fn test_mixed_known_and_unknown() {
        let bound = bind(
            "SELECT * FROM t WHERE site = :site AND line = :line AND shift = :site",
            &params(json!({"site": "DET"})),
        );
        assert_eq!(
            bound.sql,
            "SELECT * FROM t WHERE site = $1 AND line = :line AND shift = $2"
        );
        assert_eq!(bound.values.len(), 2);
    }

    #[test]
    fn test_casts_follow_left_to_right_scan() {
        let bound = bind("SELECT :day::date", &params(json!({"day": "2026-01-01"})));
        assert_eq!(bound.sql, "SELECT $1::date");

        let bound = bind(
            "SELECT :day::date",
            &params(json!({"day": "2026-01-01", "date": "x"})),
        );
        assert_eq!(bound.sql, "SELECT $1:$2");
    }

    #[test]
    fn test_value_text_never_reaches_sql() {
        let bound = bind(
            "SELECT * FROM users WHERE name = :name",
            &params(json!({"name": "'; DROP TABLE users; --"})),
        );
        assert_eq!(bound.sql, "SELECT * FROM users WHERE name = $1");
        assert!(!bound.sql.contains("DROP"));
    }

    #[test]
    fn test_row_limit_appended_after_binding() {
        let bound = bind("SELECT * FROM big_table WHERE a = :a;  ", &params(json!({"a": 1})))
            .with_row_limit(100);
        assert_eq!(bound.sql, "SELECT * FROM big_table WHERE a = $1\nLIMIT 100");

        let commented = BoundQuery::literal("SELECT 1 -- trailing note").with_row_limit(100);
        assert_eq!(commented.sql, "SELECT 1 -- trailing note\nLIMIT 100");
    }
}
