// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Statement Splitter
//!
//! Best-effort lexical splitting of SQL scripts: strip `--` and `/* */`
//! comments, split on `;`, trim, drop empty fragments.
//!
//! This is not a SQL parser. Semicolons inside string literals or
//! dollar-quoted bodies split the statement, and comment markers inside
//! literals are stripped. Batch execution depends on these exact split
//! points, so do not change them without migrating stored scripts.

use regex::Regex;
use std::sync::LazyLock;

use crate::domain::query::{ParsedStatement, StatementKind};

static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)--.*$").expect("static regex"));
static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("static regex"));

static FROM_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bFROM\s+([a-zA-Z0-9_"'.]+)"#).expect("static regex"));
static JOIN_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bJOIN\s+([a-zA-Z0-9_"'.]+)"#).expect("static regex"));
static INTO_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bINTO\s+([a-zA-Z0-9_"'.]+)"#).expect("static regex"));
static UPDATE_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bUPDATE\s+([a-zA-Z0-9_"'.]+)"#).expect("static regex"));

/// Splits a script into classified statements.
pub fn parse_sql(content: &str) -> Vec<ParsedStatement> {
    let without_lines = LINE_COMMENT.replace_all(content, "");
    let cleaned = BLOCK_COMMENT.replace_all(&without_lines, "");

    cleaned
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|query| ParsedStatement {
            query: query.to_string(),
            kind: StatementKind::detect(query),
            tables: extract_tables(query),
        })
        .collect()
}

/// Table names after the first `FROM`, every `JOIN`, the first `INTO` and
/// the first `UPDATE`. Quotes stripped, first occurrence kept.
pub fn extract_tables(query: &str) -> Vec<String> {
    let mut found: Vec<&str> = Vec::new();

    if let Some(caps) = FROM_TABLE.captures(query) {
        found.push(caps.get(1).map_or("", |m| m.as_str()));
    }
    for caps in JOIN_TABLE.captures_iter(query) {
        found.push(caps.get(1).map_or("", |m| m.as_str()));
    }
    if let Some(caps) = INTO_TABLE.captures(query) {
        found.push(caps.get(1).map_or("", |m| m.as_str()));
    }
    if let Some(caps) = UPDATE_TABLE.captures(query) {
        found.push(caps.get(1).map_or("", |m| m.as_str()));
    }

    let mut tables: Vec<String> = Vec::with_capacity(found.len());
    for raw in found {
        let name = raw.replace(['"', '\''], "").trim().to_string();
        if !name.is_empty() && !tables.contains(&name) {
            tables.push(name);
        }
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_and_classifies() {
        let script = r#"
-- seed data
CREATE TABLE lines (id serial primary key, name text);
INSERT INTO lines (name) VALUES ('L1');
/* multi
   line */
select * from lines;
;;
"#;
        let statements = parse_sql(script);
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[0].kind, StatementKind::Create);
        assert_eq!(statements[1].kind, StatementKind::Insert);
        assert_eq!(statements[1].tables, vec!["lines".to_string()]);
        assert_eq!(statements[2].kind, StatementKind::Select);
        assert_eq!(statements[2].query, "select * from lines");
    }

    #[test]
    fn test_comment_only_script_is_empty() {
        assert!(parse_sql("-- nothing here\n/* still nothing */\n").is_empty());
    }

    #[test]
    fn test_naive_split_inside_literals() {
        let statements = parse_sql("INSERT INTO notes VALUES ('a;b')");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].query, "INSERT INTO notes VALUES ('a");
        assert_eq!(statements[1].query, "b')");
    }

    #[test]
    fn test_table_extraction() {
        let tables = extract_tables(
            r#"SELECT o.id FROM "public"."orders" o JOIN customers c ON c.id = o.cid LEFT JOIN public.sites s ON true"#,
        );
        assert_eq!(tables, vec!["public.orders", "customers", "public.sites"]);

        let tables = extract_tables("UPDATE stock SET qty = 0 WHERE sku IN (SELECT sku FROM stock)");
        assert_eq!(tables, vec!["stock"]);

        assert!(extract_tables("SELECT valid_from, 1").is_empty());
    }
}
