// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `dashforge parse <FILE>`: offline statement split of a local script.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use dashforge_core::application::query_executor::QueryExecutor;
use dashforge_core::domain::query::ParsedStatement;

pub async fn execute(file: &Path, json: bool) -> Result<()> {
    let statements = parse_file(file).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&statements)?);
        return Ok(());
    }

    println!(
        "{} {}",
        file.display().to_string().bold(),
        format!("({} statements)", statements.len()).dimmed()
    );
    for (index, statement) in statements.iter().enumerate() {
        let tables = if statement.tables.is_empty() {
            "-".to_string()
        } else {
            statement.tables.join(", ")
        };
        println!(
            "  {:>3}. {:<8} {}",
            index + 1,
            statement.kind.as_str().cyan(),
            tables
        );
    }
    Ok(())
}

pub async fn parse_file(file: &Path) -> Result<Vec<ParsedStatement>> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    Ok(QueryExecutor::parse_sql_file(&content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashforge_core::domain::query::StatementKind;

    #[tokio::test]
    async fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.sql");
        std::fs::write(
            &path,
            "-- seed\nINSERT INTO sites (name) VALUES ('north');\nSELECT * FROM sites s JOIN lines l ON l.site = s.id;",
        )
        .unwrap();

        let statements = parse_file(&path).await.unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].kind, StatementKind::Insert);
        assert_eq!(statements[1].tables, vec!["sites".to_string(), "lines".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = parse_file(Path::new("/nonexistent/seed.sql")).await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to read"));
    }
}
