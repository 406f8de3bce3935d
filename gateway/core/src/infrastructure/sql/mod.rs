// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! SQL text and value handling shared by the executor and the inspector.
//!
//! - [`binder`] - `:named` to `$n` placeholder rewriting
//! - [`splitter`] - best-effort script splitting and statement classification
//! - [`values`] - JSON parameter coercion and result cell decoding

pub mod binder;
pub mod splitter;
pub mod values;

pub use binder::{bind, BoundQuery};
pub use splitter::parse_sql;

/// Quotes an identifier for interpolation into SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
