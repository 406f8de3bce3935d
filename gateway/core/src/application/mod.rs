// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Application Layer
//!
//! Services composed from the domain and infrastructure layers. Each is
//! constructed once at startup and shared behind `Arc` by the HTTP layer.
//!
//! - [`connection_registry`] - saved connection CRUD, credential decryption, probes
//! - [`query_executor`] - literal, bound, capped and batch execution
//! - [`widget_execution`] - widget runs with filter overrides, builder test queries
//! - [`schema_inspector`] - catalog browsing over dedicated sessions
//! - [`query_analyzer`] - result profiling and chart recommendations
//! - [`sql_file_runner`] - uploaded script execution and parsing

pub mod connection_registry;
pub mod query_analyzer;
pub mod query_executor;
pub mod schema_inspector;
pub mod sql_file_runner;
pub mod widget_execution;
