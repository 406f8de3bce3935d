// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Dashforge Core
//!
//! Ad-hoc multi-tenant SQL execution for the Dashforge dashboard builder.
//!
//! A widget (or the builder's "Test Query" action) hands over a connection
//! reference plus a parameterized SQL template. This crate resolves the
//! connection, decrypts its credentials, borrows a bounded pool for the
//! customer database, binds the caller's values positionally and returns a
//! normalized tabular result.
//!
//! # Architecture
//!
//! - **domain** - value types, repository contracts, the error taxonomy, configuration
//! - **application** - registry, executor, widget facade, schema inspector, analyzer
//! - **infrastructure** - vault, pool manager, SQL binder/splitter, repositories, file store
//! - **presentation** - axum router and JSON error mapping

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
