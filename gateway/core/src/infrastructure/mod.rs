// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure Layer
//!
//! Adapters for everything outside the process: customer databases, the
//! application database, the upload directory and the key material.
//!
//! - [`vault`] - AES-256-GCM credential encryption
//! - [`pool_manager`] - per-connection customer pools
//! - [`sql`] - placeholder binding, script splitting, value conversion
//! - [`repositories`] - in-memory and PostgreSQL persistence
//! - [`db`] - application database pool and schema
//! - [`file_store`] - uploaded script access

pub mod db;
pub mod file_store;
pub mod pool_manager;
pub mod repositories;
pub mod sql;
pub mod vault;
