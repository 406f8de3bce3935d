// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod analysis;
pub mod config;
pub mod connection;
pub mod error;
pub mod query;
pub mod repository;
pub mod schema;
pub mod sql_file;
pub mod widget;
