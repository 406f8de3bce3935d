// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Presentation Layer
//!
//! - [`api`] - axum router, request DTOs and shared [`api::AppState`]
//! - [`error`] - `ServiceError` to HTTP status and `{error, message}` body

pub mod api;
pub mod error;
