// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP mapping of [`ServiceError`].
//!
//! | Kind | Status |
//! |------|--------|
//! | `ValidationError`, `UnsupportedEngine`, `BindingError` | 400 |
//! | `ConnectionNotFound`, `WidgetNotFound`, `FileNotFound` | 404 |
//! | everything else | 500 |
//!
//! Body: `{"error": "<kind>", "message": "<detail>"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::domain::error::ServiceError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "ValidationError",
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::Validation(_) | ServiceError::UnsupportedEngine(_) | ServiceError::Binding(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::ConnectionNotFound(_)
            | ServiceError::WidgetNotFound(_)
            | ServiceError::FileNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(kind = err.kind(), error = %err, "Request failed");
        }

        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "error": self.kind,
                "message": self.message,
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::RepositoryError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ServiceError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::UnsupportedEngine("mysql".into()), StatusCode::BAD_REQUEST),
            (ServiceError::Binding("$1".into()), StatusCode::BAD_REQUEST),
            (ServiceError::ConnectionNotFound("c".into()), StatusCode::NOT_FOUND),
            (ServiceError::WidgetNotFound("w".into()), StatusCode::NOT_FOUND),
            (ServiceError::FileNotFound("f".into()), StatusCode::NOT_FOUND),
            (ServiceError::Execution("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (ServiceError::Decryption("tag".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ServiceError::Repository(RepositoryError::Database("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_kind_and_message_survive() {
        let api = ApiError::from(ServiceError::Execution("relation \"x\" does not exist".into()));
        assert_eq!(api.kind(), "ExecutionError");
        assert_eq!(api.message(), "relation \"x\" does not exist");
    }
}
