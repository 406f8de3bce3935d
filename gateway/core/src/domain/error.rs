// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Service Errors
//!
//! Single error taxonomy shared by every application service. The
//! presentation layer maps each variant onto an HTTP status; see
//! `presentation::error`.

use thiserror::Error;

use crate::domain::repository::RepositoryError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Widget not found: {0}")]
    WidgetNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Unsupported database type: {0}")]
    UnsupportedEngine(String),

    /// A parameter value could not be bound, e.g. a type mismatch.
    #[error("Parameter binding failed: {0}")]
    Binding(String),

    /// Stored credentials could not be decrypted (wrong key or tampered blob).
    #[error("Credential decryption failed: {0}")]
    Decryption(String),

    /// Failure reported by the customer database or its driver.
    #[error("{0}")]
    Execution(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ServiceError {
    /// Stable machine-readable kind used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::ConnectionNotFound(_) => "ConnectionNotFound",
            ServiceError::WidgetNotFound(_) => "WidgetNotFound",
            ServiceError::FileNotFound(_) => "FileNotFound",
            ServiceError::Validation(_) => "ValidationError",
            ServiceError::UnsupportedEngine(_) => "UnsupportedEngine",
            ServiceError::Binding(_) => "BindingError",
            ServiceError::Decryption(_) => "DecryptionError",
            ServiceError::Execution(_) => "ExecutionError",
            ServiceError::Repository(_) => "RepositoryError",
            ServiceError::Storage(_) => "StorageError",
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => ServiceError::Execution(db.message().to_string()),
            _ => ServiceError::Execution(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_stable() {
        assert_eq!(
            ServiceError::ConnectionNotFound("x".into()).kind(),
            "ConnectionNotFound"
        );
        assert_eq!(ServiceError::Binding("p".into()).kind(), "BindingError");
        assert_eq!(
            ServiceError::from(RepositoryError::Database("down".into())).kind(),
            "RepositoryError"
        );
    }

    #[test]
    fn test_execution_error_keeps_driver_message() {
        let err = ServiceError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, ServiceError::Execution(_)));
        assert!(err.to_string().contains("timed out"));
    }
}
