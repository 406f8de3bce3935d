// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Connection Aggregate
//!
//! A saved reference to a customer-owned database. Credentials only ever live
//! on this type in encrypted form (`user_enc`, `pass_enc`, `options_enc`);
//! plaintext appears exclusively on [`DecryptedConnection`] and
//! [`CustomerDbConfig`], which never cross the HTTP boundary and redact their
//! secrets in `Debug` output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Owning factory of a connection. Factories themselves are managed elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactoryId(pub Uuid);

impl FactoryId {
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl fmt::Display for FactoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Database engine of a customer connection.
///
/// Only `postgres` is functional. The other engines are accepted by the
/// parser so that stored rows round-trip, but every operation that would
/// touch the network rejects them with [`ServiceError::UnsupportedEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    Postgres,
    Mysql,
    Mssql,
}

impl DbType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::Postgres => "postgres",
            DbType::Mysql => "mysql",
            DbType::Mssql => "mssql",
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, DbType::Postgres)
    }

    /// Fails with `UnsupportedEngine` for anything but PostgreSQL.
    pub fn ensure_supported(&self) -> Result<(), ServiceError> {
        if self.is_supported() {
            Ok(())
        } else {
            Err(ServiceError::UnsupportedEngine(self.as_str().to_string()))
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbType {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DbType::Postgres),
            "mysql" => Ok(DbType::Mysql),
            "mssql" => Ok(DbType::Mssql),
            other => Err(ServiceError::UnsupportedEngine(other.to_string())),
        }
    }
}

/// Persisted connection row, secrets encrypted.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub id: ConnectionId,
    pub factory_id: FactoryId,
    pub name: String,
    pub db_type: DbType,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user_enc: String,
    pub pass_enc: String,
    pub options_enc: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    /// Non-secret projection returned to API callers.
    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            id: self.id,
            factory_id: self.factory_id,
            name: self.name.clone(),
            db_type: self.db_type,
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub id: ConnectionId,
    pub factory_id: FactoryId,
    pub name: String,
    pub db_type: DbType,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Plaintext input for creating a connection.
#[derive(Clone)]
pub struct NewConnection {
    pub factory_id: FactoryId,
    pub name: String,
    pub db_type: DbType,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub options: Option<serde_json::Value>,
}

impl fmt::Debug for NewConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewConnection")
            .field("factory_id", &self.factory_id)
            .field("name", &self.name)
            .field("db_type", &self.db_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

/// Plaintext partial update. `None` leaves the stored column untouched.
#[derive(Clone, Default)]
pub struct ConnectionPatch {
    pub name: Option<String>,
    pub db_type: Option<DbType>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub options: Option<serde_json::Value>,
}

impl ConnectionPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.db_type.is_none()
            && self.host.is_none()
            && self.port.is_none()
            && self.database.is_none()
            && self.username.is_none()
            && self.password.is_none()
            && self.options.is_none()
    }

    /// Whether applying this patch makes a cached pool for the connection stale.
    pub fn invalidates_pool(&self) -> bool {
        self.host.is_some()
            || self.port.is_some()
            || self.username.is_some()
            || self.password.is_some()
    }
}

impl fmt::Debug for ConnectionPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPatch")
            .field("name", &self.name)
            .field("db_type", &self.db_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("options", &self.options.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Column-level update handed to the repository, secrets already encrypted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionUpdate {
    pub name: Option<String>,
    pub db_type: Option<DbType>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user_enc: Option<String>,
    pub pass_enc: Option<String>,
    pub options_enc: Option<String>,
}

impl ConnectionUpdate {
    pub fn is_empty(&self) -> bool {
        *self == ConnectionUpdate::default()
    }

    /// Applies the update to an in-memory row, bumping `updated_at`.
    pub fn apply_to(&self, connection: &mut Connection) {
        if let Some(name) = &self.name {
            connection.name = name.clone();
        }
        if let Some(db_type) = self.db_type {
            connection.db_type = db_type;
        }
        if let Some(host) = &self.host {
            connection.host = host.clone();
        }
        if let Some(port) = self.port {
            connection.port = port;
        }
        if let Some(database) = &self.database {
            connection.database = database.clone();
        }
        if let Some(user_enc) = &self.user_enc {
            connection.user_enc = user_enc.clone();
        }
        if let Some(pass_enc) = &self.pass_enc {
            connection.pass_enc = pass_enc.clone();
        }
        if let Some(options_enc) = &self.options_enc {
            connection.options_enc = Some(options_enc.clone());
        }
        connection.updated_at = Utc::now();
    }
}

/// Connection with secrets in plaintext. Internal callers only.
#[derive(Clone)]
pub struct DecryptedConnection {
    pub id: ConnectionId,
    pub db_type: DbType,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub options: Option<serde_json::Value>,
}

impl DecryptedConnection {
    pub fn db_config(&self) -> CustomerDbConfig {
        CustomerDbConfig {
            db_type: self.db_type,
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            options: self.options.clone(),
        }
    }
}

impl fmt::Debug for DecryptedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptedConnection")
            .field("id", &self.id)
            .field("db_type", &self.db_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

/// Everything needed to open sessions against one customer database.
#[derive(Clone, PartialEq)]
pub struct CustomerDbConfig {
    pub db_type: DbType,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub options: Option<serde_json::Value>,
}

impl CustomerDbConfig {
    /// `sslmode` requested through the connection's options JSON, if any.
    pub fn ssl_mode(&self) -> Option<&str> {
        self.options
            .as_ref()
            .and_then(|o| o.get("sslmode").or_else(|| o.get("sslMode")))
            .and_then(|v| v.as_str())
    }
}

impl fmt::Debug for CustomerDbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomerDbConfig")
            .field("db_type", &self.db_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}
