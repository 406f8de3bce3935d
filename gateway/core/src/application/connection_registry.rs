// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Connection Registry
//!
//! CRUD over saved customer connections. Secrets go through the
//! [`CredentialVault`] on the way in and only come back out through
//! [`ConnectionRegistry::get_decrypted`], which internal callers use to open
//! sessions.
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Own the lifecycle of saved connections and keep the pool cache consistent with it
//! - **Integration:** HTTP API → ConnectionRegistry → ConnectionRepository / CredentialVault / PoolManager

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::connection::{
    Connection, ConnectionId, ConnectionPatch, ConnectionUpdate, CustomerDbConfig,
    DecryptedConnection, FactoryId, NewConnection,
};
use crate::domain::error::ServiceError;
use crate::domain::query::ConnectionTestResult;
use crate::domain::repository::ConnectionRepository;
use crate::infrastructure::pool_manager::PoolManager;
use crate::infrastructure::vault::{CredentialVault, VaultError};

pub struct ConnectionRegistry {
    repository: Arc<dyn ConnectionRepository>,
    vault: Arc<CredentialVault>,
    pools: Arc<PoolManager>,
}

impl ConnectionRegistry {
    pub fn new(
        repository: Arc<dyn ConnectionRepository>,
        vault: Arc<CredentialVault>,
        pools: Arc<PoolManager>,
    ) -> Self {
        Self {
            repository,
            vault,
            pools,
        }
    }

    pub async fn create(&self, input: NewConnection) -> Result<Connection, ServiceError> {
        input.db_type.ensure_supported()?;
        require_non_empty(&[
            ("name", &input.name),
            ("host", &input.host),
            ("database", &input.database),
            ("username", &input.username),
        ])?;

        let now = Utc::now();
        let connection = Connection {
            id: ConnectionId::new(),
            factory_id: input.factory_id,
            name: input.name,
            db_type: input.db_type,
            host: input.host,
            port: input.port,
            database: input.database,
            user_enc: self.vault.encrypt(&input.username).map_err(encryption_error)?,
            pass_enc: self.vault.encrypt(&input.password).map_err(encryption_error)?,
            options_enc: input
                .options
                .as_ref()
                .map(|options| self.vault.encrypt_json(options))
                .transpose()
                .map_err(encryption_error)?,
            created_at: now,
            updated_at: now,
        };

        self.repository.insert(&connection).await?;
        info!(
            connection_id = %connection.id,
            factory_id = %connection.factory_id,
            host = %connection.host,
            database = %connection.database,
            "Connection created"
        );
        Ok(connection)
    }

    pub async fn get(&self, id: ConnectionId) -> Result<Connection, ServiceError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::ConnectionNotFound(id.to_string()))
    }

    /// Newest first; every factory when `factory_id` is `None`.
    pub async fn list(&self, factory_id: Option<FactoryId>) -> Result<Vec<Connection>, ServiceError> {
        Ok(self.repository.list(factory_id).await?)
    }

    /// Applies a partial update, re-encrypting changed secrets.
    ///
    /// A change to host, port, username or password evicts the cached pool
    /// before returning, so no later call reuses the old session settings.
    pub async fn update(&self, id: ConnectionId, patch: ConnectionPatch) -> Result<Connection, ServiceError> {
        if let Some(db_type) = patch.db_type {
            db_type.ensure_supported()?;
        }

        let update = ConnectionUpdate {
            name: patch.name.clone(),
            db_type: patch.db_type,
            host: patch.host.clone(),
            port: patch.port,
            database: patch.database.clone(),
            user_enc: patch
                .username
                .as_deref()
                .map(|u| self.vault.encrypt(u))
                .transpose()
                .map_err(encryption_error)?,
            pass_enc: patch
                .password
                .as_deref()
                .map(|p| self.vault.encrypt(p))
                .transpose()
                .map_err(encryption_error)?,
            options_enc: patch
                .options
                .as_ref()
                .map(|o| self.vault.encrypt_json(o))
                .transpose()
                .map_err(encryption_error)?,
        };

        let updated = self
            .repository
            .update(id, &update)
            .await?
            .ok_or_else(|| ServiceError::ConnectionNotFound(id.to_string()))?;

        if patch.invalidates_pool() {
            self.pools.evict(id).await;
        }
        info!(connection_id = %id, "Connection updated");
        Ok(updated)
    }

    /// Evicts the pool, then removes the row. Returns whether a row existed.
    pub async fn delete(&self, id: ConnectionId) -> Result<bool, ServiceError> {
        self.pools.evict(id).await;
        let removed = self.repository.delete(id).await?;
        if removed {
            info!(connection_id = %id, "Connection deleted");
        }
        Ok(removed)
    }

    /// Plaintext credentials for internal callers. Never serialised.
    pub async fn get_decrypted(&self, id: ConnectionId) -> Result<DecryptedConnection, ServiceError> {
        let connection = self.get(id).await?;

        let username = self.vault.decrypt(&connection.user_enc).map_err(decryption_error)?;
        let password = self.vault.decrypt(&connection.pass_enc).map_err(decryption_error)?;
        let options = connection
            .options_enc
            .as_deref()
            .map(|blob| self.vault.decrypt_json::<serde_json::Value>(blob))
            .transpose()
            .map_err(decryption_error)?;

        Ok(DecryptedConnection {
            id: connection.id,
            db_type: connection.db_type,
            host: connection.host,
            port: connection.port,
            database: connection.database,
            username,
            password,
            options,
        })
    }

    /// Probes a connection that has not been saved.
    pub async fn test_config(&self, config: &CustomerDbConfig) -> Result<ConnectionTestResult, ServiceError> {
        debug!(host = %config.host, port = config.port, "Testing unsaved connection");
        self.pools.test_once(config).await
    }

    /// Probes a saved connection. An unknown id is a failed probe, not an error.
    pub async fn test_saved(&self, id: ConnectionId) -> Result<ConnectionTestResult, ServiceError> {
        let decrypted = match self.get_decrypted(id).await {
            Ok(decrypted) => decrypted,
            Err(ServiceError::ConnectionNotFound(_)) => {
                return Ok(ConnectionTestResult::failed("Connection not found"));
            }
            Err(e) => return Err(e),
        };
        debug!(connection_id = %id, "Testing saved connection");
        self.pools.test_once(&decrypted.db_config()).await
    }
}

fn require_non_empty(fields: &[(&str, &String)]) -> Result<(), ServiceError> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}

fn encryption_error(err: VaultError) -> ServiceError {
    ServiceError::Storage(format!("Credential encryption failed: {}", err))
}

fn decryption_error(err: VaultError) -> ServiceError {
    ServiceError::Decryption(err.to_string())
}
