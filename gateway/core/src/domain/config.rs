// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Server Configuration Types
//
// Defines the YAML configuration of a dashforge gateway process:
// - HTTP listener and CORS origins
// - Application database and storage backend
// - Credential vault key reference
// - Customer pool limits and ad-hoc query caps
// - Logging and metrics settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "DASHFORGE_CONFIG_PATH";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Hex-encoded 256-bit vault key (supports "env:VAR_NAME")
    #[serde(default = "default_encryption_key")]
    pub encryption_key: String,

    /// Limits applied to every customer database pool
    #[serde(default)]
    pub pools: PoolSettings,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Browser origins allowed by CORS
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Application database URL (supports "env:VAR_NAME")
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_app_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,

    /// Root directory of uploaded SQL files
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    #[serde(default = "default_pool_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Connect timeout of one-off reachability probes
    #[serde(default = "default_acquire_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl PoolSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Hard row cap appended to builder test queries
    #[serde(default = "default_test_row_limit")]
    pub test_row_limit: u32,

    /// Default row count of table previews
    #[serde(default = "default_test_row_limit")]
    pub preview_row_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Expose a Prometheus scrape endpoint
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_encryption_key() -> String {
    "env:ENCRYPTION_KEY".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
    ]
}

fn default_database_url() -> String {
    "env:DATABASE_URL".to_string()
}

fn default_app_max_connections() -> u32 {
    20
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Postgres
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_pool_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_ms() -> u64 {
    5000
}

fn default_idle_timeout_ms() -> u64 {
    30000
}

fn default_test_row_limit() -> u32 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_app_max_connections(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            upload_dir: default_upload_dir(),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: default_pool_max_connections(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            probe_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            test_row_limit: default_test_row_limit(),
            preview_row_limit: default_test_row_limit(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            encryption_key: default_encryption_key(),
            pools: PoolSettings::default(),
            query: QueryConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// Resolves `env:VAR_NAME` indirection; any other value is returned as is.
pub fn resolve_secret(value: &str) -> anyhow::Result<String> {
    match value.strip_prefix("env:") {
        Some(var_name) => std::env::var(var_name)
            .map_err(|_| anyhow::anyhow!("Environment variable not set: {}", var_name)),
        None => Ok(value.to_string()),
    }
}

impl ServerConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. DASHFORGE_CONFIG_PATH environment variable
    /// 2. ./dashforge.yaml (working directory)
    /// 3. ~/.dashforge/config.yaml (user home)
    /// 4. /etc/dashforge/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./dashforge.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".dashforge").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/dashforge/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path (fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(config_path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", config_path);
                Self::from_yaml_file(config_path)?
            }
            None => {
                tracing::warn!("No configuration file found in standard locations. Using defaults.");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Applies overrides from an arbitrary variable source.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DATABASE_URL") {
            tracing::info!("Environment override: DATABASE_URL");
            self.database.url = url;
        }

        if let Some(key) = lookup("ENCRYPTION_KEY") {
            self.encryption_key = key;
        }

        if let Some(addr) = lookup("DASHFORGE_BIND_ADDRESS") {
            tracing::info!("Environment override: DASHFORGE_BIND_ADDRESS={}", addr);
            self.network.bind_address = addr;
        }

        if let Some(val) = lookup("PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: PORT={}", port);
                    self.network.port = port;
                }
                Err(_) => {
                    tracing::warn!("Invalid value for PORT: '{}'. Ignoring.", val);
                }
            }
        }

        if let Some(level) = lookup("DASHFORGE_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(dir) = lookup("DASHFORGE_UPLOAD_DIR") {
            tracing::info!("Environment override: DASHFORGE_UPLOAD_DIR={}", dir);
            self.storage.upload_dir = PathBuf::from(dir);
        }

        if let Some(origin) = lookup("CORS_ORIGIN") {
            let origin = origin.trim().to_string();
            if !origin.is_empty() && !self.network.cors_origins.contains(&origin) {
                self.network.cors_origins.push(origin);
            }
        }
    }

    /// Vault key with `env:` indirection resolved.
    pub fn resolve_encryption_key(&self) -> anyhow::Result<String> {
        resolve_secret(&self.encryption_key)
    }

    /// Application database URL with `env:` indirection resolved.
    pub fn resolve_database_url(&self) -> anyhow::Result<String> {
        resolve_secret(&self.database.url)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.backend == StorageBackend::Postgres && self.database.url.trim().is_empty() {
            anyhow::bail!("database.url cannot be empty with the postgres storage backend");
        }

        if self.encryption_key.trim().is_empty() {
            anyhow::bail!("encryption_key cannot be empty");
        }

        if self.network.port == 0 {
            anyhow::bail!("network.port must be greater than 0");
        }

        if self.pools.max_connections == 0 {
            anyhow::bail!("pools.max_connections must be greater than 0");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be greater than 0");
        }

        if self.query.test_row_limit == 0 {
            anyhow::bail!("query.test_row_limit must be greater than 0");
        }

        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("Invalid logging.format: '{}'. Expected text or json", other),
        }

        Ok(())
    }
}
