//! Daemon configuration loaded from a TOML file.
//!
//! The file has one table per concern. Missing tables and keys fall back to
//! the defaults, and a missing file is created with every default written
//! out so operators have something to edit.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chat_gateway::GatewayConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cli::CliArgs;

/// Application configuration loaded from TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewaySettings,
    pub backend: BackendSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Client listen address
    pub bind_address: String,
    /// Connection limit
    pub max_connections: usize,
    /// Per-connection outbound queue capacity
    pub outbound_queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Backend session transport address
    pub address: String,
    /// Longest accepted backend line in bytes
    pub max_line_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Account table path
    pub accounts_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter
    pub level: String,
    /// JSON formatting
    pub json_format: bool,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        let defaults = GatewayConfig::default();
        Self {
            bind_address: defaults.bind_address.to_string(),
            max_connections: defaults.max_connections,
            outbound_queue_capacity: defaults.outbound_queue_capacity,
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        let defaults = GatewayConfig::default();
        Self {
            address: defaults.backend_address.to_string(),
            max_line_len: defaults.max_line_len,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            accounts_path: GatewayConfig::default().accounts_path,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl AppConfig {
    /// Loads the configuration, writing a default file first if `path` does
    /// not exist.
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Loads the file named by `args`, applies the command-line overrides
    /// and validates the result.
    pub async fn resolve(args: &CliArgs) -> Result<Self> {
        let mut config = Self::load_from_file(&args.config).await?;
        config.apply_overrides(args);
        config
            .validate()
            .map_err(|e| anyhow!("Configuration validation failed: {e}"))?;
        Ok(config)
    }

    /// Applies command-line overrides on top of the file settings.
    pub fn apply_overrides(&mut self, args: &CliArgs) {
        if let Some(bind) = &args.bind {
            self.gateway.bind_address = bind.clone();
        }
        if let Some(backend) = &args.backend {
            self.backend.address = backend.clone();
        }
        if let Some(accounts) = &args.accounts {
            self.storage.accounts_path = accounts.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.gateway.bind_address.parse::<SocketAddr>().is_err() {
            return Err(format!("Invalid bind address: {}", self.gateway.bind_address));
        }
        if self.backend.address.parse::<SocketAddr>().is_err() {
            return Err(format!("Invalid backend address: {}", self.backend.address));
        }
        if self.gateway.max_connections == 0 {
            return Err("max_connections must be at least 1".to_string());
        }
        if self.gateway.outbound_queue_capacity == 0 {
            return Err("outbound_queue_capacity must be at least 1".to_string());
        }
        if self.backend.max_line_len == 0 {
            return Err("max_line_len must be at least 1".to_string());
        }
        if self.storage.accounts_path.as_os_str().is_empty() {
            return Err("Account table path cannot be empty".to_string());
        }
        if !VALID_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level, VALID_LEVELS
            ));
        }
        Ok(())
    }

    pub fn to_gateway_config(&self) -> Result<GatewayConfig> {
        Ok(GatewayConfig {
            bind_address: self
                .gateway
                .bind_address
                .parse()
                .context("Invalid bind address")?,
            backend_address: self
                .backend
                .address
                .parse()
                .context("Invalid backend address")?,
            accounts_path: self.storage.accounts_path.clone(),
            max_connections: self.gateway.max_connections,
            outbound_queue_capacity: self.gateway.outbound_queue_capacity,
            max_line_len: self.backend.max_line_len,
        })
    }
}
