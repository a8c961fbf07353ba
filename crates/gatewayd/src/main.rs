//! Gateway daemon entry point.
//!
//! Loads configuration, initialises logging, starts the gateway and runs it
//! until a termination signal arrives.

mod cli;
mod config;
mod logging;
mod signals;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use chat_gateway::GatewayServer;
use cli::CliArgs;
use config::AppConfig;

/// How long the accept loop gets to wind down after a shutdown request.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

pub struct Application {
    config: AppConfig,
    server: Arc<GatewayServer>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let server = GatewayServer::new(config.to_gateway_config()?)
            .await
            .context("Failed to create gateway")?;

        Ok(Self {
            config,
            server: Arc::new(server),
        })
    }

    pub async fn run(self) -> Result<()> {
        info!("📋 Configuration Summary:");
        info!("  🌐 Client address: {}", self.config.gateway.bind_address);
        info!("  🔀 Backend address: {}", self.config.backend.address);
        info!("  👤 Accounts: {}", self.config.storage.accounts_path.display());
        info!("  👥 Max connections: {}", self.config.gateway.max_connections);

        let mut server_handle = {
            let server = self.server.clone();
            tokio::spawn(async move { server.start().await })
        };

        tokio::select! {
            finished = &mut server_handle => {
                // The accept loop only returns on its own when it failed.
                return match finished {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(anyhow!(e).context("Gateway stopped unexpectedly")),
                    Err(e) => Err(anyhow!(e).context("Gateway task panicked")),
                };
            }
            signal = signals::wait_for_shutdown() => {
                let signal = signal?;
                info!("📡 Received {}, initiating graceful shutdown...", signal);
            }
        }

        self.server.shutdown();

        match tokio::time::timeout(SHUTDOWN_GRACE, server_handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!("Gateway reported an error while stopping: {}", e),
            Ok(Err(e)) => warn!("Gateway task ended abnormally: {}", e),
            Err(_) => warn!("Gateway did not stop within {:?}", SHUTDOWN_GRACE),
        }

        info!(
            "✅ Gateway shutdown complete ({} connection(s) still draining)",
            self.server.connection_count()
        );
        Ok(())
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = CliArgs::parse();

    // Configuration is loaded before logging exists, so failures here go to stderr.
    let config = match AppConfig::resolve(&args).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {e:?}");
            std::process::exit(1);
        }
    };
    if let Err(e) = logging::setup_logging(&config.logging) {
        eprintln!("❌ {e:?}");
        std::process::exit(1);
    }
    info!(
        "🔧 Logging initialized with level: {} | Config: {}",
        config.logging.level,
        args.config.display()
    );

    let app = match Application::new(config).await {
        Ok(app) => app,
        Err(e) => {
            error!("❌ Failed to start gateway: {:?}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.run().await {
        error!("❌ Gateway error: {:?}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn application_opens_account_store() {
        let dir = TempDir::new().unwrap();
        let args = CliArgs {
            config: dir.path().join("gateway.toml"),
            bind: Some("127.0.0.1:0".to_string()),
            accounts: Some(dir.path().join("users.json")),
            ..CliArgs::default()
        };

        let config = AppConfig::resolve(&args).await.unwrap();
        let app = Application::new(config).await.unwrap();
        assert!(dir.path().join("gateway.toml").exists());
        assert_eq!(app.config.gateway.bind_address, "127.0.0.1:0");
        assert!(app.server.accounts().is_empty().await);
    }

    #[tokio::test]
    async fn corrupt_account_table_fails_startup() {
        let dir = TempDir::new().unwrap();
        let accounts = dir.path().join("users.json");
        std::fs::write(&accounts, "{ not json").unwrap();

        let mut config = AppConfig::default();
        config.storage.accounts_path = accounts;
        assert!(Application::new(config).await.is_err());
    }
}
