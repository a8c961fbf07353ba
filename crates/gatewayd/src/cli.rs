//! Command-line interface for the gateway daemon.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments. Anything given here overrides the configuration
/// file.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "WebSocket gateway for a line-oriented chat backend", long_about = None)]
pub struct CliArgs {
    /// Configuration file path
    ///
    /// Created with default settings if it does not exist.
    #[arg(short, long, default_value = "gateway.toml")]
    pub config: PathBuf,

    /// Client listen address (e.g. 0.0.0.0:3001)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Backend session transport address (e.g. 127.0.0.1:8080)
    #[arg(long)]
    pub backend: Option<String>,

    /// Account table path
    #[arg(short, long)]
    pub accounts: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Output logs in JSON format
    #[arg(long)]
    pub json_logs: bool,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            config: PathBuf::from("gateway.toml"),
            bind: None,
            backend: None,
            accounts: None,
            log_level: None,
            json_logs: false,
        }
    }
}
