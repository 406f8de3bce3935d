// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Dashforge CLI
//!
//! The `dashforge` binary hosts the SQL gateway HTTP server and a few
//! offline helpers.
//!
//! ## Commands
//!
//! - `dashforge serve` - Run the HTTP server until SIGINT/SIGTERM
//! - `dashforge keygen` - Print a fresh credential vault key
//! - `dashforge parse <FILE>` - Split a local SQL script into statements
//! - `dashforge config show|validate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use dashforge::commands::{self, ConfigCommand};
use dashforge::daemon;
use dashforge_core::domain::config::{LoggingConfig, ServerConfig, CONFIG_PATH_ENV};

/// Dashforge SQL gateway
#[derive(Parser)]
#[command(name = "dashforge")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = CONFIG_PATH_ENV, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Listen port (overrides network.port)
        #[arg(long)]
        port: Option<u16>,

        /// Bind address (overrides network.bind_address)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Generate a 256-bit credential vault key
    Keygen,

    /// Split a SQL script into statements without executing it
    Parse {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print the statements as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let loaded = ServerConfig::load_or_default(cli.config.clone());
    let logging = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    init_logging(cli.log_level.as_deref().unwrap_or(&logging.level), &logging)?;

    match cli.command {
        Commands::Serve { port, bind } => {
            let mut config = loaded.context("Failed to load configuration")?;
            if let Some(port) = port {
                config.network.port = port;
            }
            if let Some(bind) = bind {
                config.network.bind_address = bind;
            }
            daemon::start_server(config).await
        }
        Commands::Keygen => commands::keygen::execute(),
        Commands::Parse { file, json } => commands::parse::execute(&file, json).await,
        Commands::Config { command } => commands::config::handle_command(command, cli.config).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
