// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the OpenID Connect provider daemon

use anyhow::Result;
use clap::Parser;
use log::info;
use rust_oidc_provider::config::{self, Config};
use rust_oidc_provider::daemon;

use std::path::PathBuf;
use tokio::signal;

/// OpenID Connect 1.0 Provider built on OAuth 2.0
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Web server port (default: 8080)
    #[arg(short = 'p')]
    web_port: Option<u16>,

    /// Web server address (default: 127.0.0.1)
    #[arg(short = 'a', long)]
    web_address: Option<String>,

    /// Issuer identifier stamped into tokens
    #[arg(long)]
    issuer: Option<String>,

    /// Path of the file-backed store (switches the backend to file)
    #[arg(long)]
    storage_path: Option<String>,

    /// Start in server mode
    #[arg(long, default_value_t = true)]
    server: bool,

    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,
}

#[rocket::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    // Check if --show-config-schema flag is set
    if args.show_config_schema {
        return config::output_config_schema();
    }

    // Load configuration
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;

    // Apply command line overrides
    config.apply_args(
        args.web_port,
        args.web_address.clone(),
        args.issuer.clone(),
        args.storage_path.clone(),
        args.server,
    );

    if args.server {
        info!("Starting in daemon mode");
        let mut daemon = daemon::Daemon::new();

        // Launch all configured tasks
        daemon.launch(&config, Some(config_path)).await?;

        // Wait for termination signal
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal, terminating daemon");
                daemon.shutdown();
                daemon.join().await?;
            }
            Err(err) => {
                eprintln!("Error waiting for shutdown signal: {}", err);
            }
        }

        return Ok(());
    }

    println!("Server mode disabled, nothing to do");
    Ok(())
}
