// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the OpenID Provider
//!
//! The configuration is backed by a YAML file validated against a JSON
//! schema before deserialization. On validation failure a commented sample
//! file is written next to the broken one so an operator can diff and repair.
//!
//! ## Sections
//!
//! - `server`: bind address, port, TLS material, cookie secret
//! - `oidc`: issuer, token/code/session lifetimes, signing-key policy
//! - `storage`: backend selection (memory or embedded JSON file)
//! - `registration`: dynamic client registration gates
//! - `bootstrap`: users/clients/initial access tokens seeded on startup
//!
//! ## Usage
//!
//! ```no_run
//! use rust_oidc_provider::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some(8081),                                  // Web port
//!     Some("0.0.0.0".to_string()),                 // Web address
//!     Some("https://op.example".to_string()),      // Issuer
//!     None,                                        // Storage path
//!     true,                                        // Daemon mode
//! );
//!
//! println!("Server port: {}", config.server.port);
//! ```

pub mod bootstrap;
pub mod oidc;
pub mod registration;
pub mod server;
pub mod storage;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

// Re-export all types for public API
pub use bootstrap::{BootstrapClient, BootstrapConfig, BootstrapUser};
pub use oidc::OidcConfig;
pub use registration::RegistrationConfig;
pub use server::ServerConfig;
pub use storage::{StorageBackend, StorageConfig};
pub use utils::output_config_schema;

/// Root configuration structure for the provider
///
/// Every section falls back to its defaults when absent from the file, so a
/// minimal deployment can run off an empty document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Protocol lifetimes, issuer and signing-key policy
    #[serde(default)]
    pub oidc: OidcConfig,

    /// Persistence backend selection
    #[serde(default)]
    pub storage: StorageConfig,

    /// Dynamic client registration gates
    #[serde(default)]
    pub registration: RegistrationConfig,

    /// Records seeded into storage at startup when missing
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Creating sample configuration file at {:?}", sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create parent directory at {:?}", parent)
                })?;
            }
        }

        let sample_config = Self::default();
        sample_config
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        // First step: convert YAML to a generic Value
        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;

        // Convert to JSON Value for validation
        let json_value = serde_json::to_value(&yaml_value).with_context(|| {
            format!("Failed to convert YAML to JSON for validation: {:?}", path)
        })?;

        // Load and validate with the schema
        let schema_str = include_str!("../../resources/config.schema.json");
        let schema: serde_json::Value =
            serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                match Self::create_sample_config(path) {
                    Ok(_) => debug!("Successfully created sample config"),
                    Err(e) => error!("Failed to create sample config: {}", e),
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        // Perform additional specific validations
        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only values that are explicitly provided override the file.
    ///
    /// # Parameters
    ///
    /// * `web_port` - TCP port for the web server
    /// * `web_address` - Network address for the web server to bind to
    /// * `issuer` - Issuer identifier for tokens
    /// * `storage_path` - Path of the file-backed store
    /// * `daemon_mode` - If true, ensures the web server is enabled
    pub fn apply_args(
        &mut self,
        web_port: Option<u16>,
        web_address: Option<String>,
        issuer: Option<String>,
        storage_path: Option<String>,
        daemon_mode: bool,
    ) {
        if let Some(web_port) = web_port {
            debug!("Overriding port from command line: {}", web_port);
            self.server.port = web_port;
        }

        if let Some(web_address) = web_address {
            debug!("Overriding address from command line: {}", web_address);
            self.server.address = web_address;
        }

        if let Some(issuer) = issuer {
            debug!("Overriding issuer from command line: {}", issuer);
            self.oidc.issuer = issuer;
        }

        if let Some(path) = storage_path {
            debug!("Overriding storage path from command line: {}", path);
            self.storage.backend = StorageBackend::File;
            self.storage.path = path;
        }

        if daemon_mode {
            self.server.enabled = true;
        }
    }
}
