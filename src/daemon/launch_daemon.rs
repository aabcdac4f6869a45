// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Management Module
//!
//! Runs and manages the provider's long-lived tasks:
//!
//! - the Rocket web server carrying every protocol endpoint
//! - the hourly session/code sweeper backing the storage TTLs
//! - a heartbeat for basic liveness logging
//!
//! Startup also wires the storage backend, guarantees an active signing key
//! and seeds the bootstrap users/clients. Shutdown is cooperative: tasks
//! watch a shared `running` flag and are given a bounded window to finish
//! before the daemon gives up on them.
//!
//! ## Usage
//!
//! ```no_run
//! use rust_oidc_provider::{config::Config, daemon::Daemon};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml")?;
//!
//!     // Create and launch daemon with all enabled services
//!     let mut daemon = Daemon::new();
//!     daemon.launch(&config, None).await?;
//!
//!     // Later, trigger a graceful shutdown
//!     daemon.shutdown();
//!
//!     // Wait for all tasks to complete
//!     daemon.join().await?;
//!
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{Context, Result};
use base64::prelude::*;
use chrono::Utc;
use log::{debug, error, info, warn};
use rocket::config::LogLevel;
use rocket::data::{Limits, ToByteUnit};
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::{Config, StorageBackend};
use crate::crypto::KeyManager;
use crate::oauth::OAuthContext;
use crate::server::build_rocket;
use crate::storage::{FileStorage, MemoryStorage, SharedStorage, Storage, TimedStorage};

/// Interval of the expired session/code sweep
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// How long `join` waits for a task before declaring it hung
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinates the provider's background tasks
///
/// Tasks share an atomic `running` flag; `shutdown` flips it and `join`
/// waits (with a timeout) for everything to drain.
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    pub fn new() -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Opens the configured storage backend, wrapped in the per-call timeout
    pub fn open_storage(config: &Config) -> Result<SharedStorage> {
        let inner: Arc<dyn Storage> = match config.storage.backend {
            StorageBackend::Memory => {
                info!("Using in-memory storage (state is volatile)");
                Arc::new(MemoryStorage::new())
            }
            StorageBackend::File => {
                info!("Using file storage at {}", config.storage.path);
                Arc::new(
                    FileStorage::open(&config.storage.path)
                        .context("opening file storage backend")?,
                )
            }
        };
        Ok(Arc::new(TimedStorage::new(
            inner,
            Duration::from_secs(config.oidc.storage_timeout_seconds),
        )))
    }

    /// Builds the protocol engine context over a storage handle
    pub async fn build_context(
        config: &Config,
        storage: SharedStorage,
    ) -> Result<Arc<OAuthContext>> {
        let keys = KeyManager::initialize(
            storage.clone(),
            config.oidc.rsa_key_bits,
            chrono::Duration::days(config.oidc.key_rotation_grace_days),
        )
        .await
        .context("initializing signing keys")?;

        Ok(Arc::new(OAuthContext {
            storage,
            keys,
            issuer: config.oidc.issuer.clone(),
            token_ttl: chrono::Duration::minutes(config.oidc.token_expiry_minutes),
            code_ttl: chrono::Duration::seconds(config.oidc.code_expiry_seconds),
            auth_session_ttl: chrono::Duration::seconds(config.oidc.auth_session_expiry_seconds),
            user_session_ttl: chrono::Duration::hours(config.oidc.user_session_expiry_hours),
        }))
    }

    /// Seeds bootstrap users, clients and initial access tokens that do not
    /// exist yet; records already present are left untouched.
    pub async fn apply_bootstrap(config: &Config, storage: &SharedStorage) -> Result<()> {
        for user in &config.bootstrap.users {
            if storage.get_user_by_username(&user.username).await?.is_some() {
                continue;
            }
            let record = user.clone().into_user()?;
            info!("Seeding bootstrap user {}", record.username);
            storage.create_user(record).await?;
        }
        for client in &config.bootstrap.clients {
            if storage.get_client(&client.client_id).await?.is_some() {
                continue;
            }
            let record = client.clone().into_client();
            info!("Seeding bootstrap client {}", record.id);
            storage.create_client(record).await?;
        }
        for token in &config.bootstrap.initial_access_tokens {
            if storage.get_initial_access_token(token).await?.is_some() {
                continue;
            }
            storage
                .put_initial_access_token(crate::storage::models::InitialAccessToken {
                    token: token.clone(),
                    used: false,
                    used_by: None,
                    created_at: Utc::now(),
                    expires_at: None,
                })
                .await?;
        }
        Ok(())
    }

    /// Launch all configured tasks based on configuration
    ///
    /// `config_path` is where admin settings edits persist; pass the path
    /// the configuration was loaded from.
    pub async fn launch(&mut self, config: &Config, config_path: Option<PathBuf>) -> Result<()> {
        let storage = Self::open_storage(config)?;
        let ctx = Self::build_context(config, storage.clone()).await?;
        Self::apply_bootstrap(config, &storage).await?;

        if config.server.enabled {
            self.start_web_server(config, config_path, ctx.clone()).await?;
        }

        self.start_session_sweeper(storage)?;
        self.start_heartbeat()?;

        Ok(())
    }

    /// Start the Rocket web server carrying the protocol endpoints
    async fn start_web_server(
        &mut self,
        config: &Config,
        config_path: Option<PathBuf>,
        ctx: Arc<OAuthContext>,
    ) -> Result<()> {
        info!(
            "Starting web server on {}:{}",
            config.server.address, config.server.port
        );

        let mut figment = rocket::Config::figment()
            .merge(("ident", config.server.name.clone()))
            .merge(("limits", Limits::new().limit("json", 2.mebibytes())))
            .merge(("address", config.server.address.clone()))
            .merge(("port", config.server.port))
            .merge(("secret_key", config.server.cookie_secret.clone()))
            .merge(("log_level", LogLevel::Normal));

        // Configure TLS if certificates are provided
        if let (Some(cert), Some(key)) = (&config.server.cert, &config.server.key) {
            debug!("TLS certificates found in configuration, enabling TLS");
            let cert_data = BASE64_STANDARD.decode(cert)?;
            let key_data = BASE64_STANDARD.decode(key)?;
            figment = figment
                .merge(("tls.certs", cert_data))
                .merge(("tls.key", key_data));
            info!("TLS enabled for web server");
        }

        let rocket = build_rocket(figment, config.clone(), config_path, ctx);

        let task = tokio::spawn(async move {
            let ignited = rocket.ignite().await?;
            ignited.launch().await?;
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Start the hourly sweep that reclaims expired sessions and codes
    fn start_session_sweeper(&mut self, storage: SharedStorage) -> Result<()> {
        info!("Starting expired-session sweeper");

        let running = self.running.clone();
        let task = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                time::sleep(SWEEP_INTERVAL).await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                match storage.cleanup_expired_sessions().await {
                    Ok(0) => debug!("Session sweep: nothing to reclaim"),
                    Ok(removed) => info!("Session sweep reclaimed {} record(s)", removed),
                    Err(e) => error!("Session sweep failed: {}", e),
                }
            }
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Start a heartbeat task that logs liveness periodically
    fn start_heartbeat(&mut self) -> Result<()> {
        info!("Starting heartbeat monitor");

        let running = self.running.clone();
        let task = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                debug!("Daemon heartbeat: running");
                time::sleep(Duration::from_secs(60)).await;
            }
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Stop all running tasks gracefully
    ///
    /// Signals the tasks to terminate; call [`Daemon::join`] afterwards to
    /// wait for them.
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Wait for all tasks to complete
    ///
    /// Tasks get [`SHUTDOWN_TIMEOUT`] each; a task that does not finish in
    /// time is logged and abandoned rather than blocking the exit.
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await {
                Ok(result) => {
                    if let Err(e) = result {
                        error!("Task panicked: {}", e);
                    }
                }
                Err(_) => {
                    warn!("Task did not complete within timeout period, may be hung");
                }
            }
        }
        Ok(())
    }
}
