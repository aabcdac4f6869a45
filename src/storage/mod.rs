// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Persistence contract and backends
//!
//! All provider state lives behind the [`Storage`] trait: users, clients,
//! authorization codes, token bundles, sessions, consents, signing keys and
//! initial access tokens. Two embedded backends ship with the crate:
//!
//! - [`MemoryStorage`]: hash maps behind a single `RwLock`, used by tests and
//!   ephemeral deployments
//! - [`FileStorage`]: one JSON document on disk with the memory store as its
//!   in-memory index, rewritten atomically on every mutation
//!
//! A document database (TTL index on `expires_at` for codes and sessions,
//! unique indexes for usernames, emails, token values and the
//! `(user_id, client_id)` consent key) is an external collaborator that
//! plugs in behind the same trait.
//!
//! ## Consistency
//!
//! Single-entity operations are atomic. The compound operations
//! ([`Storage::consume_authorization_code`], [`Storage::take_token_by_refresh`],
//! [`Storage::revoke_tokens_by_auth_code`], [`Storage::activate_signing_key`])
//! are linearizable: concurrent callers observe them as a single step, which
//! is what makes authorization codes single-use and refresh rotation exact.

pub mod file;
pub mod memory;
pub mod models;
pub mod timed;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use models::*;
pub use timed::TimedStorage;

use std::sync::Arc;

/// Shared handle to a storage backend
pub type SharedStorage = Arc<dyn Storage>;

/// Errors surfaced by storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    /// A uniqueness constraint was violated (username, email, token value,
    /// or the `(user_id, client_id)` consent key)
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("storage call timed out")]
    Timeout,
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Outcome of the single-use compare-and-swap on an authorization code
#[derive(Debug, Clone)]
pub enum CodeConsumption {
    /// The code was unused; it is now marked `used = true` and returned
    FirstUse(AuthorizationCode),
    /// The code had already been used: this call is a replay
    Replayed(AuthorizationCode),
}

/// Persistence contract for every provider entity
///
/// Implementations are internally synchronized; every method is safe to call
/// from concurrent request handlers. Methods looking records up return
/// `Ok(None)` when the record does not exist and reserve `Err` for backend
/// failures.
#[async_trait]
pub trait Storage: Send + Sync {
    // --- Users ---

    /// Inserts a user. Fails with [`StorageError::DuplicateKey`] when the id,
    /// username or email is already taken.
    async fn create_user(&self, user: User) -> Result<()>;
    async fn get_user(&self, id: &str) -> Result<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn update_user(&self, user: User) -> Result<()>;
    /// Deletes the user and everything they own: tokens, sessions, consents.
    /// Returns true when a user was deleted.
    async fn delete_user(&self, id: &str) -> Result<bool>;

    // --- Clients ---

    async fn create_client(&self, client: Client) -> Result<()>;
    async fn get_client(&self, id: &str) -> Result<Option<Client>>;
    async fn list_clients(&self) -> Result<Vec<Client>>;
    async fn update_client(&self, client: Client) -> Result<()>;
    async fn delete_client(&self, id: &str) -> Result<bool>;

    // --- Authorization codes ---

    async fn put_authorization_code(&self, code: AuthorizationCode) -> Result<()>;
    async fn get_authorization_code(&self, code: &str) -> Result<Option<AuthorizationCode>>;
    /// Atomically transitions `used: false -> true` (stamping `used_at`).
    /// Of any number of concurrent callers exactly one observes
    /// [`CodeConsumption::FirstUse`]; all others observe `Replayed`.
    async fn consume_authorization_code(&self, code: &str) -> Result<Option<CodeConsumption>>;
    async fn delete_authorization_code(&self, code: &str) -> Result<bool>;

    // --- Tokens ---

    /// Inserts a token bundle. Fails with [`StorageError::DuplicateKey`] when
    /// the access or refresh token value already exists.
    async fn put_token(&self, token: Token) -> Result<()>;
    async fn get_token(&self, id: &str) -> Result<Option<Token>>;
    async fn get_token_by_access(&self, access_token: &str) -> Result<Option<Token>>;
    async fn get_token_by_refresh(&self, refresh_token: &str) -> Result<Option<Token>>;
    /// Atomically removes and returns the bundle addressed by a refresh token.
    /// Exactly one of any number of concurrent callers gets the bundle, which
    /// is what makes refresh-token rotation observe the old token once.
    async fn take_token_by_refresh(&self, refresh_token: &str) -> Result<Option<Token>>;
    async fn list_tokens_by_auth_code(&self, auth_code_id: &str) -> Result<Vec<Token>>;
    async fn delete_token(&self, id: &str) -> Result<bool>;
    /// Deletes every token minted from the given authorization code in one
    /// step; returns the number of deleted bundles.
    async fn revoke_tokens_by_auth_code(&self, auth_code_id: &str) -> Result<usize>;

    // --- Auth sessions ---

    async fn put_auth_session(&self, session: AuthSession) -> Result<()>;
    async fn get_auth_session(&self, id: &str) -> Result<Option<AuthSession>>;
    async fn update_auth_session(&self, session: AuthSession) -> Result<()>;
    async fn delete_auth_session(&self, id: &str) -> Result<bool>;

    // --- User sessions ---

    async fn put_user_session(&self, session: UserSession) -> Result<()>;
    async fn get_user_session(&self, id: &str) -> Result<Option<UserSession>>;
    async fn update_user_session(&self, session: UserSession) -> Result<()>;
    async fn delete_user_session(&self, id: &str) -> Result<bool>;
    /// Most recent non-expired session for a user, if any
    async fn latest_user_session(&self, user_id: &str) -> Result<Option<UserSession>>;

    // --- Consents ---

    /// Inserts or replaces the consent row for `(user_id, client_id)`
    async fn upsert_consent(&self, consent: Consent) -> Result<()>;
    async fn get_consent(&self, user_id: &str, client_id: &str) -> Result<Option<Consent>>;
    async fn delete_consent(&self, user_id: &str, client_id: &str) -> Result<bool>;

    // --- Signing keys ---

    async fn put_signing_key(&self, key: SigningKey) -> Result<()>;
    async fn get_signing_key_by_kid(&self, kid: &str) -> Result<Option<SigningKey>>;
    async fn list_signing_keys(&self) -> Result<Vec<SigningKey>>;
    /// Atomically inserts `new_key` as the active key while demoting every
    /// currently active key to inactive with the given verification grace
    /// deadline. Readers never observe zero or two active keys.
    async fn activate_signing_key(
        &self,
        new_key: SigningKey,
        previous_expires_at: DateTime<Utc>,
    ) -> Result<()>;

    // --- Initial access tokens ---

    async fn put_initial_access_token(&self, token: InitialAccessToken) -> Result<()>;
    async fn get_initial_access_token(&self, token: &str) -> Result<Option<InitialAccessToken>>;
    /// Single-use compare-and-swap: marks the token used by `client_id`.
    /// Returns false when the token is unknown, expired or already used.
    async fn consume_initial_access_token(&self, token: &str, client_id: &str) -> Result<bool>;

    // --- Maintenance ---

    /// Drops every expired auth session, user session and authorization code.
    /// Returns the number of removed records.
    async fn cleanup_expired_sessions(&self) -> Result<usize>;
}
