// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Embedded JSON file storage backend
//!
//! The whole provider state is one JSON document on disk, mirroring the
//! collection layout of [`super::memory::StorageState`]. A `MemoryStorage`
//! acts as the in-memory index: reads never touch the disk, every mutation
//! goes through the index and is then written back as a whole.
//!
//! Two properties the backend guarantees:
//!
//! - writes are atomic: the document is serialized into a temporary file in
//!   the target directory and moved over the old one, so a crash never leaves
//!   a half-written store behind
//! - expired short-lived records (authorization codes and both session kinds)
//!   are re-scanned and dropped on every write, the file-store stand-in for
//!   the TTL indexes a document database would use

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;

use super::memory::{MemoryStorage, StorageState};
use super::models::*;
use super::{CodeConsumption, Result, Storage, StorageError};

pub struct FileStorage {
    path: PathBuf,
    index: MemoryStorage,
}

impl FileStorage {
    /// Opens (or creates) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let index = if path.exists() {
            debug!("Loading storage document from {:?}", path);
            let contents = std::fs::read(&path)?;
            let state: StorageState = serde_json::from_slice(&contents)?;
            MemoryStorage::from_state(state)
        } else {
            debug!("No storage document at {:?}, starting empty", path);
            MemoryStorage::new()
        };
        let store = FileStorage { path, index };
        // Materialize the file immediately so startup failures surface early
        store.persist()?;
        Ok(store)
    }

    /// Serializes the current index to disk, dropping expired records first
    fn persist(&self) -> Result<()> {
        let mut state = self.index.snapshot();
        let dropped = state.purge_expired(Utc::now());
        if dropped > 0 {
            debug!("Dropped {} expired records on write", dropped);
        }
        let json = serde_json::to_vec_pretty(&state)?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
        }
        let mut tmp = tempfile::NamedTempFile::new_in(if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        })?;
        tmp.write_all(&json)?;
        tmp.persist(&self.path)
            .map_err(|e| StorageError::Backend(format!("atomic rename failed: {}", e)))?;
        Ok(())
    }

    /// Runs a mutation against the index and writes the document back
    async fn commit<T>(&self, result: Result<T>) -> Result<T> {
        let value = result?;
        self.persist()?;
        Ok(value)
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn create_user(&self, user: User) -> Result<()> {
        let res = self.index.create_user(user).await;
        self.commit(res).await
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.index.get_user(id).await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.index.get_user_by_username(username).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.index.get_user_by_email(email).await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.index.list_users().await
    }

    async fn update_user(&self, user: User) -> Result<()> {
        let res = self.index.update_user(user).await;
        self.commit(res).await
    }

    async fn delete_user(&self, id: &str) -> Result<bool> {
        let res = self.index.delete_user(id).await;
        self.commit(res).await
    }

    async fn create_client(&self, client: Client) -> Result<()> {
        let res = self.index.create_client(client).await;
        self.commit(res).await
    }

    async fn get_client(&self, id: &str) -> Result<Option<Client>> {
        self.index.get_client(id).await
    }

    async fn list_clients(&self) -> Result<Vec<Client>> {
        self.index.list_clients().await
    }

    async fn update_client(&self, client: Client) -> Result<()> {
        let res = self.index.update_client(client).await;
        self.commit(res).await
    }

    async fn delete_client(&self, id: &str) -> Result<bool> {
        let res = self.index.delete_client(id).await;
        self.commit(res).await
    }

    async fn put_authorization_code(&self, code: AuthorizationCode) -> Result<()> {
        let res = self.index.put_authorization_code(code).await;
        self.commit(res).await
    }

    async fn get_authorization_code(&self, code: &str) -> Result<Option<AuthorizationCode>> {
        self.index.get_authorization_code(code).await
    }

    async fn consume_authorization_code(&self, code: &str) -> Result<Option<CodeConsumption>> {
        let res = self.index.consume_authorization_code(code).await;
        self.commit(res).await
    }

    async fn delete_authorization_code(&self, code: &str) -> Result<bool> {
        let res = self.index.delete_authorization_code(code).await;
        self.commit(res).await
    }

    async fn put_token(&self, token: Token) -> Result<()> {
        let res = self.index.put_token(token).await;
        self.commit(res).await
    }

    async fn get_token(&self, id: &str) -> Result<Option<Token>> {
        self.index.get_token(id).await
    }

    async fn get_token_by_access(&self, access_token: &str) -> Result<Option<Token>> {
        self.index.get_token_by_access(access_token).await
    }

    async fn get_token_by_refresh(&self, refresh_token: &str) -> Result<Option<Token>> {
        self.index.get_token_by_refresh(refresh_token).await
    }

    async fn take_token_by_refresh(&self, refresh_token: &str) -> Result<Option<Token>> {
        let res = self.index.take_token_by_refresh(refresh_token).await;
        self.commit(res).await
    }

    async fn list_tokens_by_auth_code(&self, auth_code_id: &str) -> Result<Vec<Token>> {
        self.index.list_tokens_by_auth_code(auth_code_id).await
    }

    async fn delete_token(&self, id: &str) -> Result<bool> {
        let res = self.index.delete_token(id).await;
        self.commit(res).await
    }

    async fn revoke_tokens_by_auth_code(&self, auth_code_id: &str) -> Result<usize> {
        let res = self.index.revoke_tokens_by_auth_code(auth_code_id).await;
        self.commit(res).await
    }

    async fn put_auth_session(&self, session: AuthSession) -> Result<()> {
        let res = self.index.put_auth_session(session).await;
        self.commit(res).await
    }

    async fn get_auth_session(&self, id: &str) -> Result<Option<AuthSession>> {
        self.index.get_auth_session(id).await
    }

    async fn update_auth_session(&self, session: AuthSession) -> Result<()> {
        let res = self.index.update_auth_session(session).await;
        self.commit(res).await
    }

    async fn delete_auth_session(&self, id: &str) -> Result<bool> {
        let res = self.index.delete_auth_session(id).await;
        self.commit(res).await
    }

    async fn put_user_session(&self, session: UserSession) -> Result<()> {
        let res = self.index.put_user_session(session).await;
        self.commit(res).await
    }

    async fn get_user_session(&self, id: &str) -> Result<Option<UserSession>> {
        self.index.get_user_session(id).await
    }

    async fn update_user_session(&self, session: UserSession) -> Result<()> {
        let res = self.index.update_user_session(session).await;
        self.commit(res).await
    }

    async fn delete_user_session(&self, id: &str) -> Result<bool> {
        let res = self.index.delete_user_session(id).await;
        self.commit(res).await
    }

    async fn latest_user_session(&self, user_id: &str) -> Result<Option<UserSession>> {
        self.index.latest_user_session(user_id).await
    }

    async fn upsert_consent(&self, consent: Consent) -> Result<()> {
        let res = self.index.upsert_consent(consent).await;
        self.commit(res).await
    }

    async fn get_consent(&self, user_id: &str, client_id: &str) -> Result<Option<Consent>> {
        self.index.get_consent(user_id, client_id).await
    }

    async fn delete_consent(&self, user_id: &str, client_id: &str) -> Result<bool> {
        let res = self.index.delete_consent(user_id, client_id).await;
        self.commit(res).await
    }

    async fn put_signing_key(&self, key: SigningKey) -> Result<()> {
        let res = self.index.put_signing_key(key).await;
        self.commit(res).await
    }

    async fn get_signing_key_by_kid(&self, kid: &str) -> Result<Option<SigningKey>> {
        self.index.get_signing_key_by_kid(kid).await
    }

    async fn list_signing_keys(&self) -> Result<Vec<SigningKey>> {
        self.index.list_signing_keys().await
    }

    async fn activate_signing_key(
        &self,
        new_key: SigningKey,
        previous_expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let res = self
            .index
            .activate_signing_key(new_key, previous_expires_at)
            .await;
        self.commit(res).await
    }

    async fn put_initial_access_token(&self, token: InitialAccessToken) -> Result<()> {
        let res = self.index.put_initial_access_token(token).await;
        self.commit(res).await
    }

    async fn get_initial_access_token(&self, token: &str) -> Result<Option<InitialAccessToken>> {
        self.index.get_initial_access_token(token).await
    }

    async fn consume_initial_access_token(&self, token: &str, client_id: &str) -> Result<bool> {
        let res = self
            .index
            .consume_initial_access_token(token, client_id)
            .await;
        self.commit(res).await
    }

    async fn cleanup_expired_sessions(&self) -> Result<usize> {
        let res = self.index.cleanup_expired_sessions().await;
        self.commit(res).await
    }
}
