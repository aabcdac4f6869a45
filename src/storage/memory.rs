// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! In-memory storage backend
//!
//! All collections live in one [`StorageState`] behind a single `RwLock`.
//! Taking the write lock once per compound operation is what makes
//! `consume_authorization_code`, `take_token_by_refresh` and
//! `activate_signing_key` linearizable without any further coordination.
//!
//! The same state struct doubles as the on-disk document of the file backend,
//! which embeds a `MemoryStorage` as its index.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::models::*;
use super::{CodeConsumption, Result, Storage, StorageError};

/// Separator used to build the composite consent key
pub const CONSENT_KEY_SEPARATOR: char = '⛷';

fn consent_key(user_id: &str, client_id: &str) -> String {
    format!("{}{}{}", user_id, CONSENT_KEY_SEPARATOR, client_id)
}

/// Every collection of the provider as keyed mappings
///
/// Serialized verbatim by the file backend, so field names here are the
/// on-disk collection names.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StorageState {
    #[serde(default)]
    pub users: HashMap<String, User>,
    #[serde(default)]
    pub clients: HashMap<String, Client>,
    #[serde(default)]
    pub authorization_codes: HashMap<String, AuthorizationCode>,
    #[serde(default)]
    pub tokens: HashMap<String, Token>,
    #[serde(default)]
    pub auth_sessions: HashMap<String, AuthSession>,
    #[serde(default)]
    pub user_sessions: HashMap<String, UserSession>,
    #[serde(default)]
    pub consents: HashMap<String, Consent>,
    #[serde(default)]
    pub signing_keys: HashMap<String, SigningKey>,
    #[serde(default)]
    pub initial_access_tokens: HashMap<String, InitialAccessToken>,
}

impl StorageState {
    /// Drops expired short-lived records (codes and both session kinds),
    /// returning how many were removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.authorization_codes.len() + self.auth_sessions.len() + self.user_sessions.len();
        self.authorization_codes.retain(|_, c| !c.is_expired(now));
        self.auth_sessions.retain(|_, s| !s.is_expired(now));
        self.user_sessions.retain(|_, s| !s.is_expired(now));
        before
            - (self.authorization_codes.len() + self.auth_sessions.len() + self.user_sessions.len())
    }
}

/// Hash-map backend used for tests, ephemeral deployments and as the
/// in-memory index of [`super::FileStorage`]
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: RwLock<StorageState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }

    pub fn from_state(state: StorageState) -> Self {
        MemoryStorage {
            state: RwLock::new(state),
        }
    }

    /// Clone of the full state, used by the file backend to persist
    pub fn snapshot(&self) -> StorageState {
        self.read().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, StorageState> {
        self.state.read().unwrap()
    }

    fn write(&self) -> RwLockWriteGuard<'_, StorageState> {
        self.state.write().unwrap()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create_user(&self, user: User) -> Result<()> {
        let mut state = self.write();
        if state.users.contains_key(&user.id) {
            return Err(StorageError::DuplicateKey(format!("user id {}", user.id)));
        }
        if state.users.values().any(|u| u.username == user.username) {
            return Err(StorageError::DuplicateKey(format!(
                "username {}",
                user.username
            )));
        }
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StorageError::DuplicateKey(format!("email {}", user.email)));
        }
        state.users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.read().users.get(id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .read()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .read()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.read().users.values().cloned().collect())
    }

    async fn update_user(&self, user: User) -> Result<()> {
        let mut state = self.write();
        if state
            .users
            .values()
            .any(|u| u.id != user.id && u.username == user.username)
        {
            return Err(StorageError::DuplicateKey(format!(
                "username {}",
                user.username
            )));
        }
        if state
            .users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(StorageError::DuplicateKey(format!("email {}", user.email)));
        }
        match state.users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user;
                Ok(())
            }
            None => Err(StorageError::NotFound(format!("user {}", user.id))),
        }
    }

    async fn delete_user(&self, id: &str) -> Result<bool> {
        let mut state = self.write();
        if state.users.remove(id).is_none() {
            return Ok(false);
        }
        // The user owns their tokens, sessions, codes and consents
        state.tokens.retain(|_, t| t.user_id != id);
        state.user_sessions.retain(|_, s| s.user_id != id);
        state
            .auth_sessions
            .retain(|_, s| s.user_id.as_deref() != Some(id));
        state.authorization_codes.retain(|_, c| c.user_id != id);
        state.consents.retain(|_, c| c.user_id != id);
        Ok(true)
    }

    async fn create_client(&self, client: Client) -> Result<()> {
        let mut state = self.write();
        if state.clients.contains_key(&client.id) {
            return Err(StorageError::DuplicateKey(format!(
                "client id {}",
                client.id
            )));
        }
        state.clients.insert(client.id.clone(), client);
        Ok(())
    }

    async fn get_client(&self, id: &str) -> Result<Option<Client>> {
        Ok(self.read().clients.get(id).cloned())
    }

    async fn list_clients(&self) -> Result<Vec<Client>> {
        Ok(self.read().clients.values().cloned().collect())
    }

    async fn update_client(&self, client: Client) -> Result<()> {
        let mut state = self.write();
        match state.clients.get_mut(&client.id) {
            Some(existing) => {
                *existing = client;
                Ok(())
            }
            None => Err(StorageError::NotFound(format!("client {}", client.id))),
        }
    }

    async fn delete_client(&self, id: &str) -> Result<bool> {
        let mut state = self.write();
        if state.clients.remove(id).is_none() {
            return Ok(false);
        }
        state.tokens.retain(|_, t| t.client_id != id);
        state.authorization_codes.retain(|_, c| c.client_id != id);
        state.auth_sessions.retain(|_, s| s.client_id != id);
        state.consents.retain(|_, c| c.client_id != id);
        Ok(true)
    }

    async fn put_authorization_code(&self, code: AuthorizationCode) -> Result<()> {
        let mut state = self.write();
        if state.authorization_codes.contains_key(&code.code) {
            return Err(StorageError::DuplicateKey("authorization code".into()));
        }
        state.authorization_codes.insert(code.code.clone(), code);
        Ok(())
    }

    async fn get_authorization_code(&self, code: &str) -> Result<Option<AuthorizationCode>> {
        Ok(self.read().authorization_codes.get(code).cloned())
    }

    async fn consume_authorization_code(&self, code: &str) -> Result<Option<CodeConsumption>> {
        let mut state = self.write();
        match state.authorization_codes.get_mut(code) {
            Some(stored) if stored.used => Ok(Some(CodeConsumption::Replayed(stored.clone()))),
            Some(stored) => {
                stored.used = true;
                stored.used_at = Some(Utc::now());
                Ok(Some(CodeConsumption::FirstUse(stored.clone())))
            }
            None => Ok(None),
        }
    }

    async fn delete_authorization_code(&self, code: &str) -> Result<bool> {
        Ok(self.write().authorization_codes.remove(code).is_some())
    }

    async fn put_token(&self, token: Token) -> Result<()> {
        let mut state = self.write();
        if state.tokens.contains_key(&token.id) {
            return Err(StorageError::DuplicateKey(format!("token id {}", token.id)));
        }
        if state
            .tokens
            .values()
            .any(|t| t.access_token == token.access_token)
        {
            return Err(StorageError::DuplicateKey("access token".into()));
        }
        if let Some(refresh) = &token.refresh_token {
            if state
                .tokens
                .values()
                .any(|t| t.refresh_token.as_deref() == Some(refresh.as_str()))
            {
                return Err(StorageError::DuplicateKey("refresh token".into()));
            }
        }
        state.tokens.insert(token.id.clone(), token);
        Ok(())
    }

    async fn get_token(&self, id: &str) -> Result<Option<Token>> {
        Ok(self.read().tokens.get(id).cloned())
    }

    async fn get_token_by_access(&self, access_token: &str) -> Result<Option<Token>> {
        Ok(self
            .read()
            .tokens
            .values()
            .find(|t| t.access_token == access_token)
            .cloned())
    }

    async fn get_token_by_refresh(&self, refresh_token: &str) -> Result<Option<Token>> {
        Ok(self
            .read()
            .tokens
            .values()
            .find(|t| t.refresh_token.as_deref() == Some(refresh_token))
            .cloned())
    }

    async fn take_token_by_refresh(&self, refresh_token: &str) -> Result<Option<Token>> {
        let mut state = self.write();
        let id = state
            .tokens
            .values()
            .find(|t| t.refresh_token.as_deref() == Some(refresh_token))
            .map(|t| t.id.clone());
        Ok(id.and_then(|id| state.tokens.remove(&id)))
    }

    async fn list_tokens_by_auth_code(&self, auth_code_id: &str) -> Result<Vec<Token>> {
        Ok(self
            .read()
            .tokens
            .values()
            .filter(|t| t.authorization_code_id.as_deref() == Some(auth_code_id))
            .cloned()
            .collect())
    }

    async fn delete_token(&self, id: &str) -> Result<bool> {
        Ok(self.write().tokens.remove(id).is_some())
    }

    async fn revoke_tokens_by_auth_code(&self, auth_code_id: &str) -> Result<usize> {
        let mut state = self.write();
        let before = state.tokens.len();
        state
            .tokens
            .retain(|_, t| t.authorization_code_id.as_deref() != Some(auth_code_id));
        Ok(before - state.tokens.len())
    }

    async fn put_auth_session(&self, session: AuthSession) -> Result<()> {
        self.write().auth_sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get_auth_session(&self, id: &str) -> Result<Option<AuthSession>> {
        Ok(self.read().auth_sessions.get(id).cloned())
    }

    async fn update_auth_session(&self, session: AuthSession) -> Result<()> {
        let mut state = self.write();
        match state.auth_sessions.get_mut(&session.id) {
            Some(existing) => {
                *existing = session;
                Ok(())
            }
            None => Err(StorageError::NotFound(format!(
                "auth session {}",
                session.id
            ))),
        }
    }

    async fn delete_auth_session(&self, id: &str) -> Result<bool> {
        Ok(self.write().auth_sessions.remove(id).is_some())
    }

    async fn put_user_session(&self, session: UserSession) -> Result<()> {
        self.write().user_sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get_user_session(&self, id: &str) -> Result<Option<UserSession>> {
        Ok(self.read().user_sessions.get(id).cloned())
    }

    async fn update_user_session(&self, session: UserSession) -> Result<()> {
        let mut state = self.write();
        match state.user_sessions.get_mut(&session.id) {
            Some(existing) => {
                *existing = session;
                Ok(())
            }
            None => Err(StorageError::NotFound(format!(
                "user session {}",
                session.id
            ))),
        }
    }

    async fn delete_user_session(&self, id: &str) -> Result<bool> {
        Ok(self.write().user_sessions.remove(id).is_some())
    }

    async fn latest_user_session(&self, user_id: &str) -> Result<Option<UserSession>> {
        let now = Utc::now();
        Ok(self
            .read()
            .user_sessions
            .values()
            .filter(|s| s.user_id == user_id && !s.is_expired(now))
            .max_by_key(|s| s.auth_time)
            .cloned())
    }

    async fn upsert_consent(&self, consent: Consent) -> Result<()> {
        let key = consent_key(&consent.user_id, &consent.client_id);
        self.write().consents.insert(key, consent);
        Ok(())
    }

    async fn get_consent(&self, user_id: &str, client_id: &str) -> Result<Option<Consent>> {
        Ok(self
            .read()
            .consents
            .get(&consent_key(user_id, client_id))
            .cloned())
    }

    async fn delete_consent(&self, user_id: &str, client_id: &str) -> Result<bool> {
        Ok(self
            .write()
            .consents
            .remove(&consent_key(user_id, client_id))
            .is_some())
    }

    async fn put_signing_key(&self, key: SigningKey) -> Result<()> {
        let mut state = self.write();
        if state.signing_keys.contains_key(&key.kid) {
            return Err(StorageError::DuplicateKey(format!("kid {}", key.kid)));
        }
        state.signing_keys.insert(key.kid.clone(), key);
        Ok(())
    }

    async fn get_signing_key_by_kid(&self, kid: &str) -> Result<Option<SigningKey>> {
        Ok(self.read().signing_keys.get(kid).cloned())
    }

    async fn list_signing_keys(&self) -> Result<Vec<SigningKey>> {
        Ok(self.read().signing_keys.values().cloned().collect())
    }

    async fn activate_signing_key(
        &self,
        new_key: SigningKey,
        previous_expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.write();
        for key in state.signing_keys.values_mut() {
            if key.is_active {
                key.is_active = false;
                key.expires_at = Some(previous_expires_at);
            }
        }
        state.signing_keys.insert(new_key.kid.clone(), new_key);
        Ok(())
    }

    async fn put_initial_access_token(&self, token: InitialAccessToken) -> Result<()> {
        self.write()
            .initial_access_tokens
            .insert(token.token.clone(), token);
        Ok(())
    }

    async fn get_initial_access_token(&self, token: &str) -> Result<Option<InitialAccessToken>> {
        Ok(self.read().initial_access_tokens.get(token).cloned())
    }

    async fn consume_initial_access_token(&self, token: &str, client_id: &str) -> Result<bool> {
        let now = Utc::now();
        let mut state = self.write();
        match state.initial_access_tokens.get_mut(token) {
            Some(stored) if !stored.used => {
                if let Some(expires_at) = stored.expires_at {
                    if expires_at < now {
                        return Ok(false);
                    }
                }
                stored.used = true;
                stored.used_by = Some(client_id.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cleanup_expired_sessions(&self) -> Result<usize> {
        Ok(self.write().purge_expired(Utc::now()))
    }
}
