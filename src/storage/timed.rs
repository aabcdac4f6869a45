// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Per-call timeout wrapper around any storage backend
//!
//! Every storage call made by a request handler runs under a bounded timeout
//! (default 5 s); a call that does not come back in time surfaces
//! [`StorageError::Timeout`], which the endpoint layer renders as
//! `server_error`. Dropping the timed-out future cancels the underlying call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::*;
use super::{CodeConsumption, Result, Storage, StorageError};

pub struct TimedStorage {
    inner: Arc<dyn Storage>,
    limit: Duration,
}

impl TimedStorage {
    pub fn new(inner: Arc<dyn Storage>, limit: Duration) -> Self {
        TimedStorage { inner, limit }
    }
}

macro_rules! timed {
    ($self:ident, $call:expr) => {
        match tokio::time::timeout($self.limit, $call).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout),
        }
    };
}

#[async_trait]
impl Storage for TimedStorage {
    async fn create_user(&self, user: User) -> Result<()> {
        timed!(self, self.inner.create_user(user))
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        timed!(self, self.inner.get_user(id))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        timed!(self, self.inner.get_user_by_username(username))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        timed!(self, self.inner.get_user_by_email(email))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        timed!(self, self.inner.list_users())
    }

    async fn update_user(&self, user: User) -> Result<()> {
        timed!(self, self.inner.update_user(user))
    }

    async fn delete_user(&self, id: &str) -> Result<bool> {
        timed!(self, self.inner.delete_user(id))
    }

    async fn create_client(&self, client: Client) -> Result<()> {
        timed!(self, self.inner.create_client(client))
    }

    async fn get_client(&self, id: &str) -> Result<Option<Client>> {
        timed!(self, self.inner.get_client(id))
    }

    async fn list_clients(&self) -> Result<Vec<Client>> {
        timed!(self, self.inner.list_clients())
    }

    async fn update_client(&self, client: Client) -> Result<()> {
        timed!(self, self.inner.update_client(client))
    }

    async fn delete_client(&self, id: &str) -> Result<bool> {
        timed!(self, self.inner.delete_client(id))
    }

    async fn put_authorization_code(&self, code: AuthorizationCode) -> Result<()> {
        timed!(self, self.inner.put_authorization_code(code))
    }

    async fn get_authorization_code(&self, code: &str) -> Result<Option<AuthorizationCode>> {
        timed!(self, self.inner.get_authorization_code(code))
    }

    async fn consume_authorization_code(&self, code: &str) -> Result<Option<CodeConsumption>> {
        timed!(self, self.inner.consume_authorization_code(code))
    }

    async fn delete_authorization_code(&self, code: &str) -> Result<bool> {
        timed!(self, self.inner.delete_authorization_code(code))
    }

    async fn put_token(&self, token: Token) -> Result<()> {
        timed!(self, self.inner.put_token(token))
    }

    async fn get_token(&self, id: &str) -> Result<Option<Token>> {
        timed!(self, self.inner.get_token(id))
    }

    async fn get_token_by_access(&self, access_token: &str) -> Result<Option<Token>> {
        timed!(self, self.inner.get_token_by_access(access_token))
    }

    async fn get_token_by_refresh(&self, refresh_token: &str) -> Result<Option<Token>> {
        timed!(self, self.inner.get_token_by_refresh(refresh_token))
    }

    async fn take_token_by_refresh(&self, refresh_token: &str) -> Result<Option<Token>> {
        timed!(self, self.inner.take_token_by_refresh(refresh_token))
    }

    async fn list_tokens_by_auth_code(&self, auth_code_id: &str) -> Result<Vec<Token>> {
        timed!(self, self.inner.list_tokens_by_auth_code(auth_code_id))
    }

    async fn delete_token(&self, id: &str) -> Result<bool> {
        timed!(self, self.inner.delete_token(id))
    }

    async fn revoke_tokens_by_auth_code(&self, auth_code_id: &str) -> Result<usize> {
        timed!(self, self.inner.revoke_tokens_by_auth_code(auth_code_id))
    }

    async fn put_auth_session(&self, session: AuthSession) -> Result<()> {
        timed!(self, self.inner.put_auth_session(session))
    }

    async fn get_auth_session(&self, id: &str) -> Result<Option<AuthSession>> {
        timed!(self, self.inner.get_auth_session(id))
    }

    async fn update_auth_session(&self, session: AuthSession) -> Result<()> {
        timed!(self, self.inner.update_auth_session(session))
    }

    async fn delete_auth_session(&self, id: &str) -> Result<bool> {
        timed!(self, self.inner.delete_auth_session(id))
    }

    async fn put_user_session(&self, session: UserSession) -> Result<()> {
        timed!(self, self.inner.put_user_session(session))
    }

    async fn get_user_session(&self, id: &str) -> Result<Option<UserSession>> {
        timed!(self, self.inner.get_user_session(id))
    }

    async fn update_user_session(&self, session: UserSession) -> Result<()> {
        timed!(self, self.inner.update_user_session(session))
    }

    async fn delete_user_session(&self, id: &str) -> Result<bool> {
        timed!(self, self.inner.delete_user_session(id))
    }

    async fn latest_user_session(&self, user_id: &str) -> Result<Option<UserSession>> {
        timed!(self, self.inner.latest_user_session(user_id))
    }

    async fn upsert_consent(&self, consent: Consent) -> Result<()> {
        timed!(self, self.inner.upsert_consent(consent))
    }

    async fn get_consent(&self, user_id: &str, client_id: &str) -> Result<Option<Consent>> {
        timed!(self, self.inner.get_consent(user_id, client_id))
    }

    async fn delete_consent(&self, user_id: &str, client_id: &str) -> Result<bool> {
        timed!(self, self.inner.delete_consent(user_id, client_id))
    }

    async fn put_signing_key(&self, key: SigningKey) -> Result<()> {
        timed!(self, self.inner.put_signing_key(key))
    }

    async fn get_signing_key_by_kid(&self, kid: &str) -> Result<Option<SigningKey>> {
        timed!(self, self.inner.get_signing_key_by_kid(kid))
    }

    async fn list_signing_keys(&self) -> Result<Vec<SigningKey>> {
        timed!(self, self.inner.list_signing_keys())
    }

    async fn activate_signing_key(
        &self,
        new_key: SigningKey,
        previous_expires_at: DateTime<Utc>,
    ) -> Result<()> {
        timed!(
            self,
            self.inner.activate_signing_key(new_key, previous_expires_at)
        )
    }

    async fn put_initial_access_token(&self, token: InitialAccessToken) -> Result<()> {
        timed!(self, self.inner.put_initial_access_token(token))
    }

    async fn get_initial_access_token(&self, token: &str) -> Result<Option<InitialAccessToken>> {
        timed!(self, self.inner.get_initial_access_token(token))
    }

    async fn consume_initial_access_token(&self, token: &str, client_id: &str) -> Result<bool> {
        timed!(self, self.inner.consume_initial_access_token(token, client_id))
    }

    async fn cleanup_expired_sessions(&self) -> Result<usize> {
        timed!(self, self.inner.cleanup_expired_sessions())
    }
}
