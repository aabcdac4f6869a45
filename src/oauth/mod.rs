// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! The OAuth 2.0 / OpenID Connect protocol engine
//!
//! This module is the core of the provider, deliberately free of HTTP
//! handler code: the Rocket routes under [`crate::server`] are thin adapters
//! that translate requests into engine calls and engine outcomes into
//! responses.
//!
//! - [`authorize`]: the `/authorize` state machine over [`AuthSession`]
//! - [`token`]: the `/token` grants (authorization_code, refresh_token)
//! - [`id_token`]: ID-token claim assembly
//! - [`client_auth`]: client authentication at protected endpoints
//! - [`registration`]: RFC 7591 metadata validation
//! - [`scope`]: scope parsing and scope-driven claim projection
//! - [`error`]: the unified error taxonomy and redirect/JSON rendering
//!
//! [`AuthSession`]: crate::storage::models::AuthSession

pub mod authorize;
pub mod client_auth;
pub mod error;
pub mod id_token;
pub mod registration;
pub mod scope;
pub mod token;

use std::sync::Arc;

use chrono::Duration;

use crate::crypto::KeyManager;
use crate::storage::SharedStorage;

/// Everything the protocol engine needs to run, shared by all endpoints
pub struct OAuthContext {
    pub storage: SharedStorage,
    pub keys: Arc<KeyManager>,
    /// Issuer identifier stamped into every ID token (`iss`)
    pub issuer: String,
    /// Lifetime of access tokens and ID tokens
    pub token_ttl: Duration,
    /// Lifetime of authorization codes (at most 10 minutes)
    pub code_ttl: Duration,
    /// Lifetime of an in-flight authorization request
    pub auth_session_ttl: Duration,
    /// Lifetime of the SSO user session
    pub user_session_ttl: Duration,
}

impl OAuthContext {
    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl.num_seconds()
    }
}
