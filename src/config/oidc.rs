// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Protocol-level settings of the OpenID Provider

use serde::{Deserialize, Serialize};

/// Token, code and session lifetimes plus signing-key policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    /// Issuer identifier, the `iss` of every ID token. Should be the https
    /// base URL clients reach the provider under.
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Access token and ID token lifetime in minutes
    #[serde(default = "default_token_expiry_minutes")]
    pub token_expiry_minutes: i64,

    /// Authorization code lifetime in seconds, capped at 600
    #[serde(default = "default_code_expiry_seconds")]
    pub code_expiry_seconds: i64,

    /// Auth session (in-flight authorization request) lifetime in seconds
    #[serde(default = "default_auth_session_expiry_seconds")]
    pub auth_session_expiry_seconds: i64,

    /// SSO user session lifetime in hours
    #[serde(default = "default_user_session_expiry_hours")]
    pub user_session_expiry_hours: i64,

    /// RSA modulus size for generated signing keys
    #[serde(default = "default_rsa_key_bits")]
    pub rsa_key_bits: usize,

    /// Days a demoted signing key keeps verifying tokens after rotation
    #[serde(default = "default_key_rotation_grace_days")]
    pub key_rotation_grace_days: i64,

    /// Per-request storage call timeout in seconds
    #[serde(default = "default_storage_timeout_seconds")]
    pub storage_timeout_seconds: u64,
}

fn default_issuer() -> String {
    "http://localhost:8080".to_string()
}

fn default_token_expiry_minutes() -> i64 {
    60
}

fn default_code_expiry_seconds() -> i64 {
    600
}

fn default_auth_session_expiry_seconds() -> i64 {
    600
}

fn default_user_session_expiry_hours() -> i64 {
    24
}

fn default_rsa_key_bits() -> usize {
    4096
}

fn default_key_rotation_grace_days() -> i64 {
    30
}

fn default_storage_timeout_seconds() -> u64 {
    5
}

impl Default for OidcConfig {
    fn default() -> Self {
        OidcConfig {
            issuer: default_issuer(),
            token_expiry_minutes: default_token_expiry_minutes(),
            code_expiry_seconds: default_code_expiry_seconds(),
            auth_session_expiry_seconds: default_auth_session_expiry_seconds(),
            user_session_expiry_hours: default_user_session_expiry_hours(),
            rsa_key_bits: default_rsa_key_bits(),
            key_rotation_grace_days: default_key_rotation_grace_days(),
            storage_timeout_seconds: default_storage_timeout_seconds(),
        }
    }
}
