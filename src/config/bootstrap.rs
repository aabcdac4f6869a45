// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Bootstrap seed: users, clients and initial access tokens created on
//! startup when absent from storage
//!
//! The setup wizard is an external collaborator; this section is what lets a
//! fresh deployment come up with a usable admin account and a first relying
//! party without it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::models::{
    ApplicationType, Client, SubjectType, TokenEndpointAuthMethod, User, UserRole,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub users: Vec<BootstrapUser>,
    #[serde(default)]
    pub clients: Vec<BootstrapClient>,
    /// Pre-provisioned single-use registration tokens
    #[serde(default)]
    pub initial_access_tokens: Vec<String>,
}

/// A user to seed at startup
///
/// Either `password_hash` (Unix crypt format) or `password` (plaintext,
/// hashed at seed time; acceptable for development configs only) must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapUser {
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_role")]
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

fn default_role() -> UserRole {
    UserRole::User
}

impl BootstrapUser {
    /// Materializes the user record, hashing a plaintext password if no hash
    /// was configured
    pub fn into_user(self) -> anyhow::Result<User> {
        let password_hash = match (self.password_hash, self.password) {
            (Some(hash), _) => hash,
            (None, Some(plain)) => pwhash::bcrypt::hash(plain)
                .map_err(|e| anyhow::anyhow!("hashing bootstrap password: {}", e))?,
            (None, None) => anyhow::bail!(
                "bootstrap user {} needs password_hash or password",
                self.username
            ),
        };
        let mut user = User::new(
            Uuid::new_v4().to_string(),
            self.username,
            self.email,
            password_hash,
            self.role,
        );
        user.name = self.name;
        user.email_verified = self.email_verified;
        Ok(user)
    }
}

/// A relying party to seed at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapClient {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub redirect_uris: Vec<String>,
    #[serde(default = "default_grant_types")]
    pub grant_types: Vec<String>,
    #[serde(default = "default_response_types")]
    pub response_types: Vec<String>,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_application_type")]
    pub application_type: ApplicationType,
    #[serde(default = "default_auth_method")]
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_max_age: Option<i64>,
    #[serde(default)]
    pub require_auth_time: bool,
}

fn default_grant_types() -> Vec<String> {
    vec![
        "authorization_code".to_string(),
        "refresh_token".to_string(),
    ]
}

fn default_response_types() -> Vec<String> {
    vec!["code".to_string()]
}

fn default_scope() -> String {
    "openid profile email".to_string()
}

fn default_application_type() -> ApplicationType {
    ApplicationType::Web
}

fn default_auth_method() -> TokenEndpointAuthMethod {
    TokenEndpointAuthMethod::ClientSecretBasic
}

impl BootstrapClient {
    pub fn into_client(self) -> Client {
        let now = Utc::now();
        Client {
            id: self.client_id,
            secret: self.secret,
            secret_expires_at: 0,
            redirect_uris: self.redirect_uris,
            grant_types: self.grant_types,
            response_types: self.response_types,
            scope: self.scope,
            application_type: self.application_type,
            token_endpoint_auth_method: self.token_endpoint_auth_method,
            subject_type: SubjectType::Public,
            id_token_signed_response_alg: "RS256".to_string(),
            jwks: None,
            jwks_uri: None,
            contacts: vec![],
            client_name: self.client_name,
            client_uri: None,
            logo_uri: None,
            policy_uri: None,
            tos_uri: None,
            default_max_age: self.default_max_age,
            require_auth_time: self.require_auth_time,
            registration_access_token: None,
            client_id_issued_at: now,
            created_at: now,
            updated_at: now,
        }
    }
}
