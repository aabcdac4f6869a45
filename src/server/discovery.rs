// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! OpenID Connect discovery and JWKS endpoints
//!
//! - `.well-known/openid-configuration` discovery document
//! - JWKS (JSON Web Key Set) endpoint for public key exposure
//!
//! Everything advertised here is backed by a real endpoint in this server;
//! the document is generated from the live configuration so it cannot drift.

use chrono::Utc;
use rocket::serde::json::Json;
use rocket::{get, State};
use serde::{Deserialize, Serialize};

use super::guards::ConnectionInfo;
use super::ProviderState;
use crate::crypto::jwks::export_jwk_set;
use crate::oauth::error::OAuthError;
use crate::oauth::scope::{SUPPORTED_CLAIMS, SUPPORTED_SCOPES};

/// OpenID Connect Discovery document (Discovery 1.0 §3)
#[derive(Debug, Serialize, Deserialize)]
pub struct OpenIdConfiguration {
    /// Issuer identifier the provider asserts for its tokens
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub introspection_endpoint: String,
    pub revocation_endpoint: String,
    /// Present iff dynamic client registration is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub claims_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
}

fn generate_openid_configuration(
    issuer: &str,
    base_url: &str,
    registration_enabled: bool,
) -> OpenIdConfiguration {
    OpenIdConfiguration {
        issuer: issuer.to_string(),
        authorization_endpoint: format!("{}/authorize", base_url),
        token_endpoint: format!("{}/token", base_url),
        userinfo_endpoint: format!("{}/userinfo", base_url),
        jwks_uri: format!("{}/.well-known/jwks.json", base_url),
        introspection_endpoint: format!("{}/introspect", base_url),
        revocation_endpoint: format!("{}/revoke", base_url),
        registration_endpoint: registration_enabled.then(|| format!("{}/register", base_url)),
        response_types_supported: vec![
            "code".to_string(),
            "id_token".to_string(),
            "token id_token".to_string(),
        ],
        grant_types_supported: vec![
            "authorization_code".to_string(),
            "refresh_token".to_string(),
            "implicit".to_string(),
        ],
        subject_types_supported: vec!["public".to_string(), "pairwise".to_string()],
        id_token_signing_alg_values_supported: vec!["RS256".to_string()],
        scopes_supported: SUPPORTED_SCOPES.iter().map(|s| s.to_string()).collect(),
        claims_supported: SUPPORTED_CLAIMS.iter().map(|s| s.to_string()).collect(),
        code_challenge_methods_supported: vec!["plain".to_string(), "S256".to_string()],
        token_endpoint_auth_methods_supported: vec![
            "none".to_string(),
            "client_secret_basic".to_string(),
            "client_secret_post".to_string(),
        ],
    }
}

/// OpenID Connect discovery endpoint
///
/// `GET /.well-known/openid-configuration`
#[get("/.well-known/openid-configuration")]
pub async fn openid_configuration(
    state: &State<ProviderState>,
    connection: ConnectionInfo,
) -> Json<OpenIdConfiguration> {
    let config = state.config.read().await;
    // The configured issuer is authoritative; endpoint URLs follow how the
    // client actually reached us
    Json(generate_openid_configuration(
        &state.ctx.issuer,
        &connection.base_url,
        config.registration.enabled,
    ))
}

/// JSON Web Key Set endpoint
///
/// Publishes the public half of the active signing key plus any demoted key
/// still inside its verification grace window (RFC 7517).
///
/// `GET /.well-known/jwks.json`
#[get("/.well-known/jwks.json")]
pub async fn jwks(
    state: &State<ProviderState>,
) -> Result<Json<jsonwebtoken::jwk::JwkSet>, OAuthError> {
    let keys = state
        .ctx
        .keys
        .verification_keys()
        .await
        .map_err(OAuthError::server_error)?;
    Ok(Json(export_jwk_set(&keys, Utc::now())))
}
