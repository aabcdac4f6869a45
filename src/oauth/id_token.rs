// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! ID token claim assembly
//!
//! The ID token is the signed identity assertion of the provider. Required
//! claims are always present (`iss`, `sub`, `aud`, `exp`, `iat`); the
//! conditional ones follow OIDC Core: `nonce` echoes the request verbatim,
//! `auth_time` appears whenever the authentication instant is known,
//! `at_hash`/`c_hash` bind the token to an accompanying access
//! token or authorization code. Scope-filtered profile claims come from
//! [`crate::oauth::scope::user_claims_for_scopes`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::scope::user_claims_for_scopes;
use crate::crypto::jwt::{left_half_hash, sign_with_key, JwtError};
use crate::storage::models::{SigningKey, User};

/// Claims of an OpenID Connect ID token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amr: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_hash: Option<String>,
    /// Scope-filtered user claims (profile, email, address, phone)
    #[serde(flatten)]
    pub additional_claims: Map<String, Value>,
}

/// Inputs for one ID token
pub struct IdTokenParams<'a> {
    pub issuer: &'a str,
    pub client_id: &'a str,
    pub user: &'a User,
    pub scopes: &'a [String],
    pub nonce: Option<&'a str>,
    /// Authentication instant from the user session; `None` omits the claim
    pub auth_time: Option<DateTime<Utc>>,
    pub acr: Option<&'a str>,
    pub amr: &'a [String],
    /// Access token issued alongside, drives `at_hash`
    pub access_token: Option<&'a str>,
    /// Authorization code issued alongside (hybrid flow), drives `c_hash`
    pub authorization_code: Option<&'a str>,
    pub ttl: Duration,
}

/// Assembles the claim set for an ID token
pub fn build_id_token_claims(params: &IdTokenParams<'_>) -> IdTokenClaims {
    let now = Utc::now();
    let mut additional_claims = user_claims_for_scopes(params.user, params.scopes);
    // `sub` is a top-level claim here, not part of the flattened map
    additional_claims.remove("sub");

    IdTokenClaims {
        iss: params.issuer.to_string(),
        sub: params.user.id.clone(),
        aud: params.client_id.to_string(),
        exp: (now + params.ttl).timestamp(),
        iat: now.timestamp(),
        auth_time: params.auth_time.map(|t| t.timestamp()),
        nonce: params.nonce.map(str::to_string),
        acr: params.acr.map(str::to_string),
        amr: if params.amr.is_empty() {
            None
        } else {
            Some(params.amr.to_vec())
        },
        azp: None,
        at_hash: params.access_token.map(left_half_hash),
        c_hash: params.authorization_code.map(left_half_hash),
        additional_claims,
    }
}

/// Builds and signs an ID token with the given signing key
pub fn generate_id_token(
    params: &IdTokenParams<'_>,
    key: &SigningKey,
) -> Result<String, JwtError> {
    let claims = build_id_token_claims(params);
    sign_with_key(&claims, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::jwt::verify_with_key;
    use crate::crypto::keys::generate_rsa_keypair;
    use crate::storage::models::UserRole;

    fn signing_key() -> SigningKey {
        let pair = generate_rsa_keypair(2048).unwrap();
        SigningKey {
            id: pair.kid.clone(),
            kid: pair.kid.clone(),
            algorithm: "RS256".to_string(),
            private_pem: pair.private_pem,
            public_pem: pair.public_pem,
            is_active: true,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    fn user() -> User {
        let mut user = User::new("u1", "alice", "alice@example.org", "$2b$10$hash", UserRole::User);
        user.name = Some("Alice Example".to_string());
        user.email_verified = true;
        user
    }

    fn base_params<'a>(user: &'a User, scopes: &'a [String]) -> IdTokenParams<'a> {
        IdTokenParams {
            issuer: "https://op.example",
            client_id: "client-1",
            user,
            scopes,
            nonce: Some("n-0S6_WzA2Mj"),
            auth_time: Some(Utc::now()),
            acr: Some("urn:mace:incommon:iap:silver"),
            amr: &[],
            access_token: None,
            authorization_code: None,
            ttl: Duration::minutes(60),
        }
    }

    #[test]
    fn nonce_round_trips_verbatim() {
        let user = user();
        let scopes = vec!["openid".to_string()];
        let claims = build_id_token_claims(&base_params(&user, &scopes));
        assert_eq!(claims.nonce.as_deref(), Some("n-0S6_WzA2Mj"));
        assert_eq!(claims.iss, "https://op.example");
        assert_eq!(claims.aud, "client-1");
        assert_eq!(claims.sub, "u1");
    }

    #[test]
    fn at_hash_is_left_half_of_sha256() {
        let user = user();
        let scopes = vec!["openid".to_string()];
        let mut params = base_params(&user, &scopes);
        params.access_token = Some("an-access-token");
        let claims = build_id_token_claims(&params);
        assert_eq!(
            claims.at_hash.as_deref(),
            Some(left_half_hash("an-access-token").as_str())
        );
        assert!(claims.c_hash.is_none());
    }

    #[test]
    fn profile_scope_lands_in_the_token() {
        let user = user();
        let scopes = vec!["openid".to_string(), "profile".to_string(), "email".to_string()];
        let claims = build_id_token_claims(&base_params(&user, &scopes));
        assert_eq!(claims.additional_claims["name"], "Alice Example");
        assert_eq!(claims.additional_claims["email_verified"], true);
        // sub only appears once, at the top level
        assert!(!claims.additional_claims.contains_key("sub"));
    }

    #[test]
    fn signed_token_verifies_and_carries_claims() {
        let key = signing_key();
        let user = user();
        let scopes = vec!["openid".to_string()];
        let token = generate_id_token(&base_params(&user, &scopes), &key).unwrap();

        let decoded: IdTokenClaims = verify_with_key(&token, &key).unwrap();
        assert_eq!(decoded.sub, "u1");
        assert_eq!(decoded.nonce.as_deref(), Some("n-0S6_WzA2Mj"));
    }
}
