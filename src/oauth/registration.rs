// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Dynamic client registration metadata validation (RFC 7591)
//!
//! The validator takes the raw registration document, applies the OIDC
//! registration defaults, and checks every rule in a fixed order; the first
//! violation wins. Redirect-URI problems surface as `invalid_redirect_uri`,
//! everything else as `invalid_client_metadata`.

use chrono::Utc;
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use super::error::OAuthError;
use crate::crypto::random::opaque_token;
use crate::storage::models::{
    ApplicationType, Client, SubjectType, TokenEndpointAuthMethod,
};

/// Client metadata as submitted to `POST /register` (RFC 7591 §2)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientMetadata {
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    pub response_types: Option<Vec<String>>,
    pub grant_types: Option<Vec<String>>,
    pub application_type: Option<String>,
    pub subject_type: Option<String>,
    pub token_endpoint_auth_method: Option<String>,
    pub scope: Option<String>,
    pub id_token_signed_response_alg: Option<String>,
    pub jwks: Option<serde_json::Value>,
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub contacts: Vec<String>,
    pub client_name: Option<String>,
    pub client_uri: Option<String>,
    pub logo_uri: Option<String>,
    pub policy_uri: Option<String>,
    pub tos_uri: Option<String>,
    pub default_max_age: Option<i64>,
    pub require_auth_time: Option<bool>,
}

fn is_localhost(url: &Url) -> bool {
    matches!(url.host_str(), Some("localhost") | Some("127.0.0.1") | Some("[::1]"))
}

fn validate_redirect_uri(raw: &str, application_type: ApplicationType) -> Result<(), OAuthError> {
    let url = Url::parse(raw)
        .map_err(|_| OAuthError::invalid_redirect_uri(format!("{} is not absolute", raw)))?;
    if url.fragment().is_some() {
        return Err(OAuthError::invalid_redirect_uri(format!(
            "{} must not carry a fragment",
            raw
        )));
    }
    match application_type {
        ApplicationType::Web => {
            // Web clients redirect over https; localhost is the dev exception
            if url.scheme() != "https" && !(url.scheme() == "http" && is_localhost(&url)) {
                return Err(OAuthError::invalid_redirect_uri(format!(
                    "{} must use https for web clients",
                    raw
                )));
            }
        }
        ApplicationType::Native => {
            // Native clients may use loopback http or a custom scheme;
            // non-loopback plain http stays forbidden
            if url.scheme() == "http" && !is_localhost(&url) {
                return Err(OAuthError::invalid_redirect_uri(format!(
                    "{} is not a native redirect (loopback or custom scheme)",
                    raw
                )));
            }
        }
    }
    Ok(())
}

fn validate_absolute_uri(raw: &str, field: &str) -> Result<(), OAuthError> {
    Url::parse(raw)
        .map(|_| ())
        .map_err(|_| OAuthError::invalid_client_metadata(format!("{} must be an absolute URI", field)))
}

/// Validates a registration document and materializes the client record.
///
/// Confidentiality is decided here: any auth method other than `none` earns
/// a generated secret. Every client gets a registration access token for the
/// RFC 7592 management endpoints.
pub fn validate_and_build_client(metadata: ClientMetadata) -> Result<Client, OAuthError> {
    if metadata.redirect_uris.is_empty() {
        return Err(OAuthError::invalid_redirect_uri(
            "At least one redirect_uri is required",
        ));
    }

    let application_type = match metadata.application_type.as_deref() {
        None | Some("web") => ApplicationType::Web,
        Some("native") => ApplicationType::Native,
        Some(other) => {
            return Err(OAuthError::invalid_client_metadata(format!(
                "application_type {} is not supported",
                other
            )))
        }
    };

    for uri in &metadata.redirect_uris {
        validate_redirect_uri(uri, application_type)?;
    }

    let subject_type = match metadata.subject_type.as_deref() {
        None | Some("public") => SubjectType::Public,
        Some("pairwise") => SubjectType::Pairwise,
        Some(other) => {
            return Err(OAuthError::invalid_client_metadata(format!(
                "subject_type {} is not supported",
                other
            )))
        }
    };

    let response_types = metadata
        .response_types
        .unwrap_or_else(|| vec!["code".to_string()]);
    let grant_types = metadata
        .grant_types
        .unwrap_or_else(|| vec!["authorization_code".to_string()]);

    // Grant/response-type consistency (RFC 7591 §2, OIDC Registration §2)
    for response_type in &response_types {
        let tokens: Vec<&str> = response_type.split_whitespace().collect();
        if tokens.contains(&"code") && !grant_types.iter().any(|g| g == "authorization_code") {
            return Err(OAuthError::invalid_client_metadata(
                "response_type code requires the authorization_code grant",
            ));
        }
        if (tokens.contains(&"token") || tokens.contains(&"id_token"))
            && !grant_types.iter().any(|g| g == "implicit")
        {
            return Err(OAuthError::invalid_client_metadata(
                "implicit response_types require the implicit grant",
            ));
        }
    }

    let token_endpoint_auth_method = match metadata.token_endpoint_auth_method.as_deref() {
        None | Some("client_secret_basic") => TokenEndpointAuthMethod::ClientSecretBasic,
        Some("client_secret_post") => TokenEndpointAuthMethod::ClientSecretPost,
        Some("none") => TokenEndpointAuthMethod::None,
        Some(other) => {
            return Err(OAuthError::invalid_client_metadata(format!(
                "token_endpoint_auth_method {} is not supported",
                other
            )))
        }
    };

    // A client that never authenticates must not hold grants that redeem
    // credentials at the token endpoint
    if token_endpoint_auth_method == TokenEndpointAuthMethod::None
        && grant_types.iter().any(|g| g != "implicit")
    {
        return Err(OAuthError::invalid_client_metadata(
            "token_endpoint_auth_method none permits only the implicit grant",
        ));
    }

    if metadata.jwks.is_some() && metadata.jwks_uri.is_some() {
        return Err(OAuthError::invalid_client_metadata(
            "jwks and jwks_uri are mutually exclusive",
        ));
    }
    if let Some(jwks) = &metadata.jwks {
        serde_json::from_value::<jsonwebtoken::jwk::JwkSet>(jwks.clone()).map_err(|_| {
            OAuthError::invalid_client_metadata("jwks does not parse as a JWK set")
        })?;
    }
    if let Some(jwks_uri) = &metadata.jwks_uri {
        validate_absolute_uri(jwks_uri, "jwks_uri")?;
    }
    for (value, field) in [
        (&metadata.client_uri, "client_uri"),
        (&metadata.logo_uri, "logo_uri"),
        (&metadata.policy_uri, "policy_uri"),
        (&metadata.tos_uri, "tos_uri"),
    ] {
        if let Some(value) = value {
            validate_absolute_uri(value, field)?;
        }
    }

    let id_token_signed_response_alg = metadata
        .id_token_signed_response_alg
        .unwrap_or_else(|| "RS256".to_string());
    if id_token_signed_response_alg != "RS256" {
        return Err(OAuthError::invalid_client_metadata(
            "Only RS256 ID token signing is supported",
        ));
    }

    // auth_method != none decides confidentiality
    let secret = match token_endpoint_auth_method {
        TokenEndpointAuthMethod::None => None,
        _ => Some(opaque_token()),
    };

    let now = Utc::now();
    Ok(Client {
        id: Uuid::new_v4().to_string(),
        secret,
        secret_expires_at: 0,
        redirect_uris: metadata.redirect_uris,
        grant_types,
        response_types,
        scope: metadata
            .scope
            .unwrap_or_else(|| "openid profile email".to_string()),
        application_type,
        token_endpoint_auth_method,
        subject_type,
        id_token_signed_response_alg,
        jwks: metadata.jwks,
        jwks_uri: metadata.jwks_uri,
        contacts: metadata.contacts,
        client_name: metadata.client_name,
        client_uri: metadata.client_uri,
        logo_uri: metadata.logo_uri,
        policy_uri: metadata.policy_uri,
        tos_uri: metadata.tos_uri,
        default_max_age: metadata.default_max_age,
        require_auth_time: metadata.require_auth_time.unwrap_or(false),
        registration_access_token: Some(opaque_token()),
        client_id_issued_at: now,
        created_at: now,
        updated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(overrides: impl FnOnce(&mut ClientMetadata)) -> ClientMetadata {
        let mut meta = ClientMetadata {
            redirect_uris: vec!["https://app.example/cb".to_string()],
            client_name: Some("Test App".to_string()),
            ..Default::default()
        };
        overrides(&mut meta);
        meta
    }

    #[test]
    fn minimal_web_registration_gets_defaults_and_secret() {
        let client = validate_and_build_client(metadata(|_| {})).unwrap();
        assert_eq!(client.response_types, vec!["code"]);
        assert_eq!(client.grant_types, vec!["authorization_code"]);
        assert_eq!(client.application_type, ApplicationType::Web);
        assert_eq!(client.subject_type, SubjectType::Public);
        assert_eq!(
            client.token_endpoint_auth_method,
            TokenEndpointAuthMethod::ClientSecretBasic
        );
        assert!(client.secret.is_some());
        assert!(client.registration_access_token.is_some());
        assert_eq!(client.id_token_signed_response_alg, "RS256");
        // client_id is a fresh UUID
        assert!(Uuid::parse_str(&client.id).is_ok());
    }

    #[test]
    fn missing_redirect_uris_fail() {
        let err = validate_and_build_client(metadata(|m| m.redirect_uris.clear())).unwrap_err();
        assert_eq!(err.code, "invalid_redirect_uri");
    }

    #[test]
    fn web_client_requires_https() {
        let err = validate_and_build_client(metadata(|m| {
            m.redirect_uris = vec!["http://app.example/cb".to_string()]
        }))
        .unwrap_err();
        assert_eq!(err.code, "invalid_redirect_uri");

        // localhost is the development exception
        assert!(validate_and_build_client(metadata(|m| {
            m.redirect_uris = vec!["http://localhost:3000/cb".to_string()]
        }))
        .is_ok());
    }

    #[test]
    fn fragments_are_refused() {
        let err = validate_and_build_client(metadata(|m| {
            m.redirect_uris = vec!["https://app.example/cb#frag".to_string()]
        }))
        .unwrap_err();
        assert_eq!(err.code, "invalid_redirect_uri");
    }

    #[test]
    fn native_clients_take_custom_schemes() {
        let client = validate_and_build_client(metadata(|m| {
            m.application_type = Some("native".to_string());
            m.redirect_uris = vec!["com.example.app:/oauth".to_string()];
        }))
        .unwrap();
        assert_eq!(client.application_type, ApplicationType::Native);
    }

    #[test]
    fn grant_response_consistency_is_enforced() {
        let err = validate_and_build_client(metadata(|m| {
            m.response_types = Some(vec!["id_token".to_string()]);
            m.grant_types = Some(vec!["authorization_code".to_string()]);
        }))
        .unwrap_err();
        assert_eq!(err.code, "invalid_client_metadata");
    }

    #[test]
    fn public_clients_are_implicit_only_and_secretless() {
        let client = validate_and_build_client(metadata(|m| {
            m.token_endpoint_auth_method = Some("none".to_string());
            m.response_types = Some(vec!["id_token".to_string()]);
            m.grant_types = Some(vec!["implicit".to_string()]);
        }))
        .unwrap();
        assert!(client.secret.is_none());

        let err = validate_and_build_client(metadata(|m| {
            m.token_endpoint_auth_method = Some("none".to_string());
        }))
        .unwrap_err();
        assert_eq!(err.code, "invalid_client_metadata");
    }

    #[test]
    fn jwks_and_jwks_uri_are_exclusive() {
        let err = validate_and_build_client(metadata(|m| {
            m.jwks = Some(serde_json::json!({"keys": []}));
            m.jwks_uri = Some("https://app.example/jwks.json".to_string());
        }))
        .unwrap_err();
        assert_eq!(err.code, "invalid_client_metadata");
    }

    #[test]
    fn malformed_jwks_is_refused() {
        let err = validate_and_build_client(metadata(|m| {
            m.jwks = Some(serde_json::json!({"keys": "not-an-array"}));
        }))
        .unwrap_err();
        assert_eq!(err.code, "invalid_client_metadata");
    }

    #[test]
    fn unsupported_signing_alg_is_refused() {
        let err = validate_and_build_client(metadata(|m| {
            m.id_token_signed_response_alg = Some("HS256".to_string());
        }))
        .unwrap_err();
        assert_eq!(err.code, "invalid_client_metadata");
    }

    #[test]
    fn relative_metadata_uris_are_refused() {
        let err = validate_and_build_client(metadata(|m| {
            m.policy_uri = Some("/policy".to_string());
        }))
        .unwrap_err();
        assert_eq!(err.code, "invalid_client_metadata");
    }
}
