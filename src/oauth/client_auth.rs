// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Client authentication at the token, introspection and revocation endpoints
//!
//! A client's `token_endpoint_auth_method` is resolved once, when the client
//! record is loaded, into the [`ClientAuthMethod`] variant; the per-request
//! check is then a single match. Secrets are compared constant-time.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use log::debug;

use super::error::OAuthError;
use crate::crypto::pkce::constant_time_eq;
use crate::storage::models::{Client, TokenEndpointAuthMethod};
use crate::storage::{SharedStorage, Storage};

/// Client authentication scheme, resolved from the stored client record
#[derive(Debug, Clone)]
pub enum ClientAuthMethod {
    /// Public client: identified by `client_id` alone, no secret to present
    None,
    /// Confidential client using the HTTP Basic scheme
    Basic { secret: String },
    /// Confidential client passing its secret in the form body
    PostBody { secret: String },
}

impl ClientAuthMethod {
    pub fn resolve(client: &Client) -> Self {
        match (client.token_endpoint_auth_method, &client.secret) {
            (TokenEndpointAuthMethod::None, _) | (_, None) => ClientAuthMethod::None,
            (TokenEndpointAuthMethod::ClientSecretBasic, Some(secret)) => ClientAuthMethod::Basic {
                secret: secret.clone(),
            },
            (TokenEndpointAuthMethod::ClientSecretPost, Some(secret)) => {
                ClientAuthMethod::PostBody {
                    secret: secret.clone(),
                }
            }
        }
    }
}

/// Raw credentials as presented by the request, before any verification
#[derive(Debug, Clone, Default)]
pub struct ClientCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// True when the credentials came from an `Authorization: Basic` header
    pub via_basic: bool,
}

impl ClientCredentials {
    /// Parses an `Authorization: Basic` header value
    pub fn from_basic_header(header: &str) -> Option<Self> {
        let encoded = header.strip_prefix("Basic ")?;
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (id, secret) = decoded.split_once(':')?;
        Some(ClientCredentials {
            client_id: Some(id.to_string()),
            client_secret: Some(secret.to_string()),
            via_basic: true,
        })
    }

    /// Combines header credentials with form-body credentials; the header
    /// wins when both are present (RFC 6749 §2.3.1 forbids mixing, we treat
    /// the header as authoritative).
    pub fn merged(
        basic: Option<ClientCredentials>,
        form_id: Option<String>,
        form_secret: Option<String>,
    ) -> Self {
        match basic {
            Some(creds) => creds,
            None => ClientCredentials {
                client_id: form_id,
                client_secret: form_secret,
                via_basic: false,
            },
        }
    }
}

fn secret_matches(presented: &str, stored: &str, expires_at: i64) -> bool {
    if expires_at != 0 && expires_at < Utc::now().timestamp() {
        return false;
    }
    constant_time_eq(presented.as_bytes(), stored.as_bytes())
}

/// Authenticates a client for the token, introspection and revocation
/// endpoints.
///
/// Public clients (`token_endpoint_auth_method = none`) authenticate by
/// `client_id` alone; the code they redeem must then be PKCE-bound, which the
/// token engine enforces. Every failure maps to `invalid_client` (401).
pub async fn authenticate_client(
    storage: &SharedStorage,
    credentials: &ClientCredentials,
) -> Result<Client, OAuthError> {
    let client_id = credentials
        .client_id
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_client("Missing client authentication"))?;

    let client = storage
        .get_client(client_id)
        .await?
        .ok_or_else(|| OAuthError::invalid_client("Unknown client"))?;

    match ClientAuthMethod::resolve(&client) {
        ClientAuthMethod::None => {
            debug!("Public client {} authenticated by identifier", client_id);
            Ok(client)
        }
        ClientAuthMethod::Basic { secret } => {
            if !credentials.via_basic {
                return Err(OAuthError::invalid_client(
                    "Client must authenticate with the Basic scheme",
                ));
            }
            match credentials.client_secret.as_deref() {
                Some(presented) if secret_matches(presented, &secret, client.secret_expires_at) => {
                    Ok(client)
                }
                _ => Err(OAuthError::invalid_client("Client authentication failed")),
            }
        }
        ClientAuthMethod::PostBody { secret } => match credentials.client_secret.as_deref() {
            Some(presented) if secret_matches(presented, &secret, client.secret_expires_at) => {
                Ok(client)
            }
            _ => Err(OAuthError::invalid_client("Client authentication failed")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{ApplicationType, SubjectType};
    use crate::storage::{MemoryStorage, Storage};
    use std::sync::Arc;

    fn confidential_client(id: &str, secret: &str, method: TokenEndpointAuthMethod) -> Client {
        let now = Utc::now();
        Client {
            id: id.to_string(),
            secret: Some(secret.to_string()),
            secret_expires_at: 0,
            redirect_uris: vec!["https://app.example/cb".to_string()],
            grant_types: vec!["authorization_code".to_string()],
            response_types: vec!["code".to_string()],
            scope: "openid profile".to_string(),
            application_type: ApplicationType::Web,
            token_endpoint_auth_method: method,
            subject_type: SubjectType::Public,
            id_token_signed_response_alg: "RS256".to_string(),
            jwks: None,
            jwks_uri: None,
            contacts: vec![],
            client_name: None,
            client_uri: None,
            logo_uri: None,
            policy_uri: None,
            tos_uri: None,
            default_max_age: None,
            require_auth_time: false,
            registration_access_token: None,
            client_id_issued_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    async fn store_with(client: Client) -> SharedStorage {
        let storage = MemoryStorage::new();
        storage.create_client(client).await.unwrap();
        Arc::new(storage)
    }

    #[tokio::test]
    async fn basic_credentials_authenticate() {
        let storage = store_with(confidential_client(
            "web-app",
            "s3cret",
            TokenEndpointAuthMethod::ClientSecretBasic,
        ))
        .await;

        let header = format!("Basic {}", STANDARD.encode("web-app:s3cret"));
        let creds = ClientCredentials::from_basic_header(&header).unwrap();
        let client = authenticate_client(&storage, &creds).await.unwrap();
        assert_eq!(client.id, "web-app");
    }

    #[tokio::test]
    async fn wrong_secret_is_invalid_client() {
        let storage = store_with(confidential_client(
            "web-app",
            "s3cret",
            TokenEndpointAuthMethod::ClientSecretBasic,
        ))
        .await;

        let header = format!("Basic {}", STANDARD.encode("web-app:wrong"));
        let creds = ClientCredentials::from_basic_header(&header).unwrap();
        let err = authenticate_client(&storage, &creds).await.unwrap_err();
        assert_eq!(err.code, "invalid_client");
        assert_eq!(err.status.code, 401);
        assert!(err.www_authenticate.is_some());
    }

    #[tokio::test]
    async fn post_body_credentials_authenticate() {
        let storage = store_with(confidential_client(
            "web-app",
            "s3cret",
            TokenEndpointAuthMethod::ClientSecretPost,
        ))
        .await;

        let creds = ClientCredentials::merged(
            None,
            Some("web-app".to_string()),
            Some("s3cret".to_string()),
        );
        assert!(authenticate_client(&storage, &creds).await.is_ok());
    }

    #[tokio::test]
    async fn expired_secret_is_rejected() {
        let mut client = confidential_client(
            "web-app",
            "s3cret",
            TokenEndpointAuthMethod::ClientSecretPost,
        );
        client.secret_expires_at = Utc::now().timestamp() - 60;
        let storage = store_with(client).await;

        let creds = ClientCredentials::merged(
            None,
            Some("web-app".to_string()),
            Some("s3cret".to_string()),
        );
        assert!(authenticate_client(&storage, &creds).await.is_err());
    }
}
