// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! The `/token` endpoint grants
//!
//! Two grants are implemented: `authorization_code` and `refresh_token`.
//! The security-critical parts live in the storage layer's linearizable
//! primitives and are only orchestrated here:
//!
//! - a code is marked used via compare-and-swap *before* any token is
//!   minted, so of two concurrent exchanges exactly one succeeds
//! - a replayed code revokes every token that was ever minted from it and
//!   deletes the code (OIDC Core §16.11)
//! - a refresh token is removed-and-returned in one step, which rotates it:
//!   the old value can never mint twice

use chrono::Utc;
use log::{debug, info};
use serde::Serialize;
use uuid::Uuid;

use super::error::OAuthError;
use super::id_token::{generate_id_token, IdTokenParams};
use super::scope::{is_subset, parse_scopes};
use super::OAuthContext;
use crate::crypto::pkce::verify_pkce;
use crate::crypto::random::opaque_token;
use crate::storage::models::{AuthorizationCode, Client, Token, User};
use crate::storage::{CodeConsumption, Storage};

/// Raw form body of a token request (minus client credentials, which the
/// endpoint resolves before calling in here)
#[derive(Debug, Clone, Default)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// Successful token endpoint response (RFC 6749 §5.1)
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub scope: String,
}

/// Dispatches a token request for an already-authenticated client
pub async fn handle_token(
    ctx: &OAuthContext,
    client: &Client,
    request: TokenRequest,
) -> Result<TokenResponse, OAuthError> {
    match request.grant_type.as_deref() {
        Some("authorization_code") => authorization_code_grant(ctx, client, request).await,
        Some("refresh_token") => refresh_token_grant(ctx, client, request).await,
        Some(other) => Err(OAuthError::unsupported_grant_type(format!(
            "Grant type {} is not supported",
            other
        ))),
        None => Err(OAuthError::invalid_request("Missing grant_type parameter")),
    }
}

/// Revokes everything a replayed code ever produced, then drops the code
async fn punish_replay(ctx: &OAuthContext, code: &AuthorizationCode) -> Result<(), OAuthError> {
    let revoked = ctx.storage.revoke_tokens_by_auth_code(&code.code).await?;
    ctx.storage.delete_authorization_code(&code.code).await?;
    info!(
        "Authorization code replay for client {}: revoked {} token bundle(s)",
        code.client_id, revoked
    );
    Ok(())
}

async fn authorization_code_grant(
    ctx: &OAuthContext,
    client: &Client,
    request: TokenRequest,
) -> Result<TokenResponse, OAuthError> {
    if !client.allows_grant("authorization_code") {
        return Err(OAuthError::unauthorized_client(
            "Client may not use the authorization_code grant",
        ));
    }
    let code_value = request
        .code
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_request("Missing code parameter"))?;

    let code = ctx
        .storage
        .get_authorization_code(code_value)
        .await?
        .ok_or_else(|| OAuthError::invalid_grant("Unknown authorization code"))?;

    // Replay detection before anything else: a used code poisons every token
    // it ever produced
    if code.used {
        punish_replay(ctx, &code).await?;
        return Err(OAuthError::invalid_grant(
            "Authorization code has already been redeemed",
        ));
    }
    if code.is_expired(Utc::now()) {
        ctx.storage.delete_authorization_code(&code.code).await?;
        return Err(OAuthError::invalid_grant("Authorization code has expired"));
    }
    if code.client_id != client.id {
        return Err(OAuthError::invalid_grant(
            "Authorization code was issued to another client",
        ));
    }
    match request.redirect_uri.as_deref() {
        Some(uri) if uri == code.redirect_uri => {}
        _ => {
            return Err(OAuthError::invalid_grant(
                "redirect_uri does not match the authorization request",
            ))
        }
    }

    // PKCE: a code bound to a challenge requires the matching verifier.
    // Public clients only ever get here with a PKCE-bound code.
    if let (Some(challenge), Some(method)) =
        (code.code_challenge.as_deref(), code.code_challenge_method)
    {
        let verifier = request
            .code_verifier
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_grant("Missing code_verifier"))?;
        if !verify_pkce(verifier, challenge, method) {
            return Err(OAuthError::invalid_grant("code_verifier does not match"));
        }
    } else if client.is_public() {
        return Err(OAuthError::invalid_grant(
            "Public clients must use PKCE-bound authorization codes",
        ));
    }

    // The single-use gate. Everything above was read-only; this is the one
    // linearizable step, taken before any token is minted.
    let code = match ctx.storage.consume_authorization_code(&code.code).await? {
        Some(CodeConsumption::FirstUse(code)) => code,
        Some(CodeConsumption::Replayed(code)) => {
            punish_replay(ctx, &code).await?;
            return Err(OAuthError::invalid_grant(
                "Authorization code has already been redeemed",
            ));
        }
        None => return Err(OAuthError::invalid_grant("Unknown authorization code")),
    };

    let user = ctx
        .storage
        .get_user(&code.user_id)
        .await?
        .ok_or_else(|| OAuthError::invalid_grant("User no longer exists"))?;

    let token = mint_token(
        ctx,
        &user,
        client,
        &code.scope,
        Some(code.code.clone()),
        true,
    )
    .await?;

    // auth_time/acr/amr come from the user's live SSO session when there is
    // one; the nonce always travels from the original authorization request
    let session = ctx.storage.latest_user_session(&user.id).await?;
    let scopes = parse_scopes(&code.scope);
    let key = ctx.keys.active().await.map_err(OAuthError::server_error)?;
    let id_token = generate_id_token(
        &IdTokenParams {
            issuer: &ctx.issuer,
            client_id: &client.id,
            user: &user,
            scopes: &scopes,
            nonce: code.nonce.as_deref(),
            auth_time: session.as_ref().map(|s| s.auth_time),
            acr: session.as_ref().map(|s| s.acr.as_str()),
            amr: session.as_ref().map(|s| s.amr.as_slice()).unwrap_or(&[]),
            access_token: Some(&token.access_token),
            authorization_code: None,
            ttl: ctx.token_ttl,
        },
        &key,
    )
    .map_err(OAuthError::server_error)?;

    debug!(
        "Redeemed authorization code for client {} user {}",
        client.id, user.id
    );
    Ok(TokenResponse {
        access_token: token.access_token,
        token_type: "Bearer".to_string(),
        expires_in: ctx.token_ttl_seconds(),
        refresh_token: token.refresh_token,
        id_token: Some(id_token),
        scope: code.scope,
    })
}

async fn refresh_token_grant(
    ctx: &OAuthContext,
    client: &Client,
    request: TokenRequest,
) -> Result<TokenResponse, OAuthError> {
    if !client.allows_grant("refresh_token") {
        return Err(OAuthError::unauthorized_client(
            "Client may not use the refresh_token grant",
        ));
    }
    let refresh_value = request
        .refresh_token
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_request("Missing refresh_token parameter"))?;

    let old = ctx
        .storage
        .get_token_by_refresh(refresh_value)
        .await?
        .ok_or_else(|| OAuthError::invalid_grant("Unknown refresh token"))?;
    if old.client_id != client.id {
        return Err(OAuthError::invalid_grant(
            "Refresh token belongs to another client",
        ));
    }

    // Optional scope narrowing; widening is refused
    let granted_scopes = parse_scopes(&old.scope);
    let new_scope = match request.scope.as_deref() {
        Some(requested) => {
            let requested_scopes = parse_scopes(requested);
            if !is_subset(&requested_scopes, &granted_scopes) {
                return Err(OAuthError::invalid_scope(
                    "Refresh may narrow the scope, never widen it",
                ));
            }
            requested.to_string()
        }
        None => old.scope.clone(),
    };

    // Rotation: take the old bundle in one step; a concurrent refresh with
    // the same token loses the race and gets invalid_grant
    let old = ctx
        .storage
        .take_token_by_refresh(refresh_value)
        .await?
        .ok_or_else(|| OAuthError::invalid_grant("Unknown refresh token"))?;

    let user = ctx
        .storage
        .get_user(&old.user_id)
        .await?
        .ok_or_else(|| OAuthError::invalid_grant("User no longer exists"))?;

    let token = mint_token(
        ctx,
        &user,
        client,
        &new_scope,
        old.authorization_code_id.clone(),
        true,
    )
    .await?;

    let session = ctx.storage.latest_user_session(&user.id).await?;
    let scopes = parse_scopes(&new_scope);
    let key = ctx.keys.active().await.map_err(OAuthError::server_error)?;
    let id_token = generate_id_token(
        &IdTokenParams {
            issuer: &ctx.issuer,
            client_id: &client.id,
            user: &user,
            scopes: &scopes,
            // A refreshed ID token carries no nonce (it binds to no request)
            nonce: None,
            auth_time: session.as_ref().map(|s| s.auth_time),
            acr: session.as_ref().map(|s| s.acr.as_str()),
            amr: session.as_ref().map(|s| s.amr.as_slice()).unwrap_or(&[]),
            access_token: Some(&token.access_token),
            authorization_code: None,
            ttl: ctx.token_ttl,
        },
        &key,
    )
    .map_err(OAuthError::server_error)?;

    debug!("Rotated refresh token for client {} user {}", client.id, user.id);
    Ok(TokenResponse {
        access_token: token.access_token,
        token_type: "Bearer".to_string(),
        expires_in: ctx.token_ttl_seconds(),
        refresh_token: token.refresh_token,
        id_token: Some(id_token),
        scope: new_scope,
    })
}

/// Mints and stores a fresh token bundle
async fn mint_token(
    ctx: &OAuthContext,
    user: &User,
    client: &Client,
    scope: &str,
    authorization_code_id: Option<String>,
    with_refresh: bool,
) -> Result<Token, OAuthError> {
    let now = Utc::now();
    let token = Token {
        id: Uuid::new_v4().to_string(),
        access_token: opaque_token(),
        refresh_token: if with_refresh {
            Some(opaque_token())
        } else {
            None
        },
        token_type: "Bearer".to_string(),
        scope: scope.to_string(),
        user_id: user.id.clone(),
        client_id: client.id.clone(),
        authorization_code_id,
        created_at: now,
        expires_at: now + ctx.token_ttl,
    };
    ctx.storage.put_token(token.clone()).await?;
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::pkce::s256_challenge;
    use crate::crypto::KeyManager;
    use crate::storage::models::{
        ApplicationType, CodeChallengeMethod, SubjectType, TokenEndpointAuthMethod, UserRole,
    };
    use crate::storage::{MemoryStorage, SharedStorage, Storage};
    use chrono::Duration;
    use std::sync::Arc;

    async fn context() -> OAuthContext {
        let storage: SharedStorage = Arc::new(MemoryStorage::new());
        let keys = KeyManager::initialize(storage.clone(), 2048, Duration::days(30))
            .await
            .unwrap();
        OAuthContext {
            storage,
            keys,
            issuer: "https://op.example".to_string(),
            token_ttl: Duration::minutes(60),
            code_ttl: Duration::minutes(10),
            auth_session_ttl: Duration::minutes(10),
            user_session_ttl: Duration::hours(24),
        }
    }

    fn confidential_client() -> Client {
        let now = Utc::now();
        Client {
            id: "web-app".to_string(),
            secret: Some("s3cret".to_string()),
            secret_expires_at: 0,
            redirect_uris: vec!["https://app.example/cb".to_string()],
            grant_types: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ],
            response_types: vec!["code".to_string()],
            scope: "openid profile email".to_string(),
            application_type: ApplicationType::Web,
            token_endpoint_auth_method: TokenEndpointAuthMethod::ClientSecretBasic,
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

    async fn seed_user(ctx: &OAuthContext) {
        ctx.storage
            .create_user(User::new(
                "u1",
                "alice",
                "alice@example.org",
                "$2b$10$hash",
                UserRole::User,
            ))
            .await
            .unwrap();
    }

    async fn seed_code(
        ctx: &OAuthContext,
        code: &str,
        challenge: Option<(&str, CodeChallengeMethod)>,
    ) {
        let now = Utc::now();
        ctx.storage
            .put_authorization_code(AuthorizationCode {
                code: code.to_string(),
                client_id: "web-app".to_string(),
                user_id: "u1".to_string(),
                redirect_uri: "https://app.example/cb".to_string(),
                scope: "openid profile".to_string(),
                nonce: Some("n1".to_string()),
                code_challenge: challenge.map(|(c, _)| c.to_string()),
                code_challenge_method: challenge.map(|(_, m)| m),
                expires_at: now + Duration::minutes(10),
                created_at: now,
                used: false,
                used_at: None,
            })
            .await
            .unwrap();
    }

    fn code_request(code: &str) -> TokenRequest {
        TokenRequest {
            grant_type: Some("authorization_code".to_string()),
            code: Some(code.to_string()),
            redirect_uri: Some("https://app.example/cb".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn code_exchange_issues_tokens_and_id_token() {
        let ctx = context().await;
        seed_user(&ctx).await;
        seed_code(&ctx, "c0de", None).await;
        let client = confidential_client();

        let response = handle_token(&ctx, &client, code_request("c0de")).await.unwrap();
        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.scope, "openid profile");
        assert!(response.refresh_token.is_some());
        let id_token = response.id_token.unwrap();
        assert_eq!(id_token.split('.').count(), 3);

        // The bundle is stored and back-references the code
        let stored = ctx
            .storage
            .get_token_by_access(&response.access_token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.authorization_code_id.as_deref(), Some("c0de"));
    }

    #[tokio::test]
    async fn replay_revokes_every_minted_token() {
        let ctx = context().await;
        seed_user(&ctx).await;
        seed_code(&ctx, "c0de", None).await;
        let client = confidential_client();

        let first = handle_token(&ctx, &client, code_request("c0de")).await.unwrap();
        let err = handle_token(&ctx, &client, code_request("c0de"))
            .await
            .unwrap_err();
        assert_eq!(err.code, "invalid_grant");

        // Cascade: the token from the first exchange is gone
        assert!(ctx
            .storage
            .get_token_by_access(&first.access_token)
            .await
            .unwrap()
            .is_none());
        // And the code itself was deleted
        assert!(ctx
            .storage
            .get_authorization_code("c0de")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn redirect_mismatch_is_invalid_grant() {
        let ctx = context().await;
        seed_user(&ctx).await;
        seed_code(&ctx, "c0de", None).await;
        let client = confidential_client();

        let mut request = code_request("c0de");
        request.redirect_uri = Some("https://app.example/other".to_string());
        let err = handle_token(&ctx, &client, request).await.unwrap_err();
        assert_eq!(err.code, "invalid_grant");
    }

    #[tokio::test]
    async fn pkce_verifier_is_enforced() {
        let ctx = context().await;
        seed_user(&ctx).await;
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        seed_code(
            &ctx,
            "c0de",
            Some((s256_challenge(verifier).as_str(), CodeChallengeMethod::S256)),
        )
        .await;
        let client = confidential_client();

        // Missing verifier
        let err = handle_token(&ctx, &client, code_request("c0de"))
            .await
            .unwrap_err();
        assert_eq!(err.code, "invalid_grant");

        // Wrong verifier
        let mut request = code_request("c0de");
        request.code_verifier = Some("wrong".to_string());
        let err = handle_token(&ctx, &client, request).await.unwrap_err();
        assert_eq!(err.code, "invalid_grant");

        // Correct verifier
        let mut request = code_request("c0de");
        request.code_verifier = Some(verifier.to_string());
        assert!(handle_token(&ctx, &client, request).await.is_ok());
    }

    #[tokio::test]
    async fn refresh_rotates_and_retires_the_old_token() {
        let ctx = context().await;
        seed_user(&ctx).await;
        seed_code(&ctx, "c0de", None).await;
        let client = confidential_client();

        let first = handle_token(&ctx, &client, code_request("c0de")).await.unwrap();
        let refresh = first.refresh_token.clone().unwrap();

        let request = TokenRequest {
            grant_type: Some("refresh_token".to_string()),
            refresh_token: Some(refresh.clone()),
            ..Default::default()
        };
        let second = handle_token(&ctx, &client, request.clone()).await.unwrap();
        assert_ne!(second.access_token, first.access_token);
        assert_ne!(second.refresh_token.as_deref(), Some(refresh.as_str()));
        // A refreshed ID token carries no nonce
        assert!(second.id_token.is_some());

        // The old refresh token was rotated out
        let err = handle_token(&ctx, &client, request).await.unwrap_err();
        assert_eq!(err.code, "invalid_grant");
    }

    #[tokio::test]
    async fn refresh_scope_may_narrow_but_not_widen() {
        let ctx = context().await;
        seed_user(&ctx).await;
        seed_code(&ctx, "c0de", None).await;
        let client = confidential_client();

        let first = handle_token(&ctx, &client, code_request("c0de")).await.unwrap();

        let mut request = TokenRequest {
            grant_type: Some("refresh_token".to_string()),
            refresh_token: first.refresh_token.clone(),
            scope: Some("openid profile email".to_string()),
            ..Default::default()
        };
        let err = handle_token(&ctx, &client, request.clone()).await.unwrap_err();
        assert_eq!(err.code, "invalid_scope");

        request.scope = Some("openid".to_string());
        let narrowed = handle_token(&ctx, &client, request).await.unwrap();
        assert_eq!(narrowed.scope, "openid");
    }

    #[tokio::test]
    async fn unknown_grant_type_is_unsupported() {
        let ctx = context().await;
        let client = confidential_client();
        let request = TokenRequest {
            grant_type: Some("password".to_string()),
            ..Default::default()
        };
        let err = handle_token(&ctx, &client, request).await.unwrap_err();
        assert_eq!(err.code, "unsupported_grant_type");
    }
}
