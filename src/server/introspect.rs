// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! RFC 7662 OAuth 2.0 Token Introspection Endpoint
//!
//! Resource servers post a token (with an optional `token_type_hint`) plus
//! their client credentials and get back the token's state. Unknown, expired
//! or foreign tokens all collapse into `{"active": false}` so the endpoint
//! cannot be used to probe the token space.

use chrono::Utc;
use rocket::form::{Form, FromForm};
use rocket::serde::json::Json;
use rocket::{post, State};
use serde::Serialize;

use super::guards::BasicClientCredentials;
use super::ProviderState;
use crate::crypto::jwt::resolve_and_verify;
use crate::oauth::client_auth::{authenticate_client, ClientCredentials};
use crate::oauth::error::OAuthError;
use crate::oauth::id_token::IdTokenClaims;
use crate::storage::models::Token;
use crate::storage::Storage;

/// Token introspection request
#[derive(FromForm, Debug)]
pub struct IntrospectionForm {
    /// The token the client wants to introspect
    pub token: String,
    /// Hint about the token's kind ("access_token" or "refresh_token")
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Token introspection response as per RFC 7662 §2.2
#[derive(Debug, Default, Serialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl IntrospectionResponse {
    fn inactive() -> Self {
        IntrospectionResponse::default()
    }
}

async fn stored_token_response(
    state: &ProviderState,
    token: &Token,
) -> IntrospectionResponse {
    let username = match state.ctx.storage.get_user(&token.user_id).await {
        Ok(Some(user)) => Some(user.username),
        _ => None,
    };
    IntrospectionResponse {
        active: true,
        scope: Some(token.scope.clone()),
        client_id: Some(token.client_id.clone()),
        username,
        token_type: Some(token.token_type.clone()),
        exp: Some(token.expires_at.timestamp()),
        iat: Some(token.created_at.timestamp()),
        sub: Some(token.user_id.clone()),
        iss: Some(state.ctx.issuer.clone()),
    }
}

/// Token introspection endpoint
///
/// `POST /introspect`
#[post("/introspect", data = "<form>")]
pub async fn introspect(
    form: Form<IntrospectionForm>,
    basic: Option<BasicClientCredentials>,
    state: &State<ProviderState>,
) -> Result<Json<IntrospectionResponse>, OAuthError> {
    let form = form.into_inner();
    let credentials = ClientCredentials::merged(
        basic.map(|b| b.0),
        form.client_id.clone(),
        form.client_secret.clone(),
    );
    authenticate_client(&state.ctx.storage, &credentials).await?;

    let now = Utc::now();
    let storage = &state.ctx.storage;

    // Resolve in the hinted order, falling back to the other kind
    let lookups: [&str; 2] = match form.token_type_hint.as_deref() {
        Some("refresh_token") => ["refresh_token", "access_token"],
        _ => ["access_token", "refresh_token"],
    };
    for kind in lookups {
        let found = match kind {
            "refresh_token" => storage.get_token_by_refresh(&form.token).await?,
            _ => storage.get_token_by_access(&form.token).await?,
        };
        if let Some(token) = found {
            if token.is_expired(now) {
                return Ok(Json(IntrospectionResponse::inactive()));
            }
            return Ok(Json(stored_token_response(state, &token).await));
        }
    }

    // Not a stored opaque token; it may be a JWT this provider signed
    if form.token.matches('.').count() == 2 {
        let keys = state
            .ctx
            .keys
            .verification_keys()
            .await
            .map_err(OAuthError::server_error)?;
        if let Ok(claims) = resolve_and_verify::<IdTokenClaims>(&form.token, &keys, now) {
            return Ok(Json(IntrospectionResponse {
                active: true,
                scope: None,
                client_id: Some(claims.aud.clone()),
                username: None,
                token_type: Some("Bearer".to_string()),
                exp: Some(claims.exp),
                iat: Some(claims.iat),
                sub: Some(claims.sub),
                iss: Some(claims.iss),
            }));
        }
    }

    Ok(Json(IntrospectionResponse::inactive()))
}
