// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! OpenID Connect UserInfo endpoint
//!
//! `GET`/`POST /userinfo` with `Authorization: Bearer <access_token>`.
//! Claims are projected by the token's scope set through the same filter the
//! ID token uses, so the two surfaces always agree. Bearer failures answer
//! 401 with a `WWW-Authenticate` challenge, a missing `openid` scope 403.

use chrono::Utc;
use rocket::serde::json::Json;
use rocket::{get, post, State};
use serde_json::{Map, Value};

use super::guards::BearerToken;
use super::ProviderState;
use crate::oauth::error::OAuthError;
use crate::oauth::scope::{contains_openid, parse_scopes, user_claims_for_scopes};
use crate::storage::Storage;

async fn userinfo_response(
    state: &ProviderState,
    bearer: Option<BearerToken>,
) -> Result<Json<Map<String, Value>>, OAuthError> {
    let bearer =
        bearer.ok_or_else(|| OAuthError::invalid_token("Missing bearer access token"))?;

    let token = state
        .ctx
        .storage
        .get_token_by_access(&bearer.0)
        .await?
        .ok_or_else(|| OAuthError::invalid_token("Unknown access token"))?;
    if token.is_expired(Utc::now()) {
        return Err(OAuthError::invalid_token("Access token has expired"));
    }
    if !contains_openid(&token.scope) {
        return Err(OAuthError::insufficient_scope(
            "Access token lacks the openid scope",
        ));
    }

    let user = state
        .ctx
        .storage
        .get_user(&token.user_id)
        .await?
        .ok_or_else(|| OAuthError::invalid_token("Token subject no longer exists"))?;

    let scopes = parse_scopes(&token.scope);
    Ok(Json(user_claims_for_scopes(&user, &scopes)))
}

/// UserInfo endpoint
///
/// `GET /userinfo`
#[get("/userinfo")]
pub async fn userinfo_get(
    bearer: Option<BearerToken>,
    state: &State<ProviderState>,
) -> Result<Json<Map<String, Value>>, OAuthError> {
    userinfo_response(state, bearer).await
}

/// UserInfo endpoint (POST form of the same resource)
///
/// `POST /userinfo`
#[post("/userinfo")]
pub async fn userinfo_post(
    bearer: Option<BearerToken>,
    state: &State<ProviderState>,
) -> Result<Json<Map<String, Value>>, OAuthError> {
    userinfo_response(state, bearer).await
}
