// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! OAuth 2.0 token endpoint
//!
//! `POST /token` (form-encoded). Client authentication per the client's
//! registered `token_endpoint_auth_method` (Basic header or body fields),
//! then the request is handed to [`crate::oauth::token::handle_token`].

use rocket::form::{Form, FromForm};
use rocket::serde::json::Json;
use rocket::{post, State};

use super::guards::BasicClientCredentials;
use super::ProviderState;
use crate::oauth::client_auth::{authenticate_client, ClientCredentials};
use crate::oauth::error::OAuthError;
use crate::oauth::token::{handle_token, TokenRequest, TokenResponse};

/// Form body of a token request (RFC 6749 §4.1.3 / §6)
#[derive(FromForm, Debug)]
pub struct TokenForm {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Token endpoint
///
/// `POST /token`
#[post("/token", data = "<form>")]
pub async fn token(
    form: Form<TokenForm>,
    basic: Option<BasicClientCredentials>,
    state: &State<ProviderState>,
) -> Result<Json<TokenResponse>, OAuthError> {
    let form = form.into_inner();
    let credentials = ClientCredentials::merged(
        basic.map(|b| b.0),
        form.client_id.clone(),
        form.client_secret.clone(),
    );
    let client = authenticate_client(&state.ctx.storage, &credentials).await?;

    let request = TokenRequest {
        grant_type: form.grant_type,
        code: form.code,
        redirect_uri: form.redirect_uri,
        code_verifier: form.code_verifier,
        refresh_token: form.refresh_token,
        scope: form.scope,
    };
    let response = handle_token(&state.ctx, &client, request).await?;
    Ok(Json(response))
}
