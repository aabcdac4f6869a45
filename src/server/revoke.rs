// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! RFC 7009 OAuth 2.0 Token Revocation Endpoint
//!
//! Always answers 200 (RFC 7009 §2.2): whether the token existed, belonged
//! to somebody else or was already gone is invisible to the caller, which
//! keeps the endpoint useless for token scanning. Revoking a refresh token
//! cascades to every bundle minted from the same authorization code.

use log::{debug, info};
use rocket::form::{Form, FromForm};
use rocket::http::Status;
use rocket::{post, State};

use super::guards::BasicClientCredentials;
use super::ProviderState;
use crate::oauth::client_auth::{authenticate_client, ClientCredentials};
use crate::oauth::error::OAuthError;
use crate::storage::Storage;

/// Token revocation request (RFC 7009 §2.1)
#[derive(FromForm, Debug)]
pub struct RevocationForm {
    pub token: String,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Token revocation endpoint
///
/// `POST /revoke`
#[post("/revoke", data = "<form>")]
pub async fn revoke(
    form: Form<RevocationForm>,
    basic: Option<BasicClientCredentials>,
    state: &State<ProviderState>,
) -> Result<Status, OAuthError> {
    let form = form.into_inner();
    let credentials = ClientCredentials::merged(
        basic.map(|b| b.0),
        form.client_id.clone(),
        form.client_secret.clone(),
    );
    // Bad client credentials are still a 401; only the token outcome is muted
    let client = authenticate_client(&state.ctx.storage, &credentials).await?;

    let storage = &state.ctx.storage;

    // Look the token up as a refresh token first (that is the cascade case),
    // honoring the hint order otherwise
    let as_refresh = match form.token_type_hint.as_deref() {
        Some("access_token") => false,
        _ => true,
    };
    let (token, is_refresh) = if as_refresh {
        match storage.get_token_by_refresh(&form.token).await? {
            Some(token) => (Some(token), true),
            None => (storage.get_token_by_access(&form.token).await?, false),
        }
    } else {
        match storage.get_token_by_access(&form.token).await? {
            Some(token) => (Some(token), false),
            None => (storage.get_token_by_refresh(&form.token).await?, true),
        }
    };

    match token {
        Some(token) if token.client_id == client.id => {
            if is_refresh {
                if let Some(code_id) = token.authorization_code_id.as_deref() {
                    let revoked = storage.revoke_tokens_by_auth_code(code_id).await?;
                    info!(
                        "Client {} revoked a refresh token, cascade removed {} bundle(s)",
                        client.id, revoked
                    );
                } else {
                    storage.delete_token(&token.id).await?;
                    info!("Client {} revoked a refresh token", client.id);
                }
            } else {
                storage.delete_token(&token.id).await?;
                info!("Client {} revoked an access token", client.id);
            }
        }
        Some(_) => {
            // Foreign token: silently succeed
            debug!("Client {} tried to revoke a token it does not own", client.id);
        }
        None => {
            debug!("Revocation of an unknown token by client {}", client.id);
        }
    }

    Ok(Status::Ok)
}
