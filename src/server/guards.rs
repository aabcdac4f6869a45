// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Request guards
//!
//! Guards translate cookies and Authorization headers into typed request
//! context: the SSO user session, raw bearer tokens, Basic client
//! credentials and connection info for absolute URL construction. None of
//! them decide protocol outcomes; handlers and the engine do.

use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::State;

use super::ProviderState;
use crate::oauth::client_auth::ClientCredentials;
use crate::session::USER_SESSION_COOKIE;
use crate::storage::models::{User, UserRole, UserSession};
use crate::storage::Storage;

/// The authenticated SSO session referenced by the `user_session` cookie
///
/// Forwards (rather than fails) when the cookie is absent, stale or points
/// at nothing, so handlers take `Option<CurrentUserSession>` and decide for
/// themselves whether login is required.
pub struct CurrentUserSession(pub UserSession);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUserSession {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let state = match request.guard::<&State<ProviderState>>().await {
            Outcome::Success(state) => state,
            _ => return Outcome::Forward(Status::InternalServerError),
        };
        let session_id = match request.cookies().get_private(USER_SESSION_COOKIE) {
            Some(cookie) => cookie.value().to_string(),
            None => return Outcome::Forward(Status::Unauthorized),
        };
        match state.ctx.storage.get_user_session(&session_id).await {
            Ok(Some(session)) if !session.is_expired(chrono::Utc::now()) => {
                Outcome::Success(CurrentUserSession(session))
            }
            _ => Outcome::Forward(Status::Unauthorized),
        }
    }
}

/// Raw bearer token from the `Authorization` header
pub struct BearerToken(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for BearerToken {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request
            .headers()
            .get_one("Authorization")
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            Some(token) if !token.is_empty() => Outcome::Success(BearerToken(token.to_string())),
            _ => Outcome::Forward(Status::Unauthorized),
        }
    }
}

/// Client credentials from an `Authorization: Basic` header
pub struct BasicClientCredentials(pub ClientCredentials);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for BasicClientCredentials {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request
            .headers()
            .get_one("Authorization")
            .and_then(ClientCredentials::from_basic_header)
        {
            Some(creds) => Outcome::Success(BasicClientCredentials(creds)),
            None => Outcome::Forward(Status::Unauthorized),
        }
    }
}

/// An administrator authenticated by a bearer access token
///
/// Resolves the access token in storage, checks expiry and requires the
/// owning user to hold the admin role. Anything less forwards, and the
/// admin routes answer 401.
pub struct AdminUser(pub User);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let state = match request.guard::<&State<ProviderState>>().await {
            Outcome::Success(state) => state,
            _ => return Outcome::Forward(Status::InternalServerError),
        };
        let bearer = match request.guard::<BearerToken>().await {
            Outcome::Success(bearer) => bearer,
            _ => return Outcome::Forward(Status::Unauthorized),
        };
        let token = match state.ctx.storage.get_token_by_access(&bearer.0).await {
            Ok(Some(token)) if !token.is_expired(chrono::Utc::now()) => token,
            _ => return Outcome::Forward(Status::Unauthorized),
        };
        match state.ctx.storage.get_user(&token.user_id).await {
            Ok(Some(user)) if user.role == UserRole::Admin => Outcome::Success(AdminUser(user)),
            _ => Outcome::Forward(Status::Unauthorized),
        }
    }
}

/// Connection details used to build absolute URLs for the current request
///
/// NOTE: if the host is not set in the request, localhost:8080 is assumed
pub struct ConnectionInfo {
    pub scheme: String,
    pub host_port: String,
    pub base_url: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ConnectionInfo {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let host_port = request
            .host()
            .map(|h| h.to_string())
            .unwrap_or_else(|| "localhost:8080".to_string());
        let scheme = if request.rocket().config().tls_enabled() {
            "https".to_string()
        } else {
            "http".to_string()
        };
        let base_url = format!("{}://{}", scheme, host_port);
        Outcome::Success(ConnectionInfo {
            scheme,
            host_port,
            base_url,
        })
    }
}
