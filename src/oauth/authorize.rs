// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! The `/authorize` state machine
//!
//! An authorization request is an [`AuthSession`] moving through the states
//! {New, AwaitingLogin, AwaitingConsent, Emitting, Done, Failed}. HTTP
//! handlers feed events into the machine ([`begin_authorize`] for the initial
//! request, [`resume_authorize`] after login or consent) and translate the
//! returned [`AuthorizeOutcome`] into redirects; no protocol decision is made
//! outside this module.
//!
//! Error rendering follows one rule: until the redirect URI has been
//! validated byte-for-byte against the client registration, errors are JSON
//! ([`AuthorizeOutcome::Reject`]) and nothing is ever redirected; afterwards
//! errors redirect to the client, query-encoded for the code flow and
//! fragment-encoded for implicit/hybrid.

use chrono::Utc;
use log::debug;
use uuid::Uuid;

use super::error::{self, error_redirect, response_mode_for, OAuthError, ResponseMode};
use super::id_token::{generate_id_token, IdTokenParams};
use super::scope::{contains_openid, is_subset, parse_scopes};
use super::OAuthContext;
use crate::crypto::random::{opaque_token, session_id};
use crate::session::is_auth_time_fresh;
use crate::storage::models::{
    AuthSession, AuthorizationCode, Client, CodeChallengeMethod, FlowState, Token, UserSession,
};

/// Raw parameters of an authorization request, straight off the query string
#[derive(Debug, Clone, Default)]
pub struct AuthorizeRequest {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub prompt: Option<String>,
    pub display: Option<String>,
    pub max_age: Option<i64>,
    pub ui_locales: Option<String>,
    pub claims: Option<String>,
    pub acr_values: Option<String>,
}

/// What the handler should do next
#[derive(Debug)]
pub enum AuthorizeOutcome {
    /// Send the user agent to the login page for this auth session
    ShowLogin { auth_session_id: String },
    /// Send the user agent to the consent page for this auth session
    ShowConsent { auth_session_id: String },
    /// Redirect back to the client (success or protocol error); the auth
    /// session is gone
    RedirectToClient { url: String },
    /// Respond with a JSON error; the redirect URI could not be trusted
    Reject(OAuthError),
}

/// The three response types the provider issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseTypeKind {
    Code,
    IdToken,
    TokenIdToken,
}

impl ResponseTypeKind {
    /// Parses a response_type value; token order is not significant
    pub fn parse(value: &str) -> Option<Self> {
        let mut tokens: Vec<&str> = value.split_whitespace().collect();
        tokens.sort_unstable();
        tokens.dedup();
        match tokens.as_slice() {
            ["code"] => Some(ResponseTypeKind::Code),
            ["id_token"] => Some(ResponseTypeKind::IdToken),
            ["id_token", "token"] => Some(ResponseTypeKind::TokenIdToken),
            _ => None,
        }
    }

    pub fn canonical(&self) -> &'static str {
        match self {
            ResponseTypeKind::Code => "code",
            ResponseTypeKind::IdToken => "id_token",
            ResponseTypeKind::TokenIdToken => "token id_token",
        }
    }

    pub fn response_mode(&self) -> ResponseMode {
        response_mode_for(self.canonical())
    }

    /// Grant type the client must hold for this response type
    pub fn required_grant(&self) -> &'static str {
        match self {
            ResponseTypeKind::Code => "authorization_code",
            _ => "implicit",
        }
    }

    pub fn issues_id_token_directly(&self) -> bool {
        !matches!(self, ResponseTypeKind::Code)
    }
}

/// Entry point for `GET /authorize`
pub async fn begin_authorize(
    ctx: &OAuthContext,
    request: AuthorizeRequest,
    user_session: Option<UserSession>,
) -> AuthorizeOutcome {
    // Everything up to redirect-URI validation renders as JSON: an attacker
    // must never bounce an error (or a user) off an unvalidated URI.
    let client_id = match request.client_id.as_deref() {
        Some(id) if !id.is_empty() => id,
        _ => {
            return AuthorizeOutcome::Reject(OAuthError::invalid_request(
                "Missing client_id parameter",
            ))
        }
    };
    let client = match ctx.storage.get_client(client_id).await {
        Ok(Some(client)) => client,
        Ok(None) => {
            return AuthorizeOutcome::Reject(OAuthError::invalid_request("Unknown client"))
        }
        Err(e) => return AuthorizeOutcome::Reject(OAuthError::server_error(e)),
    };
    let redirect_uri = match request.redirect_uri.as_deref() {
        Some(uri) if client.allows_redirect_uri(uri) => uri.to_string(),
        Some(_) => {
            return AuthorizeOutcome::Reject(OAuthError::invalid_request(
                "redirect_uri is not registered for this client",
            ))
        }
        None => {
            return AuthorizeOutcome::Reject(OAuthError::invalid_request(
                "Missing redirect_uri parameter",
            ))
        }
    };

    // From here on the redirect URI is trusted and errors go back to the
    // client. Guess the response mode from the raw value so even a bad
    // response_type errors into the right part of the URL.
    let raw_response_type = request.response_type.clone().unwrap_or_default();
    let provisional_mode = if raw_response_type.contains("token") {
        ResponseMode::Fragment
    } else {
        ResponseMode::Query
    };
    let error_state = request.state.clone();
    let reject_redirect = |e: OAuthError, mode: ResponseMode| {
        let e = e.with_state(error_state.clone());
        AuthorizeOutcome::RedirectToClient {
            url: error_redirect(&redirect_uri, mode, &e),
        }
    };

    let kind = match ResponseTypeKind::parse(&raw_response_type) {
        Some(kind) => kind,
        None => {
            return reject_redirect(
                OAuthError::unsupported_response_type("Unsupported response_type"),
                provisional_mode,
            )
        }
    };
    let mode = kind.response_mode();

    if !client
        .response_types
        .iter()
        .any(|rt| ResponseTypeKind::parse(rt) == Some(kind))
    {
        return reject_redirect(
            OAuthError::unauthorized_client("Client may not use this response_type"),
            mode,
        );
    }
    if !client.allows_grant(kind.required_grant()) {
        return reject_redirect(
            OAuthError::unauthorized_client("Client lacks the grant for this response_type"),
            mode,
        );
    }

    let scope = request.scope.clone().unwrap_or_default();
    if !contains_openid(&scope) {
        return reject_redirect(
            OAuthError::invalid_scope("scope must include openid"),
            mode,
        );
    }
    let requested_scopes = parse_scopes(&scope);
    let client_scopes = parse_scopes(&client.scope);
    if !is_subset(&requested_scopes, &client_scopes) {
        return reject_redirect(
            OAuthError::invalid_scope("Requested scope exceeds the client registration"),
            mode,
        );
    }

    // Implicit and hybrid flows bind the ID token to the request via nonce
    if kind.issues_id_token_directly() && request.nonce.as_deref().unwrap_or("").is_empty() {
        return reject_redirect(
            OAuthError::invalid_request("nonce is required for this response_type"),
            mode,
        );
    }

    let code_challenge_method = match request.code_challenge_method.as_deref() {
        None => request
            .code_challenge
            .as_ref()
            .map(|_| CodeChallengeMethod::Plain),
        Some("plain") => Some(CodeChallengeMethod::Plain),
        Some("S256") => Some(CodeChallengeMethod::S256),
        Some(_) => {
            return reject_redirect(
                OAuthError::invalid_request("code_challenge_method must be plain or S256"),
                mode,
            )
        }
    };
    if code_challenge_method.is_some() && request.code_challenge.is_none() {
        return reject_redirect(
            OAuthError::invalid_request("code_challenge_method without code_challenge"),
            mode,
        );
    }

    let now = Utc::now();
    let session = AuthSession {
        id: session_id(),
        flow_state: FlowState::New,
        client_id: client.id.clone(),
        redirect_uri: redirect_uri.clone(),
        response_type: kind.canonical().to_string(),
        scope,
        state: request.state,
        nonce: request.nonce,
        code_challenge: request.code_challenge,
        code_challenge_method,
        prompt: request.prompt,
        display: request.display,
        ui_locales: request.ui_locales,
        claims: request.claims,
        max_age: request.max_age,
        acr_values: request.acr_values,
        user_id: None,
        auth_time: None,
        acr: None,
        amr: Vec::new(),
        authentication_method: None,
        consent_given: false,
        consented_scopes: None,
        expires_at: now + ctx.auth_session_ttl,
        created_at: now,
    };
    if let Err(e) = ctx.storage.put_auth_session(session.clone()).await {
        return reject_redirect(OAuthError::server_error(e), mode);
    }
    debug!(
        "Created auth session {} for client {} ({})",
        session.id,
        client.id,
        kind.canonical()
    );

    evaluate(ctx, session, client, user_session).await
}

/// Re-enters the state machine after a login or consent event
pub async fn resume_authorize(
    ctx: &OAuthContext,
    auth_session_id: &str,
    user_session: Option<UserSession>,
) -> AuthorizeOutcome {
    let session = match ctx.storage.get_auth_session(auth_session_id).await {
        Ok(Some(session)) if !session.is_expired(Utc::now()) => session,
        Ok(_) => {
            return AuthorizeOutcome::Reject(OAuthError::invalid_request(
                "Unknown or expired authorization session",
            ))
        }
        Err(e) => return AuthorizeOutcome::Reject(OAuthError::server_error(e)),
    };
    let client = match ctx.storage.get_client(&session.client_id).await {
        Ok(Some(client)) => client,
        Ok(None) => {
            return AuthorizeOutcome::Reject(OAuthError::invalid_request(
                "Client no longer exists",
            ))
        }
        Err(e) => return AuthorizeOutcome::Reject(OAuthError::server_error(e)),
    };
    evaluate(ctx, session, client, user_session).await
}

fn strip_prompt(session: &mut AuthSession, tokens: &[&str]) {
    if let Some(prompt) = &session.prompt {
        let remaining: Vec<&str> = prompt
            .split_whitespace()
            .filter(|t| !tokens.contains(t))
            .collect();
        session.prompt = if remaining.is_empty() {
            None
        } else {
            Some(remaining.join(" "))
        };
    }
}

/// Runs the gating rules (prompt, login, max_age, consent) and, once all
/// pass, emits the response. Called with a trusted redirect URI.
async fn evaluate(
    ctx: &OAuthContext,
    mut session: AuthSession,
    client: Client,
    user_session: Option<UserSession>,
) -> AuthorizeOutcome {
    let now = Utc::now();
    let kind = ResponseTypeKind::parse(&session.response_type)
        .unwrap_or(ResponseTypeKind::Code);
    let mode = kind.response_mode();
    let redirect_uri = session.redirect_uri.clone();
    let state = session.state.clone();

    let prompt_none = session.has_prompt("none");
    if prompt_none && session.prompt.as_deref() != Some("none") {
        let _ = ctx.storage.delete_auth_session(&session.id).await;
        let e = OAuthError::invalid_request("prompt=none cannot be combined").with_state(state);
        return AuthorizeOutcome::RedirectToClient {
            url: error_redirect(&redirect_uri, mode, &e),
        };
    }

    // Fail the whole flow and bounce the error back to the client
    macro_rules! fail {
        ($err:expr) => {{
            let _ = ctx.storage.delete_auth_session(&session.id).await;
            let e = $err.with_state(state.clone());
            return AuthorizeOutcome::RedirectToClient {
                url: error_redirect(&redirect_uri, mode, &e),
            };
        }};
    }

    // prompt=login / prompt=select_account force re-authentication exactly
    // once; the token is stripped so the post-login resume proceeds.
    if session.has_prompt("login") || session.has_prompt("select_account") {
        strip_prompt(&mut session, &["login", "select_account"]);
        session.flow_state = FlowState::AwaitingLogin;
        if let Err(e) = ctx.storage.update_auth_session(session.clone()).await {
            fail!(OAuthError::server_error(e));
        }
        return AuthorizeOutcome::ShowLogin {
            auth_session_id: session.id,
        };
    }

    let live_session = user_session.filter(|s| !s.is_expired(now));
    let user_session = match live_session {
        Some(us) => us,
        None => {
            if prompt_none {
                fail!(OAuthError::login_required());
            }
            session.flow_state = FlowState::AwaitingLogin;
            if let Err(e) = ctx.storage.update_auth_session(session.clone()).await {
                fail!(OAuthError::server_error(e));
            }
            return AuthorizeOutcome::ShowLogin {
                auth_session_id: session.id,
            };
        }
    };

    // The SSO session is the authority on who the user is and when they
    // authenticated
    session.user_id = Some(user_session.user_id.clone());
    session.auth_time = Some(user_session.auth_time);
    session.acr = Some(user_session.acr.clone());
    session.amr = user_session.amr.clone();
    session.authentication_method = Some(user_session.authentication_method.clone());

    // max_age gating: a stale authentication forces a fresh login
    let effective_max_age = session.max_age.or(client.default_max_age);
    if let Some(max_age) = effective_max_age {
        if max_age > 0 && !is_auth_time_fresh(user_session.auth_time, max_age, now) {
            if prompt_none {
                fail!(OAuthError::login_required());
            }
            session.flow_state = FlowState::AwaitingLogin;
            if let Err(e) = ctx.storage.update_auth_session(session.clone()).await {
                fail!(OAuthError::server_error(e));
            }
            return AuthorizeOutcome::ShowLogin {
                auth_session_id: session.id,
            };
        }
    }

    // Consent gating
    if !session.consent_given {
        let requested = parse_scopes(&session.scope);
        let force_consent = session.has_prompt("consent");
        if !force_consent {
            match ctx
                .storage
                .get_consent(&user_session.user_id, &session.client_id)
                .await
            {
                Ok(Some(consent)) if consent.covers(requested.iter().map(String::as_str)) => {
                    session.consent_given = true;
                    session.consented_scopes = Some(session.scope.clone());
                }
                Ok(_) => {}
                Err(e) => fail!(OAuthError::server_error(e)),
            }
        }
        if !session.consent_given {
            if prompt_none {
                fail!(OAuthError::consent_required());
            }
            strip_prompt(&mut session, &["consent"]);
            session.flow_state = FlowState::AwaitingConsent;
            if let Err(e) = ctx.storage.update_auth_session(session.clone()).await {
                fail!(OAuthError::server_error(e));
            }
            return AuthorizeOutcome::ShowConsent {
                auth_session_id: session.id,
            };
        }
    }

    // All gates passed: emit
    session.flow_state = FlowState::Emitting;
    let emitted = match kind {
        ResponseTypeKind::Code => emit_code(ctx, &session).await,
        ResponseTypeKind::IdToken => emit_implicit(ctx, &session, false).await,
        ResponseTypeKind::TokenIdToken => emit_implicit(ctx, &session, true).await,
    };
    match emitted {
        Ok(url) => {
            // The auth session's job is done
            let _ = ctx.storage.delete_auth_session(&session.id).await;
            AuthorizeOutcome::RedirectToClient { url }
        }
        Err(e) => fail!(e),
    }
}

fn granted_scope(session: &AuthSession) -> String {
    session
        .consented_scopes
        .clone()
        .unwrap_or_else(|| session.scope.clone())
}

async fn emit_code(ctx: &OAuthContext, session: &AuthSession) -> Result<String, OAuthError> {
    let now = Utc::now();
    let code = AuthorizationCode {
        code: opaque_token(),
        client_id: session.client_id.clone(),
        user_id: session
            .user_id
            .clone()
            .ok_or_else(|| OAuthError::server_error("emitting without a user"))?,
        redirect_uri: session.redirect_uri.clone(),
        scope: granted_scope(session),
        nonce: session.nonce.clone(),
        code_challenge: session.code_challenge.clone(),
        code_challenge_method: session.code_challenge_method,
        expires_at: now + ctx.code_ttl,
        created_at: now,
        used: false,
        used_at: None,
    };
    ctx.storage.put_authorization_code(code.clone()).await?;
    debug!(
        "Issued authorization code for client {} user {}",
        code.client_id, code.user_id
    );

    let mut params: Vec<(&str, &str)> = vec![("code", code.code.as_str())];
    if let Some(state) = session.state.as_deref() {
        params.push(("state", state));
    }
    Ok(error::append_params(
        &session.redirect_uri,
        ResponseMode::Query,
        &params,
    ))
}

async fn emit_implicit(
    ctx: &OAuthContext,
    session: &AuthSession,
    with_access_token: bool,
) -> Result<String, OAuthError> {
    let now = Utc::now();
    let user_id = session
        .user_id
        .clone()
        .ok_or_else(|| OAuthError::server_error("emitting without a user"))?;
    let user = ctx
        .storage
        .get_user(&user_id)
        .await?
        .ok_or_else(|| OAuthError::server_error("user vanished mid-flow"))?;

    let scope = granted_scope(session);
    let scopes = parse_scopes(&scope);
    let expires_in = ctx.token_ttl_seconds().to_string();

    let access_token = if with_access_token {
        let token = Token {
            id: Uuid::new_v4().to_string(),
            access_token: opaque_token(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            scope: scope.clone(),
            user_id: user_id.clone(),
            client_id: session.client_id.clone(),
            authorization_code_id: None,
            created_at: now,
            expires_at: now + ctx.token_ttl,
        };
        ctx.storage.put_token(token.clone()).await?;
        Some(token.access_token)
    } else {
        None
    };

    let key = ctx
        .keys
        .active()
        .await
        .map_err(OAuthError::server_error)?;
    let id_token = generate_id_token(
        &IdTokenParams {
            issuer: &ctx.issuer,
            client_id: &session.client_id,
            user: &user,
            scopes: &scopes,
            nonce: session.nonce.as_deref(),
            auth_time: session.auth_time,
            acr: session.acr.as_deref(),
            amr: &session.amr,
            access_token: access_token.as_deref(),
            authorization_code: None,
            ttl: ctx.token_ttl,
        },
        &key,
    )
    .map_err(OAuthError::server_error)?;

    let mut params: Vec<(&str, &str)> = Vec::new();
    if let Some(access_token) = access_token.as_deref() {
        params.push(("access_token", access_token));
        params.push(("token_type", "Bearer"));
        params.push(("expires_in", expires_in.as_str()));
    }
    params.push(("id_token", id_token.as_str()));
    if let Some(state) = session.state.as_deref() {
        params.push(("state", state));
    }
    Ok(error::append_params(
        &session.redirect_uri,
        ResponseMode::Fragment,
        &params,
    ))
}
