// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Authorization, login and consent endpoints
//!
//! `/authorize` and `/authorize/resume` are adapters over the engine's state
//! machine ([`crate::oauth::authorize`]); `/login` and `/consent` are the
//! minimal HTML collaborators that feed login and consent events back into
//! it. The forms are rendered from handlebars templates and treated as
//! opaque user agents: all they do is POST back.

use log::debug;
use rocket::form::{Form, FromForm};
use rocket::http::CookieJar;
use rocket::response::content::RawHtml;
use rocket::response::Redirect;
use rocket::{get, post, Responder, State};
use serde_json::json;

use super::guards::CurrentUserSession;
use super::ProviderState;
use crate::oauth::authorize::{begin_authorize, resume_authorize, AuthorizeOutcome, AuthorizeRequest};
use crate::oauth::error::{error_redirect, response_mode_for, OAuthError};
use crate::oauth::scope::parse_scopes;
use crate::session::{
    new_password_session, removal_cookie, session_cookie, AUTH_SESSION_COOKIE, USER_SESSION_COOKIE,
};
use crate::storage::models::{AuthSession, Consent, FlowState};
use crate::storage::Storage;

/// Query parameters of an authorization request
#[derive(Debug, FromForm)]
pub struct AuthorizeParams {
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

impl From<AuthorizeParams> for AuthorizeRequest {
    fn from(params: AuthorizeParams) -> Self {
        AuthorizeRequest {
            response_type: params.response_type,
            client_id: params.client_id,
            redirect_uri: params.redirect_uri,
            scope: params.scope,
            state: params.state,
            nonce: params.nonce,
            code_challenge: params.code_challenge,
            code_challenge_method: params.code_challenge_method,
            prompt: params.prompt,
            display: params.display,
            max_age: params.max_age,
            ui_locales: params.ui_locales,
            claims: params.claims,
            acr_values: params.acr_values,
        }
    }
}

/// Every shape an authorization-flow endpoint can answer with
#[derive(Responder)]
pub enum FlowResponse {
    Redirect(Redirect),
    Page(RawHtml<String>),
    #[response(status = 401)]
    LoginFailed(RawHtml<String>),
    Error(OAuthError),
}

impl FlowResponse {
    fn redirect(target: String) -> Self {
        FlowResponse::Redirect(Redirect::to(target))
    }
}

/// Maps an engine outcome onto HTTP: login/consent redirects keep the auth
/// session cookie alive, client redirects drop it
fn respond(outcome: AuthorizeOutcome, state: &ProviderState, cookies: &CookieJar<'_>) -> FlowResponse {
    match outcome {
        AuthorizeOutcome::ShowLogin { auth_session_id } => {
            cookies.add_private(session_cookie(
                AUTH_SESSION_COOKIE,
                auth_session_id.clone(),
                state.ctx.auth_session_ttl,
                state.secure_cookies,
            ));
            FlowResponse::redirect(format!("/login?auth_session={}", auth_session_id))
        }
        AuthorizeOutcome::ShowConsent { auth_session_id } => {
            cookies.add_private(session_cookie(
                AUTH_SESSION_COOKIE,
                auth_session_id.clone(),
                state.ctx.auth_session_ttl,
                state.secure_cookies,
            ));
            FlowResponse::redirect(format!("/consent?auth_session={}", auth_session_id))
        }
        AuthorizeOutcome::RedirectToClient { url } => {
            cookies.remove_private(removal_cookie(AUTH_SESSION_COOKIE));
            FlowResponse::redirect(url)
        }
        AuthorizeOutcome::Reject(error) => FlowResponse::Error(error),
    }
}

/// OAuth 2.0 / OIDC authorization endpoint
///
/// `GET /authorize`
#[get("/authorize?<params..>")]
pub async fn authorize(
    params: AuthorizeParams,
    user_session: Option<CurrentUserSession>,
    state: &State<ProviderState>,
    cookies: &CookieJar<'_>,
) -> FlowResponse {
    let outcome = begin_authorize(
        &state.ctx,
        params.into(),
        user_session.map(|s| s.0),
    )
    .await;
    respond(outcome, state, cookies)
}

/// Re-entry point after a login or consent round trip
///
/// `GET /authorize/resume?auth_session=…`
#[get("/authorize/resume?<auth_session>")]
pub async fn authorize_resume(
    auth_session: Option<String>,
    user_session: Option<CurrentUserSession>,
    state: &State<ProviderState>,
    cookies: &CookieJar<'_>,
) -> FlowResponse {
    // The query parameter is authoritative; the cookie covers user agents
    // that drop it on the way through login
    let auth_session_id = auth_session.or_else(|| {
        cookies
            .get_private(AUTH_SESSION_COOKIE)
            .map(|c| c.value().to_string())
    });
    let auth_session_id = match auth_session_id {
        Some(id) => id,
        None => {
            return FlowResponse::Error(OAuthError::invalid_request(
                "Missing auth_session parameter",
            ))
        }
    };
    let outcome = resume_authorize(&state.ctx, &auth_session_id, user_session.map(|s| s.0)).await;
    respond(outcome, state, cookies)
}

async fn load_live_auth_session(
    state: &ProviderState,
    id: &str,
) -> Result<AuthSession, OAuthError> {
    match state.ctx.storage.get_auth_session(id).await? {
        Some(session) if !session.is_expired(chrono::Utc::now()) => Ok(session),
        _ => Err(OAuthError::invalid_request(
            "Unknown or expired authorization session",
        )),
    }
}

async fn client_display_name(state: &ProviderState, client_id: &str) -> String {
    match state.ctx.storage.get_client(client_id).await {
        Ok(Some(client)) => client.client_name.unwrap_or(client.id),
        _ => client_id.to_string(),
    }
}

/// Renders the login form
fn login_page_html(
    auth_session_id: &str,
    client_name: &str,
    error_msg: Option<&str>,
) -> Result<String, OAuthError> {
    let mut handlebars = handlebars::Handlebars::new();
    handlebars
        .register_template_string("login", include_str!("../../resources/forms/login.hbs"))
        .map_err(OAuthError::server_error)?;

    let data = json!({
        "auth_session": auth_session_id,
        "client_name": client_name,
        "error_msg": error_msg,
    });
    handlebars
        .render("login", &data)
        .map_err(OAuthError::server_error)
}

/// Format scope string into HTML list items with icons and descriptions
fn format_scopes(scope: &str) -> String {
    scope
        .split_whitespace()
        .map(|s| {
            let (icon, description) = match s {
                "openid" => ("🔑", "Verify your identity"),
                "profile" => ("👤", "Access your profile information"),
                "email" => ("📧", "Access your email address"),
                "address" => ("🏠", "Access your postal address"),
                "phone" => ("📱", "Access your phone number"),
                _ => ("🔒", s),
            };
            format!(
                r#"<div class="scope-item">
    <span class="icon">{}</span>
    <span class="description">{}</span>
</div>"#,
                icon, description
            )
        })
        .collect::<Vec<String>>()
        .join("\n")
}

/// Renders the consent form
fn consent_page_html(
    auth_session_id: &str,
    client_name: &str,
    scope: &str,
) -> Result<String, OAuthError> {
    let mut handlebars = handlebars::Handlebars::new();
    handlebars
        .register_template_string("consent", include_str!("../../resources/forms/consent.hbs"))
        .map_err(OAuthError::server_error)?;

    let data = json!({
        "auth_session": auth_session_id,
        "client_name": client_name,
        "formatted_scopes": format_scopes(scope),
    });
    handlebars
        .render("consent", &data)
        .map_err(OAuthError::server_error)
}

/// Login form
///
/// `GET /login?auth_session=…`
#[get("/login?<auth_session>")]
pub async fn login_page(
    auth_session: String,
    state: &State<ProviderState>,
) -> Result<RawHtml<String>, OAuthError> {
    let session = load_live_auth_session(state, &auth_session).await?;
    let client_name = client_display_name(state, &session.client_id).await;
    Ok(RawHtml(login_page_html(&session.id, &client_name, None)?))
}

/// Credentials posted by the login form
#[derive(FromForm, Debug)]
pub struct LoginForm {
    pub auth_session: String,
    pub username: String,
    pub password: String,
}

/// Handles user login credentials and establishes the SSO session
///
/// `POST /login`
#[post("/login", data = "<form>")]
pub async fn login_submit(
    form: Form<LoginForm>,
    state: &State<ProviderState>,
    cookies: &CookieJar<'_>,
) -> FlowResponse {
    let auth_session = match load_live_auth_session(state, &form.auth_session).await {
        Ok(session) => session,
        Err(e) => return FlowResponse::Error(e),
    };

    let user = match state.ctx.storage.get_user_by_username(&form.username).await {
        Ok(user) => user,
        Err(e) => return FlowResponse::Error(OAuthError::server_error(e)),
    };
    let verified = user
        .as_ref()
        .map(|u| pwhash::unix::verify(&form.password, &u.password_hash))
        .unwrap_or(false);
    let user = match (user, verified) {
        (Some(user), true) => user,
        _ => {
            debug!("Login failed for username {}", form.username);
            let client_name = client_display_name(state, &auth_session.client_id).await;
            return match login_page_html(
                &auth_session.id,
                &client_name,
                Some("Invalid username or password"),
            ) {
                Ok(html) => FlowResponse::LoginFailed(RawHtml(html)),
                Err(e) => FlowResponse::Error(e),
            };
        }
    };

    // Fresh SSO anchor: auth_time is now, method is password
    let session = new_password_session(&user.id, state.ctx.user_session_ttl);
    if let Err(e) = state.ctx.storage.put_user_session(session.clone()).await {
        return FlowResponse::Error(OAuthError::server_error(e));
    }
    cookies.add_private(session_cookie(
        USER_SESSION_COOKIE,
        session.id.clone(),
        state.ctx.user_session_ttl,
        state.secure_cookies,
    ));
    debug!("User {} logged in, session {}", user.username, session.id);

    FlowResponse::redirect(format!("/authorize/resume?auth_session={}", auth_session.id))
}

/// Consent form
///
/// `GET /consent?auth_session=…`
#[get("/consent?<auth_session>")]
pub async fn consent_page(
    auth_session: String,
    user_session: Option<CurrentUserSession>,
    state: &State<ProviderState>,
) -> Result<FlowResponse, OAuthError> {
    let session = load_live_auth_session(state, &auth_session).await?;
    if user_session.is_none() {
        // Consent only makes sense for an authenticated user
        return Ok(FlowResponse::redirect(format!(
            "/login?auth_session={}",
            session.id
        )));
    }
    let client_name = client_display_name(state, &session.client_id).await;
    Ok(FlowResponse::Page(RawHtml(consent_page_html(
        &session.id,
        &client_name,
        &session.scope,
    )?)))
}

/// Decision posted by the consent form
#[derive(FromForm, Debug)]
pub struct ConsentForm {
    pub auth_session: String,
    /// "allow" grants, anything else denies
    pub action: String,
}

/// Records the consent decision and resumes the flow
///
/// `POST /consent`
#[post("/consent", data = "<form>")]
pub async fn consent_submit(
    form: Form<ConsentForm>,
    user_session: Option<CurrentUserSession>,
    state: &State<ProviderState>,
    cookies: &CookieJar<'_>,
) -> FlowResponse {
    let mut session = match load_live_auth_session(state, &form.auth_session).await {
        Ok(session) => session,
        Err(e) => return FlowResponse::Error(e),
    };
    let user_session = match user_session {
        Some(user_session) => user_session.0,
        None => {
            return FlowResponse::redirect(format!("/login?auth_session={}", session.id));
        }
    };

    if form.action != "allow" {
        // Deny: tear the flow down and tell the client
        let _ = state.ctx.storage.delete_auth_session(&session.id).await;
        cookies.remove_private(removal_cookie(AUTH_SESSION_COOKIE));
        let error = OAuthError::access_denied("End-user denied the request")
            .with_state(session.state.clone());
        let mode = response_mode_for(&session.response_type);
        return FlowResponse::redirect(error_redirect(&session.redirect_uri, mode, &error));
    }

    // Store or upgrade the consent row: scopes accumulate across grants
    let now = chrono::Utc::now();
    let requested = parse_scopes(&session.scope);
    let consent = match state
        .ctx
        .storage
        .get_consent(&user_session.user_id, &session.client_id)
        .await
    {
        Ok(Some(mut existing)) => {
            for scope in &requested {
                if !existing.scopes.contains(scope) {
                    existing.scopes.push(scope.clone());
                }
            }
            existing.updated_at = now;
            existing
        }
        Ok(None) => Consent {
            user_id: user_session.user_id.clone(),
            client_id: session.client_id.clone(),
            scopes: requested,
            created_at: now,
            updated_at: now,
        },
        Err(e) => return FlowResponse::Error(OAuthError::server_error(e)),
    };
    if let Err(e) = state.ctx.storage.upsert_consent(consent).await {
        return FlowResponse::Error(OAuthError::server_error(e));
    }

    session.consent_given = true;
    session.consented_scopes = Some(session.scope.clone());
    session.flow_state = FlowState::Emitting;
    if let Err(e) = state.ctx.storage.update_auth_session(session.clone()).await {
        return FlowResponse::Error(OAuthError::server_error(e));
    }

    FlowResponse::redirect(format!("/authorize/resume?auth_session={}", session.id))
}
