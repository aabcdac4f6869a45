// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Unified protocol error taxonomy and rendering
//!
//! Every protocol failure in the provider is an [`OAuthError`]: an OAuth/OIDC
//! error code, a human-readable description, the HTTP status it maps to and
//! the optional `state` echo. Rendering happens in exactly two shapes:
//!
//! - **JSON** (`{"error": …, "error_description": …}`) whenever the request
//!   never produced a trustworthy redirect URI, and at all non-redirecting
//!   endpoints
//! - **redirect** to the validated client redirect URI, parameters in the
//!   query for the code flow and in the fragment for implicit/hybrid
//!
//! The decision between the two lives here and nowhere else.

use std::fmt;

use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{Responder, Response};
use serde::Serialize;

// Error codes, verbatim from RFC 6749/7009/7591/7662 and OIDC Core
pub const INVALID_REQUEST: &str = "invalid_request";
pub const UNAUTHORIZED_CLIENT: &str = "unauthorized_client";
pub const ACCESS_DENIED: &str = "access_denied";
pub const UNSUPPORTED_RESPONSE_TYPE: &str = "unsupported_response_type";
pub const INVALID_SCOPE: &str = "invalid_scope";
pub const SERVER_ERROR: &str = "server_error";
pub const TEMPORARILY_UNAVAILABLE: &str = "temporarily_unavailable";
pub const INTERACTION_REQUIRED: &str = "interaction_required";
pub const LOGIN_REQUIRED: &str = "login_required";
pub const ACCOUNT_SELECTION_REQUIRED: &str = "account_selection_required";
pub const CONSENT_REQUIRED: &str = "consent_required";
pub const INVALID_REQUEST_URI: &str = "invalid_request_uri";
pub const INVALID_REQUEST_OBJECT: &str = "invalid_request_object";
pub const REQUEST_NOT_SUPPORTED: &str = "request_not_supported";
pub const REQUEST_URI_NOT_SUPPORTED: &str = "request_uri_not_supported";
pub const REGISTRATION_NOT_SUPPORTED: &str = "registration_not_supported";
pub const INVALID_CLIENT: &str = "invalid_client";
pub const INVALID_GRANT: &str = "invalid_grant";
pub const UNSUPPORTED_GRANT_TYPE: &str = "unsupported_grant_type";
pub const INVALID_TOKEN: &str = "invalid_token";
pub const INSUFFICIENT_SCOPE: &str = "insufficient_scope";
pub const INVALID_REDIRECT_URI: &str = "invalid_redirect_uri";
pub const INVALID_CLIENT_METADATA: &str = "invalid_client_metadata";

/// A protocol-level error, carrying everything needed to render it
#[derive(Debug, Clone)]
pub struct OAuthError {
    pub code: &'static str,
    pub description: String,
    pub status: Status,
    /// `state` from the originating authorization request, echoed on redirects
    pub state: Option<String>,
    /// Value for the `WWW-Authenticate` response header, where mandated
    pub www_authenticate: Option<String>,
}

impl fmt::Display for OAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.description)
    }
}

impl std::error::Error for OAuthError {}

impl OAuthError {
    pub fn new(code: &'static str, description: impl Into<String>, status: Status) -> Self {
        OAuthError {
            code,
            description: description.into(),
            status,
            state: None,
            www_authenticate: None,
        }
    }

    pub fn with_state(mut self, state: Option<String>) -> Self {
        self.state = state;
        self
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, description, Status::BadRequest)
    }

    /// Client authentication failure; advertises Basic per RFC 6749 §5.2
    pub fn invalid_client(description: impl Into<String>) -> Self {
        let mut err = Self::new(INVALID_CLIENT, description, Status::Unauthorized);
        err.www_authenticate = Some(r#"Basic realm="token""#.to_string());
        err
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(INVALID_GRANT, description, Status::BadRequest)
    }

    pub fn unauthorized_client(description: impl Into<String>) -> Self {
        Self::new(UNAUTHORIZED_CLIENT, description, Status::BadRequest)
    }

    pub fn unsupported_grant_type(description: impl Into<String>) -> Self {
        Self::new(UNSUPPORTED_GRANT_TYPE, description, Status::BadRequest)
    }

    pub fn unsupported_response_type(description: impl Into<String>) -> Self {
        Self::new(UNSUPPORTED_RESPONSE_TYPE, description, Status::BadRequest)
    }

    pub fn invalid_scope(description: impl Into<String>) -> Self {
        Self::new(INVALID_SCOPE, description, Status::BadRequest)
    }

    pub fn access_denied(description: impl Into<String>) -> Self {
        Self::new(ACCESS_DENIED, description, Status::BadRequest)
    }

    pub fn login_required() -> Self {
        Self::new(
            LOGIN_REQUIRED,
            "End-user authentication is required",
            Status::BadRequest,
        )
    }

    pub fn consent_required() -> Self {
        Self::new(
            CONSENT_REQUIRED,
            "End-user consent is required",
            Status::BadRequest,
        )
    }

    /// Bearer token failure; carries the RFC 6750 challenge
    pub fn invalid_token(description: impl Into<String>) -> Self {
        let description = description.into();
        let mut err = Self::new(INVALID_TOKEN, description.clone(), Status::Unauthorized);
        err.www_authenticate = Some(format!(
            r#"Bearer error="invalid_token", error_description="{}""#,
            description
        ));
        err
    }

    pub fn insufficient_scope(description: impl Into<String>) -> Self {
        let description = description.into();
        let mut err = Self::new(INSUFFICIENT_SCOPE, description.clone(), Status::Forbidden);
        err.www_authenticate = Some(format!(
            r#"Bearer error="insufficient_scope", error_description="{}""#,
            description
        ));
        err
    }

    pub fn invalid_client_metadata(description: impl Into<String>) -> Self {
        Self::new(INVALID_CLIENT_METADATA, description, Status::BadRequest)
    }

    pub fn invalid_redirect_uri(description: impl Into<String>) -> Self {
        Self::new(INVALID_REDIRECT_URI, description, Status::BadRequest)
    }

    pub fn registration_not_supported() -> Self {
        Self::new(
            REGISTRATION_NOT_SUPPORTED,
            "Dynamic client registration is disabled",
            Status::NotFound,
        )
    }

    pub fn not_implemented(description: impl Into<String>) -> Self {
        Self::new("not_implemented", description, Status::NotImplemented)
    }

    /// Internal failure. The detail goes to the log, never to the client.
    pub fn server_error(detail: impl fmt::Display) -> Self {
        let correlation = crate::crypto::random::opaque_token();
        log::error!("server_error [{}]: {}", &correlation[..8], detail);
        Self::new(
            SERVER_ERROR,
            "The authorization server encountered an unexpected condition",
            Status::InternalServerError,
        )
    }
}

impl From<crate::storage::StorageError> for OAuthError {
    fn from(err: crate::storage::StorageError) -> Self {
        OAuthError::server_error(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<String>,
}

impl<'r> Responder<'r, 'static> for OAuthError {
    fn respond_to(self, _: &'r Request<'_>) -> rocket::response::Result<'static> {
        let body = serde_json::to_string(&ErrorBody {
            error: self.code.to_string(),
            error_description: self.description.clone(),
            state: self.state.clone(),
        })
        .unwrap_or_else(|_| format!(r#"{{"error":"{}"}}"#, self.code));

        let mut response = Response::build();
        response
            .status(self.status)
            .header(ContentType::JSON)
            .sized_body(body.len(), std::io::Cursor::new(body));
        if let Some(challenge) = self.www_authenticate {
            response.raw_header("WWW-Authenticate", challenge);
        }
        response.ok()
    }
}

/// How parameters are carried back to the client on a redirect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Code flow: URL query
    Query,
    /// Implicit and hybrid flows: URL fragment
    Fragment,
}

/// Response mode implied by a (normalized) response_type value
pub fn response_mode_for(response_type: &str) -> ResponseMode {
    if response_type == "code" {
        ResponseMode::Query
    } else {
        ResponseMode::Fragment
    }
}

/// Appends parameters to a redirect URI in the given mode.
///
/// Query mode respects an existing query string on the registered URI;
/// fragment mode always replaces the (validated-absent) fragment.
pub fn append_params(redirect_uri: &str, mode: ResponseMode, params: &[(&str, &str)]) -> String {
    let encoded = serde_urlencoded::to_string(params).unwrap_or_default();
    match mode {
        ResponseMode::Query => {
            let separator = if redirect_uri.contains('?') { '&' } else { '?' };
            format!("{}{}{}", redirect_uri, separator, encoded)
        }
        ResponseMode::Fragment => format!("{}#{}", redirect_uri, encoded),
    }
}

/// Builds the error redirect for a validated redirect URI
pub fn error_redirect(redirect_uri: &str, mode: ResponseMode, error: &OAuthError) -> String {
    let mut params: Vec<(&str, &str)> = vec![
        ("error", error.code),
        ("error_description", error.description.as_str()),
    ];
    if let Some(state) = error.state.as_deref() {
        params.push(("state", state));
    }
    append_params(redirect_uri, mode, &params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_flow_errors_use_the_query() {
        let err = OAuthError::access_denied("denied").with_state(Some("xyz".to_string()));
        let url = error_redirect("https://app.example/cb", ResponseMode::Query, &err);
        assert!(url.starts_with("https://app.example/cb?"));
        assert!(url.contains("error=access_denied"));
        assert!(url.contains("state=xyz"));
        assert!(!url.contains('#'));
    }

    #[test]
    fn implicit_errors_use_the_fragment() {
        let err = OAuthError::login_required();
        let url = error_redirect("https://app.example/cb", ResponseMode::Fragment, &err);
        assert!(url.starts_with("https://app.example/cb#"));
        assert!(url.contains("error=login_required"));
    }

    #[test]
    fn existing_query_is_preserved() {
        let url = append_params(
            "https://app.example/cb?tenant=t1",
            ResponseMode::Query,
            &[("code", "abc")],
        );
        assert_eq!(url, "https://app.example/cb?tenant=t1&code=abc");
    }

    #[test]
    fn response_mode_follows_the_flow() {
        assert_eq!(response_mode_for("code"), ResponseMode::Query);
        assert_eq!(response_mode_for("id_token"), ResponseMode::Fragment);
        assert_eq!(response_mode_for("token id_token"), ResponseMode::Fragment);
    }
}
