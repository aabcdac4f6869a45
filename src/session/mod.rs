// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Session management
//!
//! Two session kinds exist and stay strictly separate:
//!
//! - the **auth session** (`auth_session` cookie) is the transient context of
//!   one authorization request, 10-minute TTL, aggressively evictable
//! - the **user session** (`user_session` cookie) is the authoritative SSO
//!   anchor created at login, 24-hour TTL, carrying `auth_time`, the
//!   authentication method and ACR/AMR
//!
//! Both cookies are HttpOnly, SameSite=Lax, Path=/ and Secure whenever the
//! server terminates TLS. Cookie values are the opaque server-side session
//! ids; everything else lives in storage. Expired records are reclaimed by
//! the hourly sweep in [`crate::daemon`].

use chrono::{DateTime, Duration, Utc};
use rocket::http::{Cookie, SameSite};

use crate::crypto::random::session_id;
use crate::storage::models::UserSession;

/// Cookie addressing the transient authorization-request session
pub const AUTH_SESSION_COOKIE: &str = "auth_session";

/// Cookie addressing the long-lived SSO session
pub const USER_SESSION_COOKIE: &str = "user_session";

/// `amr` entry for password logins
pub const AMR_PASSWORD: &str = "pwd";

/// Whether an authentication instant still satisfies `max_age`.
///
/// `max_age == 0` is never fresh: the client demands re-authentication.
pub fn is_auth_time_fresh(auth_time: DateTime<Utc>, max_age: i64, now: DateTime<Utc>) -> bool {
    if max_age == 0 {
        return false;
    }
    now.signed_duration_since(auth_time) <= Duration::seconds(max_age)
}

/// Builds a session cookie with the provider's cookie discipline
pub fn session_cookie(
    name: &'static str,
    value: String,
    ttl: Duration,
    secure: bool,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path("/");
    cookie.set_secure(secure);
    cookie.set_max_age(rocket::time::Duration::seconds(ttl.num_seconds()));
    cookie
}

/// A cookie that removes the named session cookie from the user agent
pub fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, "");
    cookie.set_path("/");
    cookie.set_max_age(rocket::time::Duration::seconds(0));
    cookie
}

/// Creates the SSO session record for a successful password login
pub fn new_password_session(user_id: &str, ttl: Duration) -> UserSession {
    let now = Utc::now();
    UserSession {
        id: session_id(),
        user_id: user_id.to_string(),
        auth_time: now,
        authentication_method: "password".to_string(),
        acr: "1".to_string(),
        amr: vec![AMR_PASSWORD.to_string()],
        last_activity_at: now,
        expires_at: now + ttl,
        created_at: now,
    }
}
