// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Scope parsing and scope-driven claim projection
//!
//! Scopes travel as space-separated strings on the wire. The claim
//! projection here is the single source of truth for which user attributes a
//! scope unlocks; both the ID token and the userinfo endpoint go through it,
//! so the two can never drift apart.

use serde_json::{Map, Value};

use crate::storage::models::User;

pub const SCOPE_OPENID: &str = "openid";
pub const SCOPE_PROFILE: &str = "profile";
pub const SCOPE_EMAIL: &str = "email";
pub const SCOPE_ADDRESS: &str = "address";
pub const SCOPE_PHONE: &str = "phone";

/// Scopes the provider understands, advertised in the discovery document
pub const SUPPORTED_SCOPES: &[&str] = &[
    SCOPE_OPENID,
    SCOPE_PROFILE,
    SCOPE_EMAIL,
    SCOPE_ADDRESS,
    SCOPE_PHONE,
];

/// Claims that can appear given the right scope, advertised in discovery
pub const SUPPORTED_CLAIMS: &[&str] = &[
    "sub",
    "name",
    "given_name",
    "family_name",
    "middle_name",
    "nickname",
    "preferred_username",
    "profile",
    "picture",
    "website",
    "gender",
    "birthdate",
    "zoneinfo",
    "locale",
    "updated_at",
    "email",
    "email_verified",
    "address",
    "phone_number",
    "phone_number_verified",
];

/// Splits a space-separated scope string, dropping duplicates but keeping
/// first-seen order
pub fn parse_scopes(scope: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for token in scope.split_whitespace() {
        if !seen.iter().any(|s: &String| s == token) {
            seen.push(token.to_string());
        }
    }
    seen
}

pub fn contains_openid(scope: &str) -> bool {
    scope.split_whitespace().any(|s| s == SCOPE_OPENID)
}

/// True when every element of `requested` appears in `granted`
pub fn is_subset(requested: &[String], granted: &[String]) -> bool {
    requested.iter().all(|r| granted.iter().any(|g| g == r))
}

fn put_opt(claims: &mut Map<String, Value>, name: &str, value: &Option<String>) {
    if let Some(value) = value {
        claims.insert(name.to_string(), Value::String(value.clone()));
    }
}

/// Projects the claim set a scope list unlocks for a user.
///
/// `sub` is always present; everything else appears exactly when its scope
/// was granted and the user actually has the attribute. No scope ever leaks
/// a claim it does not name.
pub fn user_claims_for_scopes(user: &User, scopes: &[String]) -> Map<String, Value> {
    let mut claims = Map::new();
    claims.insert("sub".to_string(), Value::String(user.id.clone()));

    for scope in scopes {
        match scope.as_str() {
            SCOPE_PROFILE => {
                put_opt(&mut claims, "name", &user.name);
                put_opt(&mut claims, "given_name", &user.given_name);
                put_opt(&mut claims, "family_name", &user.family_name);
                put_opt(&mut claims, "middle_name", &user.middle_name);
                put_opt(&mut claims, "nickname", &user.nickname);
                put_opt(&mut claims, "preferred_username", &user.preferred_username);
                put_opt(&mut claims, "profile", &user.profile);
                put_opt(&mut claims, "picture", &user.picture);
                put_opt(&mut claims, "website", &user.website);
                put_opt(&mut claims, "gender", &user.gender);
                put_opt(&mut claims, "birthdate", &user.birthdate);
                put_opt(&mut claims, "zoneinfo", &user.zoneinfo);
                put_opt(&mut claims, "locale", &user.locale);
                claims.insert(
                    "updated_at".to_string(),
                    Value::Number(user.updated_at.timestamp().into()),
                );
            }
            SCOPE_EMAIL => {
                claims.insert("email".to_string(), Value::String(user.email.clone()));
                // Always the stored flag, never synthesized
                claims.insert("email_verified".to_string(), Value::Bool(user.email_verified));
            }
            SCOPE_ADDRESS => {
                if let Some(address) = &user.address {
                    if let Ok(value) = serde_json::to_value(address) {
                        claims.insert("address".to_string(), value);
                    }
                }
            }
            SCOPE_PHONE => {
                put_opt(&mut claims, "phone_number", &user.phone_number);
                if let Some(verified) = user.phone_number_verified {
                    claims.insert("phone_number_verified".to_string(), Value::Bool(verified));
                }
            }
            _ => {}
        }
    }

    claims
}
