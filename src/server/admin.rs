// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Administrative JSON API (boundary surface)
//!
//! CRUD over users, clients, signing keys and a small settings document,
//! guarded by a bearer access token whose user holds the admin role. The
//! embedded admin SPA consuming this API is an external collaborator.
//!
//! Settings edits either persist through the configuration file the server
//! was started with or are refused with 501; there is no memory-only mutation.

use chrono::Utc;
use log::info;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{delete, get, post, put, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::guards::AdminUser;
use super::ProviderState;
use crate::config::{OidcConfig, RegistrationConfig};
use crate::oauth::error::OAuthError;
use crate::storage::models::{User, UserRole};
use crate::storage::Storage;

fn require_admin(admin: Option<AdminUser>) -> Result<AdminUser, OAuthError> {
    admin.ok_or_else(|| OAuthError::invalid_token("Administrator access token required"))
}

/// User record as exposed to the admin API (no credential material)
#[derive(Debug, Serialize)]
pub struct AdminUserView {
    pub id: String,
    pub username: String,
    pub email: String,
    pub email_verified: bool,
    pub role: UserRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

impl From<&User> for AdminUserView {
    fn from(user: &User) -> Self {
        AdminUserView {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            email_verified: user.email_verified,
            role: user.role,
            name: user.name.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[get("/users")]
pub async fn list_users(
    admin: Option<AdminUser>,
    state: &State<ProviderState>,
) -> Result<Json<Vec<AdminUserView>>, OAuthError> {
    require_admin(admin)?;
    let users = state.ctx.storage.list_users().await?;
    Ok(Json(users.iter().map(AdminUserView::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<UserRole>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

#[post("/users", data = "<body>", format = "json")]
pub async fn create_user(
    body: Json<CreateUserRequest>,
    admin: Option<AdminUser>,
    state: &State<ProviderState>,
) -> Result<Json<AdminUserView>, OAuthError> {
    let admin = require_admin(admin)?;
    let body = body.into_inner();

    let password_hash =
        pwhash::bcrypt::hash(&body.password).map_err(OAuthError::server_error)?;
    let mut user = User::new(
        Uuid::new_v4().to_string(),
        body.username,
        body.email,
        password_hash,
        body.role.unwrap_or(UserRole::User),
    );
    user.name = body.name;
    user.email_verified = body.email_verified;

    state.ctx.storage.create_user(user.clone()).await.map_err(|e| match e {
        crate::storage::StorageError::DuplicateKey(what) => {
            OAuthError::invalid_request(format!("Already taken: {}", what))
        }
        other => OAuthError::server_error(other),
    })?;
    info!("Admin {} created user {}", admin.0.username, user.username);
    Ok(Json(AdminUserView::from(&user)))
}

#[get("/users/<id>")]
pub async fn get_user(
    id: &str,
    admin: Option<AdminUser>,
    state: &State<ProviderState>,
) -> Result<Json<AdminUserView>, OAuthError> {
    require_admin(admin)?;
    let user = state
        .ctx
        .storage
        .get_user(id)
        .await?
        .ok_or_else(|| OAuthError::new("not_found", "No such user", Status::NotFound))?;
    Ok(Json(AdminUserView::from(&user)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<UserRole>,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
    pub locale: Option<String>,
    pub email_verified: Option<bool>,
}

#[put("/users/<id>", data = "<body>", format = "json")]
pub async fn update_user(
    id: &str,
    body: Json<UpdateUserRequest>,
    admin: Option<AdminUser>,
    state: &State<ProviderState>,
) -> Result<Json<AdminUserView>, OAuthError> {
    require_admin(admin)?;
    let mut user = state
        .ctx
        .storage
        .get_user(id)
        .await?
        .ok_or_else(|| OAuthError::new("not_found", "No such user", Status::NotFound))?;

    let body = body.into_inner();
    if let Some(email) = body.email {
        user.email = email;
    }
    if let Some(password) = body.password {
        user.password_hash =
            pwhash::bcrypt::hash(&password).map_err(OAuthError::server_error)?;
    }
    if let Some(role) = body.role {
        user.role = role;
    }
    if let Some(email_verified) = body.email_verified {
        user.email_verified = email_verified;
    }
    user.name = body.name.or(user.name);
    user.given_name = body.given_name.or(user.given_name);
    user.family_name = body.family_name.or(user.family_name);
    user.picture = body.picture.or(user.picture);
    user.locale = body.locale.or(user.locale);
    user.updated_at = Utc::now();

    state.ctx.storage.update_user(user.clone()).await?;
    Ok(Json(AdminUserView::from(&user)))
}

#[delete("/users/<id>")]
pub async fn delete_user(
    id: &str,
    admin: Option<AdminUser>,
    state: &State<ProviderState>,
) -> Result<Status, OAuthError> {
    let admin = require_admin(admin)?;
    // Deleting a user cascades to their tokens, sessions and consents
    if state.ctx.storage.delete_user(id).await? {
        info!("Admin {} deleted user {}", admin.0.username, id);
        Ok(Status::NoContent)
    } else {
        Err(OAuthError::new("not_found", "No such user", Status::NotFound))
    }
}

#[get("/clients")]
pub async fn list_clients(
    admin: Option<AdminUser>,
    state: &State<ProviderState>,
) -> Result<Json<Vec<crate::storage::models::Client>>, OAuthError> {
    require_admin(admin)?;
    Ok(Json(state.ctx.storage.list_clients().await?))
}

#[delete("/clients/<id>")]
pub async fn delete_client(
    id: &str,
    admin: Option<AdminUser>,
    state: &State<ProviderState>,
) -> Result<Status, OAuthError> {
    let admin = require_admin(admin)?;
    if state.ctx.storage.delete_client(id).await? {
        info!("Admin {} deleted client {}", admin.0.username, id);
        Ok(Status::NoContent)
    } else {
        Err(OAuthError::new("not_found", "No such client", Status::NotFound))
    }
}

/// Signing key as exposed to the admin API: public facts only
#[derive(Debug, Serialize)]
pub struct AdminKeyView {
    pub kid: String,
    pub algorithm: String,
    pub is_active: bool,
    pub created_at: chrono::DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<chrono::DateTime<Utc>>,
}

#[get("/keys")]
pub async fn list_keys(
    admin: Option<AdminUser>,
    state: &State<ProviderState>,
) -> Result<Json<Vec<AdminKeyView>>, OAuthError> {
    require_admin(admin)?;
    let keys = state.ctx.storage.list_signing_keys().await?;
    Ok(Json(
        keys.iter()
            .map(|k| AdminKeyView {
                kid: k.kid.clone(),
                algorithm: k.algorithm.clone(),
                is_active: k.is_active,
                created_at: k.created_at,
                expires_at: k.expires_at,
            })
            .collect(),
    ))
}

#[post("/keys/rotate")]
pub async fn rotate_keys(
    admin: Option<AdminUser>,
    state: &State<ProviderState>,
) -> Result<Json<AdminKeyView>, OAuthError> {
    let admin = require_admin(admin)?;
    let key = state
        .ctx
        .keys
        .rotate()
        .await
        .map_err(OAuthError::server_error)?;
    info!("Admin {} rotated the signing key to {}", admin.0.username, key.kid);
    Ok(Json(AdminKeyView {
        kid: key.kid,
        algorithm: key.algorithm,
        is_active: key.is_active,
        created_at: key.created_at,
        expires_at: key.expires_at,
    }))
}

/// The editable settings document
#[derive(Debug, Serialize)]
pub struct SettingsView {
    pub oidc: OidcConfig,
    pub registration: RegistrationConfig,
}

#[get("/settings")]
pub async fn get_settings(
    admin: Option<AdminUser>,
    state: &State<ProviderState>,
) -> Result<Json<SettingsView>, OAuthError> {
    require_admin(admin)?;
    let config = state.config.read().await;
    Ok(Json(SettingsView {
        oidc: config.oidc.clone(),
        registration: config.registration.clone(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SettingsUpdate {
    pub token_expiry_minutes: Option<i64>,
    pub code_expiry_seconds: Option<i64>,
    pub registration_enabled: Option<bool>,
    pub require_initial_access_token: Option<bool>,
}

/// Persists a settings edit through the configuration file
///
/// `PUT /admin/api/settings`. Without a configuration file to persist into,
/// the edit is refused with 501: a setting that would silently vanish on
/// restart is worse than one that cannot be changed.
#[put("/settings", data = "<body>", format = "json")]
pub async fn put_settings(
    body: Json<SettingsUpdate>,
    admin: Option<AdminUser>,
    state: &State<ProviderState>,
) -> Result<Json<SettingsView>, OAuthError> {
    let admin = require_admin(admin)?;
    let config_path = state.config_path.clone().ok_or_else(|| {
        OAuthError::not_implemented("No configuration file to persist settings into")
    })?;

    let mut config = state.config.write().await;
    let body = body.into_inner();
    if let Some(minutes) = body.token_expiry_minutes {
        config.oidc.token_expiry_minutes = minutes;
    }
    if let Some(seconds) = body.code_expiry_seconds {
        config.oidc.code_expiry_seconds = seconds;
    }
    if let Some(enabled) = body.registration_enabled {
        config.registration.enabled = enabled;
    }
    if let Some(required) = body.require_initial_access_token {
        config.registration.require_initial_access_token = required;
    }

    crate::config::utils::validate_specific_rules(&config)
        .map_err(|e| OAuthError::invalid_request(e.to_string()))?;
    config
        .save_to_file(&config_path)
        .map_err(OAuthError::server_error)?;
    info!("Admin {} updated settings", admin.0.username);

    Ok(Json(SettingsView {
        oidc: config.oidc.clone(),
        registration: config.registration.clone(),
    }))
}
