// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Dynamic client registration endpoints (RFC 7591) and the registration
//! management API (RFC 7592)
//!
//! `POST /register` creates a client after metadata validation; the response
//! carries the registration access token and the management URI. The
//! management endpoints authenticate by that token and answer 401 on *any*
//! failure, including an unknown client id, so the API cannot be used to
//! enumerate registered clients.

use log::{debug, info};
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{delete, get, post, put, State};
use serde_json::{Map, Value};

use super::guards::{BearerToken, ConnectionInfo};
use super::ProviderState;
use crate::crypto::pkce::constant_time_eq;
use crate::oauth::error::OAuthError;
use crate::oauth::registration::{validate_and_build_client, ClientMetadata};
use crate::storage::models::Client;
use crate::storage::Storage;

/// RFC 7591 §3.2.1 response document for a client
fn registration_response_json(client: &Client, base_url: &str) -> Value {
    let mut doc = Map::new();
    doc.insert("client_id".into(), Value::String(client.id.clone()));
    if let Some(secret) = &client.secret {
        doc.insert("client_secret".into(), Value::String(secret.clone()));
    }
    doc.insert(
        "client_secret_expires_at".into(),
        Value::Number(client.secret_expires_at.into()),
    );
    doc.insert(
        "client_id_issued_at".into(),
        Value::Number(client.client_id_issued_at.timestamp().into()),
    );
    doc.insert(
        "redirect_uris".into(),
        serde_json::to_value(&client.redirect_uris).unwrap_or_default(),
    );
    doc.insert(
        "response_types".into(),
        serde_json::to_value(&client.response_types).unwrap_or_default(),
    );
    doc.insert(
        "grant_types".into(),
        serde_json::to_value(&client.grant_types).unwrap_or_default(),
    );
    doc.insert(
        "application_type".into(),
        serde_json::to_value(client.application_type).unwrap_or_default(),
    );
    doc.insert(
        "token_endpoint_auth_method".into(),
        serde_json::to_value(client.token_endpoint_auth_method).unwrap_or_default(),
    );
    doc.insert(
        "subject_type".into(),
        serde_json::to_value(client.subject_type).unwrap_or_default(),
    );
    doc.insert(
        "id_token_signed_response_alg".into(),
        Value::String(client.id_token_signed_response_alg.clone()),
    );
    doc.insert("scope".into(), Value::String(client.scope.clone()));
    if !client.contacts.is_empty() {
        doc.insert(
            "contacts".into(),
            serde_json::to_value(&client.contacts).unwrap_or_default(),
        );
    }
    for (field, value) in [
        ("client_name", &client.client_name),
        ("client_uri", &client.client_uri),
        ("logo_uri", &client.logo_uri),
        ("policy_uri", &client.policy_uri),
        ("tos_uri", &client.tos_uri),
        ("jwks_uri", &client.jwks_uri),
    ] {
        if let Some(value) = value {
            doc.insert(field.into(), Value::String(value.clone()));
        }
    }
    if let Some(jwks) = &client.jwks {
        doc.insert("jwks".into(), jwks.clone());
    }
    if let Some(max_age) = client.default_max_age {
        doc.insert("default_max_age".into(), Value::Number(max_age.into()));
    }
    doc.insert(
        "require_auth_time".into(),
        Value::Bool(client.require_auth_time),
    );
    if let Some(token) = &client.registration_access_token {
        doc.insert(
            "registration_access_token".into(),
            Value::String(token.clone()),
        );
    }
    doc.insert(
        "registration_client_uri".into(),
        Value::String(format!("{}/register/{}", base_url, client.id)),
    );
    Value::Object(doc)
}

/// Client registration endpoint
///
/// `POST /register`
#[post("/register", data = "<metadata>", format = "json")]
pub async fn register(
    metadata: Json<ClientMetadata>,
    bearer: Option<BearerToken>,
    connection: ConnectionInfo,
    state: &State<ProviderState>,
) -> Result<status::Created<Json<Value>>, OAuthError> {
    let registration = {
        let config = state.config.read().await;
        config.registration.clone()
    };
    if !registration.enabled {
        return Err(OAuthError::registration_not_supported());
    }

    let client = validate_and_build_client(metadata.into_inner())?;

    if registration.require_initial_access_token {
        let bearer = bearer.ok_or_else(|| {
            OAuthError::invalid_token("Registration requires an initial access token")
        })?;
        // Single use: the CAS stamps the new client id into the token record
        let consumed = state
            .ctx
            .storage
            .consume_initial_access_token(&bearer.0, &client.id)
            .await?;
        if !consumed {
            return Err(OAuthError::invalid_token(
                "Initial access token is unknown or already used",
            ));
        }
    }

    state.ctx.storage.create_client(client.clone()).await?;
    info!("Registered client {} via dynamic registration", client.id);

    let body = registration_response_json(&client, &connection.base_url);
    let location = format!("{}/register/{}", connection.base_url, client.id);
    Ok(status::Created::new(location).body(Json(body)))
}

/// Resolves a managed client, authenticating by its registration access
/// token. Every failure is the same 401: existence is never disclosed.
async fn managed_client(
    state: &ProviderState,
    client_id: &str,
    bearer: Option<BearerToken>,
) -> Result<Client, OAuthError> {
    let bearer = bearer
        .ok_or_else(|| OAuthError::invalid_token("Missing registration access token"))?;
    let client = state
        .ctx
        .storage
        .get_client(client_id)
        .await?
        .ok_or_else(|| OAuthError::invalid_token("Registration access token does not match"))?;
    match &client.registration_access_token {
        Some(expected) if constant_time_eq(expected.as_bytes(), bearer.0.as_bytes()) => Ok(client),
        _ => Err(OAuthError::invalid_token(
            "Registration access token does not match",
        )),
    }
}

/// Reads the stored registration
///
/// `GET /register/<client_id>`
#[get("/register/<client_id>")]
pub async fn client_get(
    client_id: &str,
    bearer: Option<BearerToken>,
    connection: ConnectionInfo,
    state: &State<ProviderState>,
) -> Result<Json<Value>, OAuthError> {
    let client = managed_client(state, client_id, bearer).await?;
    Ok(Json(registration_response_json(&client, &connection.base_url)))
}

/// Replaces the registration's mutable metadata
///
/// `PUT /register/<client_id>`. Immutable fields (client id, secret,
/// registration access token, issuance timestamps) survive the update.
#[put("/register/<client_id>", data = "<metadata>", format = "json")]
pub async fn client_update(
    client_id: &str,
    metadata: Json<ClientMetadata>,
    bearer: Option<BearerToken>,
    connection: ConnectionInfo,
    state: &State<ProviderState>,
) -> Result<Json<Value>, OAuthError> {
    let existing = managed_client(state, client_id, bearer).await?;

    let mut updated = validate_and_build_client(metadata.into_inner())?;
    updated.id = existing.id.clone();
    updated.secret = existing.secret.clone();
    updated.secret_expires_at = existing.secret_expires_at;
    updated.registration_access_token = existing.registration_access_token.clone();
    updated.client_id_issued_at = existing.client_id_issued_at;
    updated.created_at = existing.created_at;
    updated.updated_at = chrono::Utc::now();

    state.ctx.storage.update_client(updated.clone()).await?;
    debug!("Updated registration of client {}", updated.id);
    Ok(Json(registration_response_json(&updated, &connection.base_url)))
}

/// Deprovisions the client
///
/// `DELETE /register/<client_id>`
#[delete("/register/<client_id>")]
pub async fn client_delete(
    client_id: &str,
    bearer: Option<BearerToken>,
    state: &State<ProviderState>,
) -> Result<Status, OAuthError> {
    let client = managed_client(state, client_id, bearer).await?;
    state.ctx.storage.delete_client(&client.id).await?;
    info!("Deprovisioned client {}", client.id);
    Ok(Status::NoContent)
}
