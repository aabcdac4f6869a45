// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Administrative API boundary

mod common;

use chrono::Utc;
use common::*;
use rust_oidc_provider::storage::Storage;
use rocket::http::{ContentType, Header, Status};
use rust_oidc_provider::storage::models::{User, UserRole};
use serde_json::{json, Value};

/// Seeds an admin principal plus a live access token for them
async fn seed_admin(provider: &TestProvider) -> String {
    let user = User::new(
        "user-root",
        "root",
        "root@example.org",
        pwhash::bcrypt::hash("rootpw").unwrap(),
        UserRole::Admin,
    );
    provider.storage.create_user(user).await.unwrap();
    seed_web_client(provider).await;
    let token = rust_oidc_provider::storage::models::Token {
        id: "tok-admin".to_string(),
        access_token: "admin-access".to_string(),
        refresh_token: None,
        token_type: "Bearer".to_string(),
        scope: "openid".to_string(),
        user_id: "user-root".to_string(),
        client_id: "web-app".to_string(),
        authorization_code_id: None,
        created_at: Utc::now(),
        expires_at: Utc::now() + chrono::Duration::hours(1),
    };
    provider.storage.put_token(token).await.unwrap();
    "admin-access".to_string()
}

fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {}", token))
}

#[rocket::async_test]
async fn admin_routes_require_an_admin_bearer() {
    let provider = provider().await;
    seed_user(&provider).await;
    seed_admin(&provider).await;

    // No token at all
    let response = provider.client.get("/admin/api/users").dispatch().await;
    assert_eq!(response.status(), Status::Unauthorized);

    // A non-admin user's token
    seed_token(&provider, "tok-user", "user-access", None, "web-app", "openid", None).await;
    let response = provider
        .client
        .get("/admin/api/users")
        .header(bearer("user-access"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);
}

#[rocket::async_test]
async fn user_crud_cascades_on_delete() {
    let provider = provider().await;
    let admin_token = seed_admin(&provider).await;

    // Create
    let response = provider
        .client
        .post("/admin/api/users")
        .header(ContentType::JSON)
        .header(bearer(&admin_token))
        .body(
            json!({
                "username": "bob",
                "email": "bob@example.org",
                "password": "bobpw123",
                "name": "Bob"
            })
            .to_string(),
        )
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let created: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    let bob_id = created["id"].as_str().unwrap().to_string();
    assert!(created.get("password_hash").is_none(), "no credential leakage");

    // Bob gets a token and a consent
    seed_token(&provider, "tok-bob", "bob-access", None, "web-app", "openid", None).await;
    let mut bob_token = provider.storage.get_token("tok-bob").await.unwrap().unwrap();
    bob_token.user_id = bob_id.clone();
    provider.storage.delete_token("tok-bob").await.unwrap();
    provider.storage.put_token(bob_token).await.unwrap();

    // Update
    let response = provider
        .client
        .put(format!("/admin/api/users/{}", bob_id))
        .header(ContentType::JSON)
        .header(bearer(&admin_token))
        .body(json!({ "email_verified": true, "locale": "de-DE" }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let updated: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    assert_eq!(updated["email_verified"], true);

    // Delete removes the user and what they own
    let response = provider
        .client
        .delete(format!("/admin/api/users/{}", bob_id))
        .header(bearer(&admin_token))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::NoContent);
    assert!(provider.storage.get_user(&bob_id).await.unwrap().is_none());
    assert!(provider
        .storage
        .get_token_by_access("bob-access")
        .await
        .unwrap()
        .is_none());
}

#[rocket::async_test]
async fn key_listing_shows_no_private_material_and_rotation_works() {
    let provider = provider().await;
    let admin_token = seed_admin(&provider).await;

    let response = provider
        .client
        .get("/admin/api/keys")
        .header(bearer(&admin_token))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body = response.into_string().await.unwrap();
    assert!(!body.contains("PRIVATE KEY"), "private PEM must never leave");
    let keys: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(keys.as_array().unwrap().len(), 1);

    let response = provider
        .client
        .post("/admin/api/keys/rotate")
        .header(bearer(&admin_token))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let response = provider
        .client
        .get("/admin/api/keys")
        .header(bearer(&admin_token))
        .dispatch()
        .await;
    let keys: Value =
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    let keys = keys.as_array().unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(
        keys.iter().filter(|k| k["is_active"] == true).count(),
        1,
        "exactly one active key after rotation"
    );
}

#[rocket::async_test]
async fn settings_edit_without_a_config_file_is_501() {
    // The test provider runs with config_path = None
    let provider = provider().await;
    let admin_token = seed_admin(&provider).await;

    let response = provider
        .client
        .put("/admin/api/settings")
        .header(ContentType::JSON)
        .header(bearer(&admin_token))
        .body(json!({ "token_expiry_minutes": 30 }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::NotImplemented);
}

#[rocket::async_test]
async fn settings_are_readable() {
    let provider = provider().await;
    let admin_token = seed_admin(&provider).await;

    let response = provider
        .client
        .get("/admin/api/settings")
        .header(bearer(&admin_token))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let settings: Value =
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    assert_eq!(settings["oidc"]["token_expiry_minutes"], 60);
    assert_eq!(settings["registration"]["enabled"], true);
    assert!(settings.get("server").is_none(), "cookie secret stays private");
}
