// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Dynamic client registration (RFC 7591) and management (RFC 7592)

mod common;

use common::*;
use rust_oidc_provider::storage::Storage;
use rocket::http::{ContentType, Header, Status};
use serde_json::{json, Value};

async fn register(provider: &TestProvider, body: Value) -> (Status, Value) {
    let response = provider
        .client
        .post("/register")
        .header(ContentType::JSON)
        .body(body.to_string())
        .dispatch()
        .await;
    let status = response.status();
    let json: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    (status, json)
}

fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {}", token))
}

#[rocket::async_test]
async fn register_read_update_delete_lifecycle() {
    let provider = provider().await;

    // Create
    let (status, doc) = register(
        &provider,
        json!({
            "redirect_uris": ["https://app.example/cb"],
            "client_name": "A"
        }),
    )
    .await;
    assert_eq!(status, Status::Created);
    let client_id = doc["client_id"].as_str().expect("client_id").to_string();
    let secret = doc["client_secret"].as_str().expect("confidential by default");
    assert!(!secret.is_empty());
    let registration_token = doc["registration_access_token"]
        .as_str()
        .expect("registration access token")
        .to_string();
    let management_uri = doc["registration_client_uri"]
        .as_str()
        .expect("management uri")
        .to_string();
    assert!(management_uri.ends_with(&format!("/register/{}", client_id)));
    // Defaults applied per OIDC registration
    assert_eq!(doc["response_types"], json!(["code"]));
    assert_eq!(doc["grant_types"], json!(["authorization_code"]));
    assert_eq!(doc["token_endpoint_auth_method"], "client_secret_basic");
    assert_eq!(doc["id_token_signed_response_alg"], "RS256");

    let path = format!("/register/{}", client_id);

    // Read with the right token
    let response = provider
        .client
        .get(path.clone())
        .header(bearer(&registration_token))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let read: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    assert_eq!(read["client_id"], client_id.as_str());
    assert_eq!(read["client_name"], "A");

    // Read with a wrong token: 401, never 404
    let response = provider
        .client
        .get(path.clone())
        .header(bearer("wrong-token"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);

    // Update keeps immutable fields
    let response = provider
        .client
        .put(path.clone())
        .header(ContentType::JSON)
        .header(bearer(&registration_token))
        .body(
            json!({
                "redirect_uris": ["https://app.example/cb", "https://app.example/cb2"],
                "client_name": "A renamed"
            })
            .to_string(),
        )
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let updated: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    assert_eq!(updated["client_id"], client_id.as_str());
    assert_eq!(updated["client_secret"], doc["client_secret"]);
    assert_eq!(
        updated["registration_access_token"],
        doc["registration_access_token"]
    );
    assert_eq!(updated["client_id_issued_at"], doc["client_id_issued_at"]);
    assert_eq!(updated["client_name"], "A renamed");
    assert_eq!(
        updated["redirect_uris"],
        json!(["https://app.example/cb", "https://app.example/cb2"])
    );

    // Delete
    let response = provider
        .client
        .delete(path.clone())
        .header(bearer(&registration_token))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::NoContent);

    // The client is gone, but the management API still answers 401
    let response = provider
        .client
        .get(path)
        .header(bearer(&registration_token))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);
}

#[rocket::async_test]
async fn invalid_metadata_is_rejected() {
    let provider = provider().await;

    // No redirect URIs at all
    let (status, doc) = register(&provider, json!({ "client_name": "A" })).await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(doc["error"], "invalid_redirect_uri");

    // http for a web client
    let (status, doc) = register(
        &provider,
        json!({ "redirect_uris": ["http://app.example/cb"] }),
    )
    .await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(doc["error"], "invalid_redirect_uri");

    // Inconsistent grants
    let (status, doc) = register(
        &provider,
        json!({
            "redirect_uris": ["https://app.example/cb"],
            "response_types": ["id_token"],
            "grant_types": ["authorization_code"]
        }),
    )
    .await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(doc["error"], "invalid_client_metadata");

    // jwks and jwks_uri together
    let (status, doc) = register(
        &provider,
        json!({
            "redirect_uris": ["https://app.example/cb"],
            "jwks": {"keys": []},
            "jwks_uri": "https://app.example/jwks.json"
        }),
    )
    .await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(doc["error"], "invalid_client_metadata");
}

#[rocket::async_test]
async fn registered_client_can_run_the_code_flow() {
    let provider = provider().await;
    seed_user(&provider).await;

    let (status, doc) = register(
        &provider,
        json!({
            "redirect_uris": ["https://fresh.example/cb"],
            "grant_types": ["authorization_code", "refresh_token"],
            "client_name": "Fresh RP",
            "scope": "openid profile"
        }),
    )
    .await;
    assert_eq!(status, Status::Created);
    let client_id = doc["client_id"].as_str().unwrap().to_string();
    let secret = doc["client_secret"].as_str().unwrap().to_string();

    let authorize_uri = format!(
        "/authorize?response_type=code&client_id={}\
         &redirect_uri=https%3A%2F%2Ffresh.example%2Fcb&scope=openid&state=reg1&nonce=rn",
        client_id
    );
    let redirect =
        drive_interactive_flow(&provider, authorize_uri, "alice", "password123").await;
    let code = param_from_url(&redirect, "code").expect("code for registered client");

    let body = serde_urlencoded::to_string([
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("redirect_uri", "https://fresh.example/cb"),
    ])
    .unwrap();
    let response = provider
        .client
        .post("/token")
        .header(ContentType::Form)
        .header(Header::new(
            "Authorization",
            basic_auth(&client_id, &secret),
        ))
        .body(body)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
}

#[rocket::async_test]
async fn disabled_registration_is_not_found() {
    let mut config = test_config();
    config.registration.enabled = false;
    let provider = provider_with_config(config).await;

    let (status, doc) = register(
        &provider,
        json!({ "redirect_uris": ["https://app.example/cb"] }),
    )
    .await;
    assert_eq!(status, Status::NotFound);
    assert_eq!(doc["error"], "registration_not_supported");
}

#[rocket::async_test]
async fn initial_access_token_is_single_use() {
    let mut config = test_config();
    config.registration.require_initial_access_token = true;
    config
        .bootstrap
        .initial_access_tokens
        .push("bootstrap-registration-token-1".to_string());
    let provider = provider_with_config(config).await;

    // No bearer at all
    let (status, doc) = register(
        &provider,
        json!({ "redirect_uris": ["https://app.example/cb"] }),
    )
    .await;
    assert_eq!(status, Status::Unauthorized);
    assert_eq!(doc["error"], "invalid_token");

    // With the provisioned token
    let response = provider
        .client
        .post("/register")
        .header(ContentType::JSON)
        .header(bearer("bootstrap-registration-token-1"))
        .body(json!({ "redirect_uris": ["https://app.example/cb"] }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);
    let created: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();

    // The token is stamped with the client it created and never works again
    let stored = provider
        .storage
        .get_initial_access_token("bootstrap-registration-token-1")
        .await
        .unwrap()
        .unwrap();
    assert!(stored.used);
    assert_eq!(stored.used_by.as_deref(), created["client_id"].as_str());

    let response = provider
        .client
        .post("/register")
        .header(ContentType::JSON)
        .header(bearer("bootstrap-registration-token-1"))
        .body(json!({ "redirect_uris": ["https://app.example/cb"] }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);
}
