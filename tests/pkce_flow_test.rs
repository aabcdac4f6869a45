// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! PKCE-protected public client flow (RFC 7636)
//!
//! A public client (no secret, `token_endpoint_auth_method = none`) binds
//! its authorization code to an S256 challenge; the token endpoint must
//! refuse redemption without the matching verifier.

mod common;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use common::*;
use rocket::http::{ContentType, Status};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Generate PKCE verifier and challenge (S256)
fn generate_pkce_challenge() -> (String, String) {
    let code_verifier: String = rand::random::<[u8; 32]>()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    let code_challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

    (code_verifier, code_challenge)
}

async fn obtain_code(provider: &TestProvider, code_challenge: &str) -> String {
    let authorize_uri = format!(
        "/authorize?response_type=code&client_id=spa-app\
         &redirect_uri=https%3A%2F%2Fspa.example%2Fcb&scope=openid%20profile&state=s1\
         &code_challenge={}&code_challenge_method=S256",
        code_challenge
    );
    let redirect = drive_interactive_flow(provider, authorize_uri, "alice", "password123").await;
    assert!(redirect.starts_with("https://spa.example/cb?"));
    param_from_url(&redirect, "code").expect("authorization code in redirect")
}

async fn redeem(
    provider: &TestProvider,
    code: &str,
    verifier: Option<&str>,
) -> (Status, Value) {
    let mut params = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", "https://spa.example/cb"),
        ("client_id", "spa-app"),
    ];
    if let Some(verifier) = verifier {
        params.push(("code_verifier", verifier));
    }
    let response = provider
        .client
        .post("/token")
        .header(ContentType::Form)
        .body(serde_urlencoded::to_string(params).unwrap())
        .dispatch()
        .await;
    let status = response.status();
    let json: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    (status, json)
}

#[rocket::async_test]
async fn missing_verifier_is_rejected_then_correct_verifier_succeeds() {
    let provider = provider().await;
    seed_user(&provider).await;
    seed_public_client(&provider).await;

    let (verifier, challenge) = generate_pkce_challenge();
    let code = obtain_code(&provider, &challenge).await;

    // No verifier at all
    let (status, json) = redeem(&provider, &code, None).await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(json["error"], "invalid_grant");

    // A wrong verifier
    let (status, json) = redeem(&provider, &code, Some("not-the-right-verifier")).await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(json["error"], "invalid_grant");

    // The right verifier redeems the code (failed attempts spent nothing)
    let (status, json) = redeem(&provider, &code, Some(&verifier)).await;
    assert_eq!(status, Status::Ok);
    assert!(json["access_token"].as_str().is_some());
    assert!(json["id_token"].as_str().is_some());
}

#[rocket::async_test]
async fn public_client_without_pkce_cannot_redeem() {
    let provider = provider().await;
    seed_user(&provider).await;
    seed_public_client(&provider).await;

    // Authorize without any code_challenge
    let authorize_uri = "/authorize?response_type=code&client_id=spa-app\
         &redirect_uri=https%3A%2F%2Fspa.example%2Fcb&scope=openid&state=s2"
        .to_string();
    let redirect = drive_interactive_flow(&provider, authorize_uri, "alice", "password123").await;
    let code = param_from_url(&redirect, "code").expect("authorization code");

    // An unbound code is useless to a client that never authenticates
    let (status, json) = redeem(&provider, &code, None).await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(json["error"], "invalid_grant");
}

#[rocket::async_test]
async fn plain_method_is_plain_equality() {
    let provider = provider().await;
    seed_user(&provider).await;
    seed_public_client(&provider).await;

    let authorize_uri = "/authorize?response_type=code&client_id=spa-app\
         &redirect_uri=https%3A%2F%2Fspa.example%2Fcb&scope=openid&state=s3\
         &code_challenge=the-plain-challenge&code_challenge_method=plain"
        .to_string();
    let redirect = drive_interactive_flow(&provider, authorize_uri, "alice", "password123").await;
    let code = param_from_url(&redirect, "code").expect("authorization code");

    let (status, _) = redeem(&provider, &code, Some("something-else")).await;
    assert_eq!(status, Status::BadRequest);

    let (status, _) = redeem(&provider, &code, Some("the-plain-challenge")).await;
    assert_eq!(status, Status::Ok);
}
