// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Token introspection (RFC 7662) and revocation (RFC 7009)

mod common;

use chrono::Utc;
use common::*;
use rust_oidc_provider::storage::Storage;
use rocket::http::{ContentType, Header, Status};
use serde_json::Value;

async fn introspect(provider: &TestProvider, token: &str, hint: Option<&str>) -> Value {
    let mut params = vec![("token", token)];
    if let Some(hint) = hint {
        params.push(("token_type_hint", hint));
    }
    let response = provider
        .client
        .post("/introspect")
        .header(ContentType::Form)
        .header(Header::new("Authorization", basic_auth("web-app", "s3cret")))
        .body(serde_urlencoded::to_string(params).unwrap())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    serde_json::from_str(&response.into_string().await.unwrap()).unwrap()
}

async fn revoke(provider: &TestProvider, token: &str, auth: Header<'static>) -> Status {
    let response = provider
        .client
        .post("/revoke")
        .header(ContentType::Form)
        .header(auth)
        .body(serde_urlencoded::to_string([("token", token)]).unwrap())
        .dispatch()
        .await;
    response.status()
}

#[rocket::async_test]
async fn active_token_reports_rfc7662_fields() {
    let provider = provider().await;
    let user = seed_user(&provider).await;
    seed_web_client(&provider).await;
    let token = seed_token(
        &provider,
        "tok-1",
        "access-1",
        Some("refresh-1"),
        "web-app",
        "openid profile",
        None,
    )
    .await;

    let doc = introspect(&provider, "access-1", None).await;
    assert_eq!(doc["active"], true);
    assert_eq!(doc["scope"], "openid profile");
    assert_eq!(doc["client_id"], "web-app");
    assert_eq!(doc["username"], user.username.as_str());
    assert_eq!(doc["token_type"], "Bearer");
    assert_eq!(doc["sub"], token.user_id.as_str());
    assert_eq!(doc["iss"], provider.ctx.issuer.as_str());
    assert_eq!(doc["exp"].as_i64(), Some(token.expires_at.timestamp()));
    assert_eq!(doc["iat"].as_i64(), Some(token.created_at.timestamp()));
}

#[rocket::async_test]
async fn hint_order_falls_back_to_the_other_kind() {
    let provider = provider().await;
    seed_user(&provider).await;
    seed_web_client(&provider).await;
    seed_token(
        &provider,
        "tok-1",
        "access-1",
        Some("refresh-1"),
        "web-app",
        "openid",
        None,
    )
    .await;

    // The refresh token introspects even when hinted as an access token
    let doc = introspect(&provider, "refresh-1", Some("access_token")).await;
    assert_eq!(doc["active"], true);

    let doc = introspect(&provider, "access-1", Some("refresh_token")).await;
    assert_eq!(doc["active"], true);
}

#[rocket::async_test]
async fn unknown_and_expired_tokens_are_inactive() {
    let provider = provider().await;
    seed_user(&provider).await;
    seed_web_client(&provider).await;

    let doc = introspect(&provider, "never-issued", None).await;
    assert_eq!(doc, serde_json::json!({ "active": false }));

    let mut expired = seed_token(
        &provider,
        "tok-exp",
        "access-exp",
        None,
        "web-app",
        "openid",
        None,
    )
    .await;
    expired.expires_at = Utc::now() - chrono::Duration::minutes(5);
    provider.storage.delete_token("tok-exp").await.unwrap();
    provider.storage.put_token(expired).await.unwrap();

    let doc = introspect(&provider, "access-exp", None).await;
    assert_eq!(doc["active"], false);
    assert!(doc.get("scope").is_none(), "inactive responses carry no detail");
}

#[rocket::async_test]
async fn introspection_requires_client_credentials() {
    let provider = provider().await;
    seed_web_client(&provider).await;

    let response = provider
        .client
        .post("/introspect")
        .header(ContentType::Form)
        .header(Header::new("Authorization", basic_auth("web-app", "wrong")))
        .body(serde_urlencoded::to_string([("token", "anything")]).unwrap())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);
}

#[rocket::async_test]
async fn signed_jwt_introspects_via_the_key_set() {
    let provider = provider().await;
    seed_user(&provider).await;
    seed_web_client(&provider).await;

    // Sign an ID-token-shaped JWT with the active key
    let key = provider.ctx.keys.active().await.unwrap();
    let claims = serde_json::json!({
        "iss": provider.ctx.issuer,
        "sub": "user-alice",
        "aud": "web-app",
        "exp": (Utc::now() + chrono::Duration::minutes(5)).timestamp(),
        "iat": Utc::now().timestamp(),
    });
    let jwt = rust_oidc_provider::crypto::jwt::sign_with_key(&claims, &key).unwrap();

    let doc = introspect(&provider, &jwt, None).await;
    assert_eq!(doc["active"], true);
    assert_eq!(doc["sub"], "user-alice");
    assert_eq!(doc["client_id"], "web-app");
    assert_eq!(doc["iss"], provider.ctx.issuer.as_str());
}

#[rocket::async_test]
async fn revoking_a_refresh_token_cascades_to_siblings() {
    let provider = provider().await;
    seed_user(&provider).await;
    seed_web_client(&provider).await;

    // Two bundles minted from the same authorization code
    seed_token(
        &provider,
        "tok-1",
        "access-1",
        Some("refresh-1"),
        "web-app",
        "openid",
        Some("code-1"),
    )
    .await;
    seed_token(
        &provider,
        "tok-2",
        "access-2",
        Some("refresh-2"),
        "web-app",
        "openid",
        Some("code-1"),
    )
    .await;
    // And one unrelated bundle
    seed_token(
        &provider,
        "tok-3",
        "access-3",
        None,
        "web-app",
        "openid",
        Some("code-2"),
    )
    .await;

    let status = revoke(
        &provider,
        "refresh-1",
        Header::new("Authorization", basic_auth("web-app", "s3cret")),
    )
    .await;
    assert_eq!(status, Status::Ok);

    // Every sibling sharing the code is gone
    assert!(provider.storage.get_token_by_access("access-1").await.unwrap().is_none());
    assert!(provider.storage.get_token_by_access("access-2").await.unwrap().is_none());
    // The unrelated bundle survives
    assert!(provider.storage.get_token_by_access("access-3").await.unwrap().is_some());
}

#[rocket::async_test]
async fn revocation_is_always_200() {
    let provider = provider().await;
    seed_user(&provider).await;
    seed_web_client(&provider).await;
    seed_public_client(&provider).await;
    seed_token(
        &provider,
        "tok-1",
        "access-1",
        Some("refresh-1"),
        "spa-app",
        "openid",
        None,
    )
    .await;

    // Unknown token: 200
    let status = revoke(
        &provider,
        "never-issued",
        Header::new("Authorization", basic_auth("web-app", "s3cret")),
    )
    .await;
    assert_eq!(status, Status::Ok);

    // A token owned by another client: 200, and the token survives
    let status = revoke(
        &provider,
        "access-1",
        Header::new("Authorization", basic_auth("web-app", "s3cret")),
    )
    .await;
    assert_eq!(status, Status::Ok);
    assert!(
        provider
            .storage
            .get_token_by_access("access-1")
            .await
            .unwrap()
            .is_some(),
        "foreign tokens must not be revokable"
    );
}

#[rocket::async_test]
async fn owner_can_revoke_an_access_token() {
    let provider = provider().await;
    seed_user(&provider).await;
    seed_web_client(&provider).await;
    seed_token(&provider, "tok-1", "access-1", None, "web-app", "openid", None).await;

    let status = revoke(
        &provider,
        "access-1",
        Header::new("Authorization", basic_auth("web-app", "s3cret")),
    )
    .await;
    assert_eq!(status, Status::Ok);
    assert!(provider
        .storage
        .get_token_by_access("access-1")
        .await
        .unwrap()
        .is_none());
}
