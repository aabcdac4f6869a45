// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Shared scaffolding for the end-to-end tests: an in-memory provider
//! instance behind a Rocket local client, plus seeding helpers.

// Not every test binary uses every helper
#![allow(dead_code)]

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use rocket::local::asynchronous::Client;

use rust_oidc_provider::config::{Config, StorageBackend};
use rust_oidc_provider::daemon::Daemon;
use rust_oidc_provider::oauth::OAuthContext;
use rust_oidc_provider::server::build_rocket;
use rust_oidc_provider::storage::models::{
    ApplicationType, Client as OAuthClient, SubjectType, Token, TokenEndpointAuthMethod, User,
    UserRole,
};
use rust_oidc_provider::storage::{SharedStorage, Storage};

/// A provider instance under test
pub struct TestProvider {
    pub client: Client,
    pub storage: SharedStorage,
    pub ctx: Arc<OAuthContext>,
    pub config: Config,
}

/// Base test configuration: in-memory storage, small RSA keys for speed
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.storage.backend = StorageBackend::Memory;
    config.oidc.rsa_key_bits = 2048;
    config
}

/// Boots a provider with the given configuration behind a local client
pub async fn provider_with_config(config: Config) -> TestProvider {
    let storage = Daemon::open_storage(&config).expect("storage backend");
    let ctx = Daemon::build_context(&config, storage.clone())
        .await
        .expect("engine context");
    Daemon::apply_bootstrap(&config, &storage)
        .await
        .expect("bootstrap seed");

    let figment = rocket::Config::figment()
        .merge(("port", 0))
        .merge(("address", "127.0.0.1"))
        .merge(("log_level", rocket::config::LogLevel::Off))
        .merge((
            "secret_key",
            "hPRYyVRiMyxpw5sBB1XeCMN1kFsDCqKvBi2QJxBVHQk=",
        ));
    let rocket = build_rocket(figment, config.clone(), None, ctx.clone());
    let client = Client::tracked(rocket).await.expect("valid rocket instance");

    TestProvider {
        client,
        storage,
        ctx,
        config,
    }
}

pub async fn provider() -> TestProvider {
    provider_with_config(test_config()).await
}

/// Seeds the default end-user (alice / password123)
pub async fn seed_user(provider: &TestProvider) -> User {
    let mut user = User::new(
        "user-alice",
        "alice",
        "alice@example.org",
        pwhash::bcrypt::hash("password123").expect("bcrypt hash"),
        UserRole::User,
    );
    user.email_verified = true;
    user.name = Some("Alice Example".to_string());
    user.given_name = Some("Alice".to_string());
    user.family_name = Some("Example".to_string());
    user.picture = Some("https://example.org/alice.png".to_string());
    user.locale = Some("en-US".to_string());
    provider.storage.create_user(user.clone()).await.expect("seed user");
    user
}

/// Seeds a confidential web client (Basic auth, code + refresh + implicit)
pub async fn seed_web_client(provider: &TestProvider) -> OAuthClient {
    let now = Utc::now();
    let client = OAuthClient {
        id: "web-app".to_string(),
        secret: Some("s3cret".to_string()),
        secret_expires_at: 0,
        redirect_uris: vec!["https://app.example/cb".to_string()],
        grant_types: vec![
            "authorization_code".to_string(),
            "refresh_token".to_string(),
            "implicit".to_string(),
        ],
        response_types: vec![
            "code".to_string(),
            "id_token".to_string(),
            "token id_token".to_string(),
        ],
        scope: "openid profile email address phone".to_string(),
        application_type: ApplicationType::Web,
        token_endpoint_auth_method: TokenEndpointAuthMethod::ClientSecretBasic,
        subject_type: SubjectType::Public,
        id_token_signed_response_alg: "RS256".to_string(),
        jwks: None,
        jwks_uri: None,
        contacts: vec![],
        client_name: Some("Example Web App".to_string()),
        client_uri: None,
        logo_uri: None,
        policy_uri: None,
        tos_uri: None,
        default_max_age: None,
        require_auth_time: false,
        registration_access_token: None,
        client_id_issued_at: now,
        created_at: now,
        updated_at: now,
    };
    provider
        .storage
        .create_client(client.clone())
        .await
        .expect("seed client");
    client
}

/// Seeds a public single-page-app client that redeems PKCE-bound codes
pub async fn seed_public_client(provider: &TestProvider) -> OAuthClient {
    let now = Utc::now();
    let client = OAuthClient {
        id: "spa-app".to_string(),
        secret: None,
        secret_expires_at: 0,
        redirect_uris: vec!["https://spa.example/cb".to_string()],
        grant_types: vec![
            "authorization_code".to_string(),
            "refresh_token".to_string(),
        ],
        response_types: vec!["code".to_string()],
        scope: "openid profile".to_string(),
        application_type: ApplicationType::Web,
        token_endpoint_auth_method: TokenEndpointAuthMethod::None,
        subject_type: SubjectType::Public,
        id_token_signed_response_alg: "RS256".to_string(),
        jwks: None,
        jwks_uri: None,
        contacts: vec![],
        client_name: Some("Example SPA".to_string()),
        client_uri: None,
        logo_uri: None,
        policy_uri: None,
        tos_uri: None,
        default_max_age: None,
        require_auth_time: false,
        registration_access_token: None,
        client_id_issued_at: now,
        created_at: now,
        updated_at: now,
    };
    provider
        .storage
        .create_client(client.clone())
        .await
        .expect("seed client");
    client
}

/// Seeds a token bundle directly into storage
pub async fn seed_token(
    provider: &TestProvider,
    id: &str,
    access: &str,
    refresh: Option<&str>,
    client_id: &str,
    scope: &str,
    auth_code_id: Option<&str>,
) -> Token {
    let now = Utc::now();
    let token = Token {
        id: id.to_string(),
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        token_type: "Bearer".to_string(),
        scope: scope.to_string(),
        user_id: "user-alice".to_string(),
        client_id: client_id.to_string(),
        authorization_code_id: auth_code_id.map(str::to_string),
        created_at: now,
        expires_at: now + chrono::Duration::hours(1),
    };
    provider.storage.put_token(token.clone()).await.expect("seed token");
    token
}

/// `Authorization: Basic` header value for client credentials
pub fn basic_auth(client_id: &str, secret: &str) -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", client_id, secret))
    )
}

/// Pulls a query or fragment parameter out of a redirect URL
pub fn param_from_url(url: &str, name: &str) -> Option<String> {
    let params = url.split_once(|c| c == '?' || c == '#')?.1;
    serde_urlencoded::from_str::<Vec<(String, String)>>(params)
        .ok()?
        .into_iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value)
}

/// Walks the login/consent round trips until the provider redirects back to
/// the relying party; returns that final redirect URL.
pub async fn drive_interactive_flow(
    provider: &TestProvider,
    authorize_uri: String,
    username: &str,
    password: &str,
) -> String {
    let mut location = authorize_uri;
    for _ in 0..10 {
        if location.starts_with("http://") || location.starts_with("https://") {
            return location;
        }
        let response = provider.client.get(location.clone()).dispatch().await;
        if let Some(next) = response.headers().get_one("Location") {
            location = next.to_string();
            continue;
        }

        // An HTML page: either the login or the consent form
        assert_eq!(response.status(), rocket::http::Status::Ok);
        let html = response.into_string().await.expect("form body");
        let auth_session = regex::Regex::new(r#"name="auth_session" value="([^"]+)""#)
            .unwrap()
            .captures(&html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .expect("auth_session field in form");

        let (target, body) = if html.contains("name=\"password\"") {
            (
                "/login",
                serde_urlencoded::to_string([
                    ("auth_session", auth_session.as_str()),
                    ("username", username),
                    ("password", password),
                ])
                .unwrap(),
            )
        } else {
            (
                "/consent",
                serde_urlencoded::to_string([
                    ("auth_session", auth_session.as_str()),
                    ("action", "allow"),
                ])
                .unwrap(),
            )
        };
        let response = provider
            .client
            .post(target)
            .header(rocket::http::ContentType::Form)
            .body(body)
            .dispatch()
            .await;
        location = response
            .headers()
            .get_one("Location")
            .expect("redirect after form submission")
            .to_string();
    }
    panic!("authorization flow did not converge on a client redirect");
}
