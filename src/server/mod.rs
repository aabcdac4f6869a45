// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Web server for the OpenID Provider
//!
//! This module wires the protocol engine to Rocket:
//!
//! - **Discovery**: `/.well-known/openid-configuration`, `/.well-known/jwks.json`
//! - **Authorization**: `/authorize`, `/authorize/resume`, `/login`, `/consent`
//! - **Tokens**: `/token`, `/introspect`, `/revoke`, `/userinfo`
//! - **Registration**: `/register`, `/register/<client_id>`
//! - **Admin**: `/admin/api/*` (users, clients, keys, settings)
//!
//! Handlers stay thin: parameter extraction and cookie plumbing here,
//! protocol decisions in [`crate::oauth`].

pub mod admin;
pub mod authorize;
pub mod discovery;
pub mod guards;
pub mod introspect;
pub mod registration;
pub mod revoke;
pub mod token;
pub mod userinfo;

use std::path::PathBuf;
use std::sync::Arc;

use rocket::fairing::{Fairing, Info, Kind};
use rocket::figment::Figment;
use rocket::http::Header;
use rocket::{options, routes, Build, Request, Response, Rocket};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::oauth::OAuthContext;

/// Shared state managed by Rocket
pub struct ProviderState {
    pub ctx: Arc<OAuthContext>,
    /// Live configuration; the admin settings endpoint takes the write half
    pub config: RwLock<Config>,
    /// Where the configuration was loaded from; settings edits persist here
    pub config_path: Option<PathBuf>,
    /// Mark session cookies Secure (TLS termination is on)
    pub secure_cookies: bool,
}

/// Cross-Origin Resource Sharing (CORS) fairing
///
/// Discovery, JWKS, token and userinfo are consumed cross-origin by
/// browser-based relying parties, so every response carries permissive CORS
/// headers.
pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "Add CORS headers to responses",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
        response.set_header(Header::new("Access-Control-Allow-Origin", "*"));
        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "POST, GET, PUT, DELETE, OPTIONS",
        ));
        response.set_header(Header::new("Access-Control-Allow-Headers", "*"));
        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

/// Responds to CORS preflight requests; the fairing adds the headers
#[options("/<_path..>")]
async fn cors_preflight(_path: PathBuf) -> Result<(), std::io::Error> {
    Ok(())
}

/// Build a configured Rocket server instance
///
/// # Parameters
///
/// * `figment` - Rocket configuration (address, port, secret_key, TLS)
/// * `config` - The provider configuration
/// * `config_path` - Where settings edits persist; `None` makes the admin
///   settings endpoint answer 501
/// * `ctx` - The protocol engine context (storage, keys, lifetimes)
pub fn build_rocket(
    figment: Figment,
    config: Config,
    config_path: Option<PathBuf>,
    ctx: Arc<OAuthContext>,
) -> Rocket<Build> {
    let secure_cookies = config.server.tls_enabled();
    let state = ProviderState {
        ctx,
        config: RwLock::new(config),
        config_path,
        secure_cookies,
    };

    rocket::custom(figment)
        .attach(Cors)
        .mount(
            "/",
            routes![
                cors_preflight,
                discovery::openid_configuration,
                discovery::jwks,
                authorize::authorize,
                authorize::authorize_resume,
                authorize::login_page,
                authorize::login_submit,
                authorize::consent_page,
                authorize::consent_submit,
                token::token,
                introspect::introspect,
                revoke::revoke,
                userinfo::userinfo_get,
                userinfo::userinfo_post,
                registration::register,
                registration::client_get,
                registration::client_update,
                registration::client_delete,
            ],
        )
        .mount(
            "/admin/api",
            routes![
                admin::list_users,
                admin::create_user,
                admin::get_user,
                admin::update_user,
                admin::delete_user,
                admin::list_clients,
                admin::delete_client,
                admin::list_keys,
                admin::rotate_keys,
                admin::get_settings,
                admin::put_settings,
            ],
        )
        .manage(state)
}
