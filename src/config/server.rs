// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! HTTP server settings

use serde::{Deserialize, Serialize};

/// Settings for the HTTP front of the provider
///
/// `cert`/`key` take base64-encoded PEM material; when both are present the
/// server terminates TLS itself and session cookies become Secure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Whether the web server task starts at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Server identity reported in the `Server` header
    #[serde(default = "default_name")]
    pub name: String,

    /// Address to bind to
    #[serde(default = "default_address")]
    pub address: String,

    /// TCP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base64-encoded TLS certificate chain PEM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,

    /// Base64-encoded TLS private key PEM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Secret key for private (encrypted) session cookies, 32 bytes base64.
    /// The default is a development key; override it in production.
    #[serde(default = "default_cookie_secret")]
    pub cookie_secret: String,
}

fn default_enabled() -> bool {
    true
}

fn default_name() -> String {
    "rust-oidc-provider".to_string()
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cookie_secret() -> String {
    // Development-only key; replace in deployments
    "kPCeKZiiDbqhvGAC2u9c3QJx0qfQmXP6kEY6NhA2RF0=".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            enabled: default_enabled(),
            name: default_name(),
            address: default_address(),
            port: default_port(),
            cert: None,
            key: None,
            cookie_secret: default_cookie_secret(),
        }
    }
}

impl ServerConfig {
    pub fn tls_enabled(&self) -> bool {
        self.cert.is_some() && self.key.is_some()
    }
}
